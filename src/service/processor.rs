use futures::future::join_all;
use serde::Serialize;
use serde_json::Map;
use std::path::Path;
use std::sync::Arc;

use super::prompts;
use super::validator::ValidationEngine;
use crate::client::{LanguageModel, PdfTextExtractor};
use crate::config::UploadConfig;
use crate::error::ProcessingError;
use crate::models::{DocumentType, ExtractedDocument, ValidationReport};

/// 上传的单个文件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// 一批单据的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct ClaimResult {
    pub documents: Vec<ExtractedDocument>,
    pub validation: ValidationReport,
}

/// 单据处理服务: PDF 文本提取 -> AI 分类 -> AI 字段抽取 -> 跨单据校验
pub struct DocumentProcessor {
    llm: Arc<dyn LanguageModel>,
    extractor: PdfTextExtractor,
    upload: UploadConfig,
    validator: ValidationEngine,
}

impl DocumentProcessor {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        extractor: PdfTextExtractor,
        upload: UploadConfig,
        validator: ValidationEngine,
    ) -> Self {
        Self {
            llm,
            extractor,
            upload,
            validator,
        }
    }

    pub fn is_ai_configured(&self) -> bool {
        self.llm.is_configured()
    }

    /// 并发处理所有文件, 完成后统一校验
    /// 单个文件失败只记录在该文件的结果中
    pub async fn process_documents(&self, files: Vec<UploadedFile>) -> ClaimResult {
        tracing::info!("Processing batch of {} file(s)", files.len());

        let documents: Vec<ExtractedDocument> =
            join_all(files.into_iter().map(|file| self.process_file(file))).await;

        let failed = documents.iter().filter(|d| d.is_failed()).count();
        tracing::info!("批次处理完成: {} 个文件, {} 个失败", documents.len(), failed);

        let validation = self.validator.validate(&documents);
        ClaimResult {
            documents,
            validation,
        }
    }

    async fn process_file(&self, file: UploadedFile) -> ExtractedDocument {
        let filename = file.filename.clone();
        let mut document_type = DocumentType::Unknown;

        match self.run_pipeline(file, &mut document_type).await {
            Ok(document) => {
                tracing::info!(
                    "{}: classified as {}, {} field(s) extracted",
                    document.filename,
                    document.document_type,
                    document.data.len()
                );
                document
            }
            Err(e) => {
                tracing::warn!("{}: processing failed: {}", filename, e);
                ExtractedDocument::failed(filename, document_type, e.to_string())
            }
        }
    }

    /// `document_type` 记录已完成的分类结果, 抽取失败时保留
    async fn run_pipeline(
        &self,
        file: UploadedFile,
        document_type: &mut DocumentType,
    ) -> Result<ExtractedDocument, ProcessingError> {
        self.check_upload(&file)?;
        let UploadedFile { filename, bytes } = file;

        let extracted = self.extractor.extract(bytes).await?;
        tracing::info!(
            "{}: {} page(s), {} bytes, embedded text: {}, OCR pages: {}",
            filename,
            extracted.info.num_pages,
            extracted.info.file_size,
            extracted.info.has_text,
            extracted.ocr_pages()
        );

        let text = extracted.text();
        if text.trim().is_empty() {
            return Err(ProcessingError::NoText);
        }

        *document_type = self.classify(&text).await?;
        // 未能分类: 保留单据, 不抽取字段, 由完整性规则给出提示
        if *document_type == DocumentType::Unknown {
            return Ok(ExtractedDocument::new(filename, DocumentType::Unknown, Map::new()));
        }

        let response = self
            .llm
            .generate(&prompts::extraction_prompt(&text, *document_type))
            .await?;
        let fields = prompts::parse_field_map(&response, *document_type)?;

        Ok(ExtractedDocument::new(filename, *document_type, fields))
    }

    fn check_upload(&self, file: &UploadedFile) -> Result<(), ProcessingError> {
        let is_pdf = Path::new(&file.filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(ProcessingError::NotPdfFile(file.filename.clone()));
        }
        if file.bytes.is_empty() {
            return Err(ProcessingError::EmptyFile);
        }
        if file.bytes.len() > self.upload.max_file_size {
            return Err(ProcessingError::FileTooLarge {
                size: file.bytes.len(),
                limit: self.upload.max_file_size,
            });
        }
        Ok(())
    }

    async fn classify(&self, text: &str) -> Result<DocumentType, ProcessingError> {
        let response = self.llm.generate(&prompts::classification_prompt(text)).await?;
        let document_type = DocumentType::from_label(&response);
        tracing::debug!("Classification response '{}' -> {}", response.trim(), document_type);
        Ok(document_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::pdf::test_support::make_pdf;
    use crate::client::AiError;
    use crate::config::AppConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BILL_JSON: &str = r#"```json
{"Patient Name": "John Doe", "Hospital": "General Hospital", "Total Amount": 350.50,
 "Itemized Charges": [{"description": "Room", "amount": 100.00}, {"description": "Lab", "amount": 250.50}],
 "Date of Service": "2024-01-02"}
```"#;

    const DISCHARGE_JSON: &str = r#"Here are the fields:
{"Patient Name": "JOHN DOE", "Hospital": "general hospital", "Admission Date": "2024-01-01",
 "Discharge Date": "2024-01-03", "Diagnosis": "Pneumonia"}"#;

    /// 按单据文本关键词应答的模型
    struct ScriptedModel {
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let is_bill = prompt.contains("STATEMENT OF CHARGES");
            let is_discharge = prompt.contains("DISCHARGE SUMMARY");

            if prompt.contains("classify it") {
                return Ok(match (is_bill, is_discharge) {
                    (true, _) => "bill".to_string(),
                    (_, true) => "Discharge".to_string(),
                    _ => "unknown".to_string(),
                });
            }

            if prompt.contains("BROKEN JSON") {
                return Ok("{\"Patient Name\": ".to_string());
            }
            if is_bill {
                Ok(BILL_JSON.to_string())
            } else {
                Ok(DISCHARGE_JSON.to_string())
            }
        }
    }

    struct UnreachableModel;

    #[async_trait]
    impl LanguageModel for UnreachableModel {
        async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
            Err(AiError::Timeout(60))
        }
    }

    fn processor(llm: Arc<dyn LanguageModel>) -> DocumentProcessor {
        let config = AppConfig::default();
        DocumentProcessor::new(
            llm,
            PdfTextExtractor::new(None),
            config.upload,
            ValidationEngine::from_config(&config.validation),
        )
    }

    fn bill_pdf() -> Vec<u8> {
        make_pdf(&[Some("GENERAL HOSPITAL\nSTATEMENT OF CHARGES\nPatient: John Doe")])
    }

    fn discharge_pdf() -> Vec<u8> {
        make_pdf(&[Some("DISCHARGE SUMMARY\nPatient: John Doe\nDiagnosis: Pneumonia")])
    }

    #[tokio::test]
    async fn bill_and_discharge_summary_are_processed_and_validated() {
        let llm = Arc::new(ScriptedModel::new());
        let result = processor(llm.clone())
            .process_documents(vec![
                UploadedFile::new("bill.pdf", bill_pdf()),
                UploadedFile::new("summary.PDF", discharge_pdf()),
            ])
            .await;

        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.documents[0].document_type, DocumentType::Bill);
        assert_eq!(result.documents[1].document_type, DocumentType::DischargeSummary);
        assert!(result.documents.iter().all(|d| d.error.is_none()));
        assert_eq!(result.documents[0].data["Patient ID"], serde_json::Value::Null);

        assert!(result.validation.is_valid, "{:?}", result.validation.discrepancies);
        assert!(result.validation.missing_documents.is_empty());
        assert_eq!(llm.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn empty_batch_reports_all_documents_missing() {
        let result = processor(Arc::new(ScriptedModel::new()))
            .process_documents(Vec::new())
            .await;

        assert!(result.documents.is_empty());
        assert!(result.validation.is_valid);
        assert_eq!(
            result.validation.missing_documents,
            vec![DocumentType::Bill, DocumentType::DischargeSummary]
        );
    }

    #[tokio::test]
    async fn invalid_files_are_localized_errors() {
        let result = processor(Arc::new(ScriptedModel::new()))
            .process_documents(vec![
                UploadedFile::new("notes.txt", b"plain text".to_vec()),
                UploadedFile::new("empty.pdf", Vec::new()),
                UploadedFile::new("fake.pdf", b"not really a pdf".to_vec()),
                UploadedFile::new("bill.pdf", bill_pdf()),
            ])
            .await;

        let errors: Vec<Option<&str>> = result.documents.iter().map(|d| d.error.as_deref()).collect();
        assert_eq!(errors[0], Some("notes.txt is not a PDF file"));
        assert_eq!(errors[1], Some("empty file"));
        assert!(errors[2].is_some_and(|e| e.contains("not a PDF")));
        assert_eq!(errors[3], None);

        assert_eq!(result.validation.missing_documents, vec![DocumentType::DischargeSummary]);
        assert!(result.validation.is_valid);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let config = AppConfig::default();
        let processor = DocumentProcessor::new(
            Arc::new(ScriptedModel::new()),
            PdfTextExtractor::new(None),
            UploadConfig {
                max_file_size: 16,
                ..config.upload
            },
            ValidationEngine::default(),
        );

        let result = processor
            .process_documents(vec![UploadedFile::new("bill.pdf", bill_pdf())])
            .await;
        assert!(result.documents[0]
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("file too large")));
    }

    #[tokio::test]
    async fn scanned_pdf_without_ocr_has_no_text() {
        let result = processor(Arc::new(ScriptedModel::new()))
            .process_documents(vec![UploadedFile::new("scan.pdf", make_pdf(&[None]))])
            .await;

        assert_eq!(
            result.documents[0].error.as_deref(),
            Some("could not extract text from document")
        );
    }

    #[tokio::test]
    async fn unclassified_document_is_kept_as_unknown() {
        let pdf = make_pdf(&[Some("Grocery list\nMilk\nEggs")]);
        let result = processor(Arc::new(ScriptedModel::new()))
            .process_documents(vec![UploadedFile::new("list.pdf", pdf)])
            .await;

        let document = &result.documents[0];
        assert_eq!(document.document_type, DocumentType::Unknown);
        assert!(document.data.is_empty());
        assert!(document.error.is_none());

        assert!(result
            .validation
            .warnings
            .contains(&"list.pdf could not be classified as a bill or discharge summary".to_string()));
        assert!(!result
            .validation
            .warnings
            .iter()
            .any(|w| w.contains("could not be processed")));
    }

    #[tokio::test]
    async fn malformed_extraction_keeps_classified_type() {
        let pdf = make_pdf(&[Some("STATEMENT OF CHARGES\nBROKEN JSON")]);
        let result = processor(Arc::new(ScriptedModel::new()))
            .process_documents(vec![UploadedFile::new("bill.pdf", pdf)])
            .await;

        let document = &result.documents[0];
        assert_eq!(document.document_type, DocumentType::Bill);
        assert!(document
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("malformed AI response")));
        assert_eq!(result.validation.missing_documents.len(), 2);
    }

    #[tokio::test]
    async fn ai_failure_is_localized_per_file() {
        let result = processor(Arc::new(UnreachableModel))
            .process_documents(vec![
                UploadedFile::new("bill.pdf", bill_pdf()),
                UploadedFile::new("summary.pdf", discharge_pdf()),
            ])
            .await;

        assert_eq!(result.documents.len(), 2);
        for document in &result.documents {
            assert_eq!(document.document_type, DocumentType::Unknown);
            assert_eq!(
                document.error.as_deref(),
                Some("AI service error: AI request timed out after 60s")
            );
        }
        assert!(result.validation.is_valid);
    }
}
