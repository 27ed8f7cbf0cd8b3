use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream};
use std::io::Cursor;
use std::sync::Arc;

use super::ocr::{OcrEngine, OcrError};

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("not a PDF file (invalid header)")]
    NotPdf,
    #[error("invalid PDF structure: {0}")]
    Parse(String),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("PDF file has no pages")]
    NoPages,
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// PDF 基本信息 (用于日志)
#[derive(Debug, Clone, PartialEq)]
pub struct PdfInfo {
    pub num_pages: usize,
    pub file_size: usize,
    pub has_text: bool,
}

#[derive(Debug, Clone)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
    pub from_ocr: bool,
}

/// 单个 PDF 的提取结果
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub info: PdfInfo,
    pub pages: Vec<PageText>,
}

impl ExtractedText {
    /// 所有页面文本, 按页拼接
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|p| p.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn ocr_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.from_ocr).count()
    }
}

/// 解析阶段的页面: 直接提取的文本 + 待 OCR 的图片
struct ScannedPage {
    number: u32,
    text: String,
    images: Vec<Vec<u8>>,
}

/// 校验 PDF 并加载文档
pub fn load_document(bytes: &[u8]) -> Result<Document, PdfError> {
    if !bytes.starts_with(b"%PDF-") {
        return Err(PdfError::NotPdf);
    }

    let doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(PdfError::Encrypted);
    }
    if doc.get_pages().is_empty() {
        return Err(PdfError::NoPages);
    }

    Ok(doc)
}

fn scan_pages(bytes: &[u8], collect_images: bool) -> Result<(PdfInfo, Vec<ScannedPage>), PdfError> {
    let doc = load_document(bytes)?;
    let pages = doc.get_pages();

    let mut scanned = Vec::with_capacity(pages.len());
    for (&number, &page_id) in &pages {
        let text = match doc.extract_text(&[number]) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("Page {} text extraction failed: {}", number, e);
                String::new()
            }
        };

        let images = if text.trim().is_empty() && collect_images {
            page_images(&doc, page_id)
        } else {
            Vec::new()
        };

        scanned.push(ScannedPage { number, text, images });
    }

    let info = PdfInfo {
        num_pages: pages.len(),
        file_size: bytes.len(),
        has_text: scanned.iter().any(|p| !p.text.trim().is_empty()),
    };

    Ok((info, scanned))
}

/// 解析引用对象
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// 收集页面中的图片 XObject (编码为 OCR 可读格式)
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<Vec<u8>> {
    let Ok(Object::Dictionary(page)) = doc.get_object(page_id) else {
        return Vec::new();
    };

    let resources = match page.get(b"Resources").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Dictionary(dict)) => dict,
        _ => return Vec::new(),
    };

    let xobjects = match resources.get(b"XObject").ok().and_then(|o| resolve(doc, o)) {
        Some(Object::Dictionary(dict)) => dict,
        _ => return Vec::new(),
    };

    let mut images = Vec::new();
    for (name, obj) in xobjects.iter() {
        let Some(Object::Stream(stream)) = resolve(doc, obj) else {
            continue;
        };
        if !matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") {
            continue;
        }

        match encode_image(stream) {
            Some(bytes) => images.push(bytes),
            None => tracing::debug!(
                "Skipping undecodable image XObject {}",
                String::from_utf8_lossy(name)
            ),
        }
    }
    images
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| match o {
                Object::Name(n) => Some(n.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn integer(stream: &Stream, key: &[u8]) -> Option<u32> {
    match stream.dict.get(key) {
        Ok(Object::Integer(v)) => u32::try_from(*v).ok(),
        _ => None,
    }
}

/// JPEG/JPEG2000 原样交给 OCR; 8 位 RGB/灰度原始像素转 PNG
fn encode_image(stream: &Stream) -> Option<Vec<u8>> {
    let filters = filter_names(stream);
    if filters.len() == 1 && matches!(filters[0].as_slice(), b"DCTDecode" | b"JPXDecode") {
        return Some(stream.content.clone());
    }

    let width = integer(stream, b"Width")?;
    let height = integer(stream, b"Height")?;
    if integer(stream, b"BitsPerComponent").unwrap_or(8) != 8 {
        return None;
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let image = match stream.dict.get(b"ColorSpace") {
        Ok(Object::Name(n)) if n == b"DeviceRGB" => {
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, data)?)
        }
        Ok(Object::Name(n)) if n == b"DeviceGray" => {
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, data)?)
        }
        _ => return None,
    };

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .ok()?;
    Some(png)
}

/// PDF 文本提取器: 直接提取, 无文本页面回退到 OCR
pub struct PdfTextExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl PdfTextExtractor {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self { ocr }
    }

    pub async fn extract(&self, bytes: Vec<u8>) -> Result<ExtractedText, PdfError> {
        let collect_images = self.ocr.is_some();
        let (info, scanned) = tokio::task::spawn_blocking(move || scan_pages(&bytes, collect_images))
            .await
            .map_err(|e| PdfError::Task(e.to_string()))??;

        let mut pages = Vec::with_capacity(scanned.len());
        for page in scanned {
            if !page.text.trim().is_empty() {
                pages.push(PageText {
                    page_number: page.number,
                    text: page.text,
                    from_ocr: false,
                });
                continue;
            }

            let Some(ocr) = &self.ocr else {
                continue;
            };

            let mut recognized = Vec::new();
            for image in &page.images {
                let text = ocr.recognize(image).await?;
                if !text.is_empty() {
                    recognized.push(text);
                }
            }

            if !recognized.is_empty() {
                tracing::info!("Page {}: OCR recovered text from {} image(s)", page.number, recognized.len());
                pages.push(PageText {
                    page_number: page.number,
                    text: recognized.join("\n"),
                    from_ocr: true,
                });
            }
        }

        Ok(ExtractedText { info, pages })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::make_pdf;
    use super::*;
    use async_trait::async_trait;

    struct FixedOcr(&'static str);

    #[async_trait]
    impl OcrEngine for FixedOcr {
        async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    struct BrokenOcr;

    #[async_trait]
    impl OcrEngine for BrokenOcr {
        async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
            Err(OcrError::Failed {
                code: Some(1),
                stderr: "Error in pixReadMem".to_string(),
            })
        }

        async fn is_available(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn extracts_embedded_text() {
        let extractor = PdfTextExtractor::new(None);
        let pdf = make_pdf(&[Some("Hello World from the billing office")]);
        let extracted = extractor.extract(pdf).await.unwrap();

        assert_eq!(extracted.info.num_pages, 1);
        assert!(extracted.info.has_text);
        assert!(extracted.text().contains("Hello"), "got: {}", extracted.text());
        assert_eq!(extracted.ocr_pages(), 0);
    }

    #[tokio::test]
    async fn image_only_pages_fall_back_to_ocr() {
        let extractor = PdfTextExtractor::new(Some(Arc::new(FixedOcr("SCANNED DISCHARGE SUMMARY"))));
        let pdf = make_pdf(&[Some("Page one text"), None]);
        let extracted = extractor.extract(pdf).await.unwrap();

        assert_eq!(extracted.info.num_pages, 2);
        assert_eq!(extracted.ocr_pages(), 1);
        assert!(extracted.text().contains("SCANNED DISCHARGE SUMMARY"));
    }

    #[tokio::test]
    async fn image_only_pages_without_ocr_yield_no_text() {
        let extractor = PdfTextExtractor::new(None);
        let extracted = extractor.extract(make_pdf(&[None])).await.unwrap();
        assert!(!extracted.info.has_text);
        assert!(extracted.text().is_empty());
    }

    #[tokio::test]
    async fn ocr_failure_is_reported() {
        let extractor = PdfTextExtractor::new(Some(Arc::new(BrokenOcr)));
        let result = extractor.extract(make_pdf(&[None])).await;
        assert!(matches!(result, Err(PdfError::Ocr(_))));
    }

    #[test]
    fn rejects_non_pdf_bytes() {
        assert!(matches!(load_document(b"not a pdf"), Err(PdfError::NotPdf)));
        assert!(matches!(load_document(b"%PDF-1.4 garbage"), Err(PdfError::Parse(_))));
    }
}
