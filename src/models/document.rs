use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use super::field::{FieldError, FieldKey, FieldValue};

/// 单据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Bill,
    #[serde(alias = "discharge")]
    DischargeSummary,
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Bill => "bill",
            DocumentType::DischargeSummary => "discharge_summary",
            DocumentType::Unknown => "unknown",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Bill => "medical bill",
            DocumentType::DischargeSummary => "discharge summary",
            DocumentType::Unknown => "unknown document",
        }
    }

    /// 解析分类模型的输出 (容忍引号/代码块/多余文字)
    pub fn from_label(raw: &str) -> Self {
        let label: String = raw
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let words: Vec<&str> = label.split_whitespace().collect();

        if words.contains(&"discharge") {
            DocumentType::DischargeSummary
        } else if words.iter().any(|w| matches!(*w, "bill" | "invoice" | "statement")) {
            DocumentType::Bill
        } else {
            DocumentType::Unknown
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个上传文件的处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedDocument {
    pub filename: String,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    /// AI 抽取的原始字段 (松散类型)
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractedDocument {
    pub fn new(filename: impl Into<String>, document_type: DocumentType, data: Map<String, Value>) -> Self {
        Self {
            filename: filename.into(),
            document_type,
            data,
            error: None,
        }
    }

    /// 处理失败的单据, 不参与任何字段规则
    pub fn failed(filename: impl Into<String>, document_type: DocumentType, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            document_type,
            data: Map::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// 原始字段 -> 规范字段 (同一规范字段出现多次时取第一个非空值)
    pub fn parse(&self) -> ParsedDocument {
        let mut values: HashMap<FieldKey, FieldValue> = HashMap::new();
        let mut errors: Vec<(FieldKey, FieldError)> = Vec::new();

        for (raw_key, raw_value) in &self.data {
            let Some(key) = FieldKey::from_raw_key(raw_key) else {
                continue;
            };
            if values.get(&key).is_some_and(|v| !v.is_absent()) {
                continue;
            }

            match FieldValue::parse(key.kind(), raw_value) {
                Ok(value) => {
                    values.insert(key, value);
                }
                Err(e) => errors.push((key, e)),
            }
        }

        ParsedDocument {
            filename: self.filename.clone(),
            document_type: self.document_type,
            values,
            errors,
        }
    }
}

/// 显式解析后的单据字段, 供校验规则使用
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub filename: String,
    pub document_type: DocumentType,
    values: HashMap<FieldKey, FieldValue>,
    pub errors: Vec<(FieldKey, FieldError)>,
}

impl ParsedDocument {
    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        self.values.get(&key).filter(|v| !v.is_absent())
    }

    pub fn text(&self, key: FieldKey) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text).filter(|s| !s.is_empty())
    }

    pub fn date(&self, key: FieldKey) -> Option<chrono::NaiveDate> {
        self.get(key).and_then(FieldValue::as_date)
    }

    pub fn amount(&self, key: FieldKey) -> Option<&bigdecimal::BigDecimal> {
        self.get(key).and_then(FieldValue::as_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn classifier_labels_parse_leniently() {
        assert_eq!(DocumentType::from_label("bill"), DocumentType::Bill);
        assert_eq!(DocumentType::from_label("  'Discharge'.\n"), DocumentType::DischargeSummary);
        assert_eq!(DocumentType::from_label("```\ndischarge summary\n```"), DocumentType::DischargeSummary);
        assert_eq!(DocumentType::from_label("Medical Bill"), DocumentType::Bill);
        assert_eq!(DocumentType::from_label("prescription"), DocumentType::Unknown);
    }

    #[test]
    fn document_type_serializes_as_snake_case() {
        assert_eq!(serde_json::to_value(DocumentType::DischargeSummary).unwrap(), json!("discharge_summary"));
        let parsed: DocumentType = serde_json::from_value(json!("discharge")).unwrap();
        assert_eq!(parsed, DocumentType::DischargeSummary);
    }

    #[test]
    fn parse_collects_values_and_errors() {
        let doc = ExtractedDocument::new(
            "summary.pdf",
            DocumentType::DischargeSummary,
            data(json!({
                "Patient Name": "Jane Doe",
                "Admission Date": "2024-01-01",
                "Discharge Date": "next tuesday",
                "Diagnosis": null,
                "Ward": "B2"
            })),
        );

        let parsed = doc.parse();
        assert_eq!(parsed.text(FieldKey::PatientName), Some("Jane Doe"));
        assert_eq!(parsed.date(FieldKey::AdmissionDate), chrono::NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parsed.date(FieldKey::DischargeDate), None);
        assert!(parsed.get(FieldKey::Diagnosis).is_none());
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].0, FieldKey::DischargeDate);
    }

    #[test]
    fn failed_document_serializes_error() {
        let doc = ExtractedDocument::failed("scan.pdf", DocumentType::Unknown, "invalid PDF");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "unknown");
        assert_eq!(json["error"], "invalid PDF");
        assert_eq!(json["data"], json!({}));
    }
}
