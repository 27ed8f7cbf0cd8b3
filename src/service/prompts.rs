use serde_json::{Map, Value};

use crate::error::ProcessingError;
use crate::models::DocumentType;

/// 发送给模型的单据文本上限 (字符)
const MAX_DOCUMENT_CHARS: usize = 30_000;

const BILL_FIELDS: &[&str] = &[
    "Patient Name",
    "Patient ID",
    "Hospital",
    "Hospital Address",
    "Total Amount",
    "Itemized Charges",
    "Date of Service",
];

const DISCHARGE_FIELDS: &[&str] = &[
    "Patient Name",
    "Patient ID",
    "Hospital",
    "Hospital Address",
    "Admission Date",
    "Discharge Date",
    "Diagnosis",
    "Treatment Summary",
];

/// 各类型单据期望抽取的字段
pub fn expected_fields(document_type: DocumentType) -> &'static [&'static str] {
    match document_type {
        DocumentType::Bill => BILL_FIELDS,
        DocumentType::DischargeSummary => DISCHARGE_FIELDS,
        DocumentType::Unknown => &[],
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_DOCUMENT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn classification_prompt(text: &str) -> String {
    format!(
        "Analyze this medical document and classify it as either a medical bill or a discharge summary.\n\
         Return only one word: 'bill', 'discharge' or 'unknown'.\n\n\
         Document text:\n{}\n",
        truncate(text)
    )
}

pub fn extraction_prompt(text: &str, document_type: DocumentType) -> String {
    let keys = expected_fields(document_type)
        .iter()
        .map(|k| format!("- \"{}\"", k))
        .collect::<Vec<_>>()
        .join("\n");

    let hints = match document_type {
        DocumentType::Bill => {
            "\"Total Amount\" must be a number. \"Itemized Charges\" must be a list of \
             {\"description\": string, \"amount\": number}. Dates must use YYYY-MM-DD."
        }
        _ => "Dates must use YYYY-MM-DD.",
    };

    format!(
        "Extract the following information from this {} and return ONLY a JSON object with these exact keys:\n\
         {}\n\
         Use null for any value that is not present in the document. {}\n\n\
         Document text:\n{}\n",
        document_type.label(),
        keys,
        hints,
        truncate(text)
    )
}

/// 从模型回复中找出 JSON 块 (代码块或首尾花括号之间)
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// 解析字段抽取结果, 缺失的期望字段补 null
pub fn parse_field_map(
    response: &str,
    document_type: DocumentType,
) -> Result<Map<String, Value>, ProcessingError> {
    let block = extract_json_block(response)
        .ok_or_else(|| ProcessingError::MalformedResponse("no JSON object in response".to_string()))?;

    let mut fields = match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            return Err(ProcessingError::MalformedResponse(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
        Err(e) => return Err(ProcessingError::MalformedResponse(e.to_string())),
    };

    for key in expected_fields(document_type) {
        fields.entry(key.to_string()).or_insert(Value::Null);
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_block_found_inside_fences_and_prose() {
        assert_eq!(extract_json_block("```json\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_block("```\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(
            extract_json_block("Here is the result: {\"a\": {\"b\": 2}} Done."),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn missing_expected_keys_are_filled_with_null() {
        let fields = parse_field_map(
            "```json\n{\"Patient Name\": \"Jane Doe\", \"Total Amount\": 350.5}\n```",
            DocumentType::Bill,
        )
        .unwrap();

        assert_eq!(fields["Patient Name"], "Jane Doe");
        assert_eq!(fields["Date of Service"], Value::Null);
        assert_eq!(fields.len(), BILL_FIELDS.len());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let result = parse_field_map("{\"Patient Name\": \"Jane\",", DocumentType::Bill);
        assert!(matches!(result, Err(ProcessingError::MalformedResponse(_))));

        let result = parse_field_map("{not json}", DocumentType::DischargeSummary);
        assert!(matches!(result, Err(ProcessingError::MalformedResponse(_))));
    }

    #[test]
    fn prompts_name_expected_keys() {
        let prompt = extraction_prompt("BILL TEXT", DocumentType::DischargeSummary);
        assert!(prompt.contains("\"Admission Date\""));
        assert!(prompt.contains("discharge summary"));
        assert!(prompt.ends_with("BILL TEXT\n"));

        let long = "x".repeat(MAX_DOCUMENT_CHARS + 100);
        assert!(classification_prompt(&long).len() < long.len() + 300);
    }
}
