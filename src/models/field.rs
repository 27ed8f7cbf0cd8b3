use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use std::str::FromStr;

use super::report::RuleCategory;

/// AI 返回的占位值, 视为缺失
const ABSENT_MARKERS: &[&str] = &["", "null", "none", "n/a", "na", "not available", "unknown", "-"];

/// 支持的日期格式 (美式医疗单据以 月/日/年 为主)
/// 两位年份格式在前: chrono 的 `%Y` 接受 1 到 4 位年份
const DATE_FORMATS: &[&str] = &[
    "%m/%d/%y",
    "%m-%d-%y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y%m%d",
];

/// 低于此年份的解析结果视为误读 (例如 `01/05/24` 被 `%Y` 读成 0001 年)
const MIN_PLAUSIBLE_YEAR: i32 = 1900;

/// 明细行对象中表示金额的键
const AMOUNT_MEMBERS: &[&str] = &["amount", "total", "charge", "cost", "price", "value"];

/// 字段期望类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Amount,
    Amounts,
    Date,
}

/// 规则使用的规范字段名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    PatientName,
    PatientId,
    ProviderName,
    ProviderAddress,
    TotalAmount,
    ItemizedCharges,
    ServiceDate,
    AdmissionDate,
    DischargeDate,
    Diagnosis,
    TreatmentSummary,
}

impl FieldKey {
    pub const ALL: [FieldKey; 11] = [
        FieldKey::PatientName,
        FieldKey::PatientId,
        FieldKey::ProviderName,
        FieldKey::ProviderAddress,
        FieldKey::TotalAmount,
        FieldKey::ItemizedCharges,
        FieldKey::ServiceDate,
        FieldKey::AdmissionDate,
        FieldKey::DischargeDate,
        FieldKey::Diagnosis,
        FieldKey::TreatmentSummary,
    ];

    /// 规范化后的别名 (见 `canonical_key`)
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            FieldKey::PatientName => &[
                "patient_name",
                "patient",
                "patient_full_name",
                "member_name",
                "name_of_patient",
            ],
            FieldKey::PatientId => &[
                "patient_id",
                "mrn",
                "medical_record_number",
                "member_id",
                "patient_number",
            ],
            FieldKey::ProviderName => &[
                "hospital",
                "hospital_name",
                "provider",
                "provider_name",
                "facility",
                "facility_name",
            ],
            FieldKey::ProviderAddress => &[
                "provider_address",
                "hospital_address",
                "facility_address",
            ],
            FieldKey::TotalAmount => &[
                "total_amount",
                "total",
                "amount_due",
                "total_charges",
                "total_due",
                "balance_due",
            ],
            FieldKey::ItemizedCharges => &[
                "itemized_charges",
                "line_items",
                "charges",
                "items",
                "itemized_items",
            ],
            FieldKey::ServiceDate => &["date_of_service", "service_date", "dos"],
            FieldKey::AdmissionDate => &["admission_date", "date_of_admission", "admit_date"],
            FieldKey::DischargeDate => &["discharge_date", "date_of_discharge"],
            FieldKey::Diagnosis => &["diagnosis", "primary_diagnosis"],
            FieldKey::TreatmentSummary => &["treatment_summary", "treatment"],
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldKey::TotalAmount => FieldKind::Amount,
            FieldKey::ItemizedCharges => FieldKind::Amounts,
            FieldKey::ServiceDate | FieldKey::AdmissionDate | FieldKey::DischargeDate => {
                FieldKind::Date
            }
            _ => FieldKind::Text,
        }
    }

    /// 报告中使用的可读名称
    pub fn label(&self) -> &'static str {
        match self {
            FieldKey::PatientName => "patient name",
            FieldKey::PatientId => "patient ID",
            FieldKey::ProviderName => "provider name",
            FieldKey::ProviderAddress => "provider address",
            FieldKey::TotalAmount => "total amount",
            FieldKey::ItemizedCharges => "itemized charges",
            FieldKey::ServiceDate => "service date",
            FieldKey::AdmissionDate => "admission date",
            FieldKey::DischargeDate => "discharge date",
            FieldKey::Diagnosis => "diagnosis",
            FieldKey::TreatmentSummary => "treatment summary",
        }
    }

    /// 字段解析失败时归入的报告分类
    pub fn category(&self) -> RuleCategory {
        match self {
            FieldKey::PatientName | FieldKey::PatientId => RuleCategory::PatientIdentity,
            FieldKey::ProviderName | FieldKey::ProviderAddress => RuleCategory::Provider,
            FieldKey::TotalAmount | FieldKey::ItemizedCharges => RuleCategory::Amounts,
            FieldKey::ServiceDate | FieldKey::AdmissionDate | FieldKey::DischargeDate => {
                RuleCategory::DateOrder
            }
            FieldKey::Diagnosis | FieldKey::TreatmentSummary => RuleCategory::Plausibility,
        }
    }

    /// 根据 AI 返回的原始键名查找规范字段
    pub fn from_raw_key(raw: &str) -> Option<FieldKey> {
        let key = canonical_key(raw);
        FieldKey::ALL
            .into_iter()
            .find(|k| k.aliases().contains(&key.as_str()))
    }
}

/// "Date of Service" -> "date_of_service"
pub fn canonical_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// 字段解析错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("unparseable date '{0}'")]
    InvalidDate(String),
    #[error("unparseable amount '{0}'")]
    InvalidAmount(String),
    #[error("unexpected value {0}")]
    UnexpectedShape(String),
}

/// 解析后的字段值 (带类型的联合体)
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Text(String),
    Number(BigDecimal),
    Date(NaiveDate),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// 按期望类型显式解析 AI 输出, 不信任其隐式类型
    pub fn parse(kind: FieldKind, raw: &Value) -> Result<FieldValue, FieldError> {
        if is_absent(raw) {
            return Ok(FieldValue::Absent);
        }

        match kind {
            FieldKind::Text => parse_text(raw).map(FieldValue::Text),
            FieldKind::Amount => parse_amount_value(raw).map(FieldValue::Number),
            FieldKind::Date => parse_date_value(raw).map(FieldValue::Date),
            FieldKind::Amounts => parse_amount_list(raw),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<&BigDecimal> {
        match self {
            FieldValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// 明细金额列表 (仅当所有元素都是数值)
    pub fn as_amounts(&self) -> Option<Vec<&BigDecimal>> {
        match self {
            FieldValue::List(items) => items.iter().map(FieldValue::as_amount).collect(),
            _ => None,
        }
    }
}

fn is_absent(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => ABSENT_MARKERS.contains(&s.trim().to_lowercase().as_str()),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn parse_text(raw: &Value) -> Result<String, FieldError> {
    match raw {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(FieldError::UnexpectedShape(other.to_string())),
    }
}

fn parse_amount_value(raw: &Value) -> Result<BigDecimal, FieldError> {
    match raw {
        Value::Number(n) => BigDecimal::from_str(&n.to_string())
            .map_err(|_| FieldError::InvalidAmount(n.to_string())),
        Value::String(s) => parse_amount(s),
        Value::Object(map) => AMOUNT_MEMBERS
            .iter()
            .find_map(|k| map.get(*k))
            .ok_or_else(|| FieldError::InvalidAmount(raw.to_string()))
            .and_then(parse_amount_value),
        other => Err(FieldError::InvalidAmount(other.to_string())),
    }
}

fn parse_amount_list(raw: &Value) -> Result<FieldValue, FieldError> {
    match raw {
        Value::Array(items) => items
            .iter()
            .filter(|item| !is_absent(item))
            .map(|item| parse_amount_value(item).map(FieldValue::Number))
            .collect::<Result<Vec<_>, _>>()
            .map(FieldValue::List),
        // 单个数值视为只有一行明细
        other => parse_amount_value(other).map(|n| FieldValue::List(vec![FieldValue::Number(n)])),
    }
}

fn parse_date_value(raw: &Value) -> Result<NaiveDate, FieldError> {
    match raw {
        Value::String(s) => parse_date(s),
        other => Err(FieldError::InvalidDate(other.to_string())),
    }
}

/// 解析金额: 去除货币符号/千分位, 括号表示负数
pub fn parse_amount(raw: &str) -> Result<BigDecimal, FieldError> {
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');

    let cleaned: String = trimmed
        .trim_start_matches("USD")
        .trim_end_matches("USD")
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | '(' | ')') && !c.is_whitespace())
        .collect();

    let amount = BigDecimal::from_str(&cleaned)
        .map_err(|_| FieldError::InvalidAmount(raw.to_string()))?;

    Ok(if negative { -amount } else { amount })
}

/// 解析日期: 依次尝试常见格式, 带时间的 ISO 字符串取日期部分
pub fn parse_date(raw: &str) -> Result<NaiveDate, FieldError> {
    let trimmed = raw.trim();

    let plausible = |date: &NaiveDate| date.year() >= MIN_PLAUSIBLE_YEAR;

    for fmt in DATE_FORMATS {
        if let Some(date) = NaiveDate::parse_from_str(trimmed, fmt).ok().filter(plausible) {
            return Ok(date);
        }
    }

    if let Some(prefix) = trimmed.get(..10) {
        if trimmed.len() > 10 && trimmed[10..].starts_with(['T', ' ']) {
            if let Some(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok().filter(plausible) {
                return Ok(date);
            }
        }
    }

    Err(FieldError::InvalidDate(raw.to_string()))
}

/// 姓名规范化: 忽略大小写, 合并空白
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 机构名称/地址规范化: 在姓名规范化的基础上忽略标点
pub fn normalize_provider(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    normalize_name(&spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn canonical_key_collapses_separators() {
        assert_eq!(canonical_key("Date of Service"), "date_of_service");
        assert_eq!(canonical_key("  Patient-Name: "), "patient_name");
        assert_eq!(canonical_key("total_amount"), "total_amount");
    }

    #[test]
    fn raw_keys_resolve_through_aliases() {
        assert_eq!(FieldKey::from_raw_key("Patient Name"), Some(FieldKey::PatientName));
        assert_eq!(FieldKey::from_raw_key("Hospital"), Some(FieldKey::ProviderName));
        assert_eq!(FieldKey::from_raw_key("Date of Service"), Some(FieldKey::ServiceDate));
        assert_eq!(FieldKey::from_raw_key("line_items"), Some(FieldKey::ItemizedCharges));
        assert_eq!(FieldKey::from_raw_key("Insurance Plan"), None);
    }

    #[test]
    fn dates_parse_in_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        for raw in ["2024-01-05", "01/05/2024", "January 5, 2024", "5 Jan 2024", "2024-01-05T08:30:00Z"] {
            assert_eq!(parse_date(raw), Ok(expected), "format {raw}");
        }
        assert!(matches!(parse_date("sometime last week"), Err(FieldError::InvalidDate(_))));
    }

    #[test]
    fn two_digit_years_are_not_read_as_ancient_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(parse_date("01/05/24"), Ok(expected));
        assert_eq!(parse_date("01-05-24"), Ok(expected));
        assert_eq!(parse_date("01/05/2024"), Ok(expected));
        assert!(matches!(parse_date("0001-05-24"), Err(FieldError::InvalidDate(_))));
    }

    #[test]
    fn bare_address_is_not_a_provider_field() {
        assert_eq!(FieldKey::from_raw_key("Address"), None);
        assert_eq!(FieldKey::from_raw_key("Hospital Address"), Some(FieldKey::ProviderAddress));
    }

    #[test]
    fn amounts_strip_currency_and_grouping() {
        assert_eq!(parse_amount("$1,234.50").unwrap(), dec("1234.50"));
        assert_eq!(parse_amount("USD 99").unwrap(), dec("99"));
        assert_eq!(parse_amount("(20.00)").unwrap(), dec("-20.00"));
        assert!(parse_amount("twelve dollars").is_err());
    }

    #[test]
    fn placeholders_are_absent() {
        for raw in [json!(null), json!("N/A"), json!("  "), json!([])] {
            assert_eq!(FieldValue::parse(FieldKind::Date, &raw), Ok(FieldValue::Absent));
        }
    }

    #[test]
    fn itemized_charges_accept_numbers_and_objects() {
        let raw = json!([100.0, {"description": "Room", "amount": "$250.50"}]);
        let parsed = FieldValue::parse(FieldKind::Amounts, &raw).unwrap();
        let amounts = parsed.as_amounts().unwrap();
        assert_eq!(amounts, vec![&dec("100.0"), &dec("250.50")]);
    }

    #[test]
    fn text_fields_reject_nested_objects() {
        let raw = json!({"first": "Jane"});
        assert!(matches!(
            FieldValue::parse(FieldKind::Text, &raw),
            Err(FieldError::UnexpectedShape(_))
        ));
    }

    #[test]
    fn normalization_ignores_case_whitespace_and_punctuation() {
        assert_eq!(normalize_name("  JOHN   doe "), "john doe");
        assert_eq!(normalize_provider("St. Mary's Hospital, Inc."), "st marys hospital inc");
        assert_eq!(normalize_provider("ST MARYS  HOSPITAL INC"), "st marys hospital inc");
    }
}
