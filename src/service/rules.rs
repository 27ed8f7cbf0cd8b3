//! 跨单据校验规则
//!
//! 每条规则相互独立, 只向 `ReportBuilder` 累加差异/警告.
//! 规则所需字段缺失时视为不适用 (跳过并记录警告), 不视为失败.

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::str::FromStr;

use crate::models::field::{normalize_name, normalize_provider};
use crate::models::{DocumentType, ExtractedDocument, FieldKey, ParsedDocument, ReportBuilder, RuleCategory};

/// 总额合理上限
const MAX_PLAUSIBLE_TOTAL: i64 = 1_000_000;

/// 完整性: 检查必需单据类型是否齐全 (缺失不导致无效)
pub fn check_completeness(
    documents: &[ExtractedDocument],
    required: &[DocumentType],
    report: &mut ReportBuilder,
) {
    let mut present: HashSet<DocumentType> = HashSet::new();

    for doc in documents {
        if let Some(error) = &doc.error {
            report.warning(
                RuleCategory::Completeness,
                format!("{} could not be processed and was excluded from validation: {}", doc.filename, error),
            );
        } else if doc.document_type == DocumentType::Unknown {
            report.warning(
                RuleCategory::Completeness,
                format!("{} could not be classified as a bill or discharge summary", doc.filename),
            );
        } else {
            present.insert(doc.document_type);
        }
    }

    for document_type in required {
        if !present.contains(document_type) {
            report.missing(*document_type);
        }
    }
}

/// 字段解析失败 -> 警告 (字段按缺失处理)
pub fn report_parse_errors(documents: &[ParsedDocument], report: &mut ReportBuilder) {
    for doc in documents {
        for (key, error) in &doc.errors {
            report.warning(
                key.category(),
                format!("{}: {} ignored, {}", doc.filename, key.label(), error),
            );
        }
    }
}

/// 文本字段逐单据比对 (以第一个携带该字段的单据为基准)
/// 返回携带该字段的单据数量
fn compare_text_field(
    documents: &[ParsedDocument],
    key: FieldKey,
    normalize: fn(&str) -> String,
    category: RuleCategory,
    report: &mut ReportBuilder,
) -> usize {
    let carriers: Vec<(&str, &str, String)> = documents
        .iter()
        .filter_map(|doc| {
            doc.text(key)
                .map(|raw| (doc.filename.as_str(), raw, normalize(raw)))
        })
        .filter(|(_, _, normalized)| !normalized.is_empty())
        .collect();

    let Some((ref_file, ref_raw, ref_norm)) = carriers.first() else {
        return 0;
    };

    for (file, raw, normalized) in carriers.iter().skip(1) {
        if normalized != ref_norm {
            report.discrepancy(
                category,
                format!(
                    "{} mismatch: '{}' in {} vs '{}' in {}",
                    capitalize(key.label()),
                    ref_raw,
                    ref_file,
                    raw,
                    file
                ),
            );
        }
    }

    carriers.len()
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 患者身份: 姓名/ID 忽略大小写与多余空白后必须一致
pub fn check_patient_identity(documents: &[ParsedDocument], report: &mut ReportBuilder) {
    let category = RuleCategory::PatientIdentity;
    let names = compare_text_field(documents, FieldKey::PatientName, normalize_name, category, report);
    let ids = compare_text_field(documents, FieldKey::PatientId, normalize_name, category, report);

    if names < 2 && ids < 2 {
        report.skip(
            category,
            "Patient identity not checked: fewer than two documents state a patient name or ID",
        );
    }
}

/// 医疗机构: 名称/地址规范化后必须一致
pub fn check_provider(documents: &[ParsedDocument], report: &mut ReportBuilder) {
    let category = RuleCategory::Provider;
    let names = compare_text_field(documents, FieldKey::ProviderName, normalize_provider, category, report);
    let addresses =
        compare_text_field(documents, FieldKey::ProviderAddress, normalize_provider, category, report);

    if names < 2 && addresses < 2 {
        report.skip(
            category,
            "Provider not checked: fewer than two documents state a provider name or address",
        );
    }
}

/// 收集某日期字段, 不同单据给出不同值时记录差异; 返回基准值
fn agreed_date(
    documents: &[ParsedDocument],
    key: FieldKey,
    report: &mut ReportBuilder,
) -> Option<(NaiveDate, String)> {
    let stated: Vec<(NaiveDate, &str)> = documents
        .iter()
        .filter_map(|doc| doc.date(key).map(|d| (d, doc.filename.as_str())))
        .collect();

    let (reference, ref_file) = *stated.first()?;
    for (date, file) in stated.iter().skip(1) {
        if *date != reference {
            report.discrepancy(
                RuleCategory::DateOrder,
                format!(
                    "Conflicting {}: {} in {} vs {} in {}",
                    key.label(),
                    reference,
                    ref_file,
                    date,
                    file
                ),
            );
        }
    }

    Some((reference, ref_file.to_string()))
}

/// 日期顺序: 入院日期 <= 服务日期 <= 出院日期
pub fn check_date_order(documents: &[ParsedDocument], report: &mut ReportBuilder) {
    let category = RuleCategory::DateOrder;

    let admission = agreed_date(documents, FieldKey::AdmissionDate, report);
    let discharge = agreed_date(documents, FieldKey::DischargeDate, report);
    let services: Vec<(NaiveDate, &str)> = documents
        .iter()
        .filter_map(|doc| {
            doc.date(FieldKey::ServiceDate)
                .map(|d| (d, doc.filename.as_str()))
        })
        .collect();

    let comparable =
        usize::from(admission.is_some()) + usize::from(discharge.is_some()) + usize::from(!services.is_empty());
    if comparable < 2 {
        report.skip(
            category,
            "Date order not checked: fewer than two of admission, service and discharge dates are available",
        );
        return;
    }

    if let (Some((admitted, _)), Some((discharged, _))) = (&admission, &discharge) {
        if admitted > discharged {
            report.discrepancy(
                category,
                format!("Admission date {} is after discharge date {}", admitted, discharged),
            );
        }
    }

    for (service, file) in &services {
        if let Some((admitted, _)) = &admission {
            if service < admitted {
                report.discrepancy(
                    category,
                    format!("Service date {} in {} is before admission date {}", service, file, admitted),
                );
            }
        }
        if let Some((discharged, _)) = &discharge {
            if service > discharged {
                report.discrepancy(
                    category,
                    format!("Service date {} in {} is after discharge date {}", service, file, discharged),
                );
            }
        }
    }
}

/// 金额一致性: 明细合计与总额之差不超过容差
pub fn check_amounts(documents: &[ParsedDocument], tolerance: &BigDecimal, report: &mut ReportBuilder) {
    let category = RuleCategory::Amounts;
    let mut checked = 0usize;

    for doc in documents {
        let Some(total) = doc.amount(FieldKey::TotalAmount) else {
            continue;
        };
        let Some(items) = doc
            .get(FieldKey::ItemizedCharges)
            .and_then(|v| v.as_amounts())
            .filter(|items| !items.is_empty())
        else {
            continue;
        };

        checked += 1;
        let sum = items
            .into_iter()
            .fold(BigDecimal::zero(), |acc, amount| acc + amount);
        let difference = (&sum - total).abs();

        if &difference > tolerance {
            report.discrepancy(
                category,
                format!(
                    "{}: itemized charges sum to {} but stated total is {}",
                    doc.filename, sum, total
                ),
            );
        }
    }

    if checked == 0 {
        report.skip(
            category,
            "Amount consistency not checked: no document states both itemized charges and a total",
        );
    }
}

/// 合理性检查 (只产生警告): 未来日期, 异常总额, 不完整的患者姓名
pub fn check_plausibility(documents: &[ParsedDocument], today: NaiveDate, report: &mut ReportBuilder) {
    let category = RuleCategory::Plausibility;
    let max_total = BigDecimal::from(MAX_PLAUSIBLE_TOTAL);

    for doc in documents {
        for key in [FieldKey::AdmissionDate, FieldKey::ServiceDate, FieldKey::DischargeDate] {
            if let Some(date) = doc.date(key) {
                if date > today {
                    report.warning(
                        category,
                        format!("{}: {} {} is in the future", doc.filename, key.label(), date),
                    );
                }
            }
        }

        if let Some(total) = doc.amount(FieldKey::TotalAmount) {
            if *total <= BigDecimal::zero() {
                report.warning(category, format!("{}: total amount {} is not positive", doc.filename, total));
            } else if *total >= max_total {
                report.warning(
                    category,
                    format!("{}: total amount {} is implausibly large", doc.filename, total),
                );
            }
        }

        if let Some(name) = doc.text(FieldKey::PatientName) {
            if name.split_whitespace().count() < 2 {
                report.warning(
                    category,
                    format!("{}: patient name '{}' looks incomplete", doc.filename, name),
                );
            }
        }
    }
}

/// 配置中的浮点容差 -> 十进制 (避免二进制浮点误差)
pub fn tolerance_from_f64(value: f64) -> BigDecimal {
    BigDecimal::from_str(&value.abs().to_string()).unwrap_or_else(|_| BigDecimal::zero())
}
