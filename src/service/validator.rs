use bigdecimal::BigDecimal;
use chrono::{Local, NaiveDate};

use super::rules;
use crate::config::ValidationConfig;
use crate::models::{DocumentType, ExtractedDocument, ParsedDocument, ReportBuilder, ValidationReport};

/// 校验引擎: 一组单据字段 -> 校验报告
/// 纯函数式, 不抛错; 数据缺失时规则降级为跳过/警告
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    required_documents: Vec<DocumentType>,
    amount_tolerance: BigDecimal,
}

impl ValidationEngine {
    pub fn new(required_documents: Vec<DocumentType>, amount_tolerance: BigDecimal) -> Self {
        Self {
            required_documents,
            amount_tolerance,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(
            config.required_documents.clone(),
            rules::tolerance_from_f64(config.amount_tolerance),
        )
    }

    /// 以本地当前日期为基准校验
    pub fn validate(&self, documents: &[ExtractedDocument]) -> ValidationReport {
        self.validate_at(documents, Local::now().date_naive())
    }

    pub fn validate_at(&self, documents: &[ExtractedDocument], today: NaiveDate) -> ValidationReport {
        let mut report = ReportBuilder::new();

        rules::check_completeness(documents, &self.required_documents, &mut report);

        // 处理失败的单据不参与字段规则
        let parsed: Vec<ParsedDocument> = documents
            .iter()
            .filter(|doc| !doc.is_failed())
            .map(ExtractedDocument::parse)
            .collect();

        rules::report_parse_errors(&parsed, &mut report);
        rules::check_patient_identity(&parsed, &mut report);
        rules::check_date_order(&parsed, &mut report);
        rules::check_provider(&parsed, &mut report);
        rules::check_amounts(&parsed, &self.amount_tolerance, &mut report);
        rules::check_plausibility(&parsed, today, &mut report);

        let report = report.finish();
        tracing::info!(
            "Validation finished: {} documents, valid: {}, discrepancies: {}, warnings: {}",
            documents.len(),
            report.is_valid,
            report.discrepancies.len(),
            report.warnings.len()
        );
        report
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::from_config(&crate::config::AppConfig::default().validation)
    }
}
