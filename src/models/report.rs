use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::document::DocumentType;

/// 校验规则分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Completeness,
    PatientIdentity,
    DateOrder,
    Provider,
    Amounts,
    Plausibility,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 6] = [
        RuleCategory::Completeness,
        RuleCategory::PatientIdentity,
        RuleCategory::DateOrder,
        RuleCategory::Provider,
        RuleCategory::Amounts,
        RuleCategory::Plausibility,
    ];
}

/// 单条规则的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Passed,
    Warning,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDetail {
    pub status: RuleStatus,
    pub findings: Vec<String>,
}

impl Default for RuleDetail {
    fn default() -> Self {
        Self {
            status: RuleStatus::Passed,
            findings: Vec::new(),
        }
    }
}

/// 校验报告 (请求级, 创建后不再修改)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub missing_documents: Vec<DocumentType>,
    pub discrepancies: Vec<String>,
    pub warnings: Vec<String>,
    pub details: IndexMap<RuleCategory, RuleDetail>,
}

impl ValidationReport {
    pub fn detail(&self, category: RuleCategory) -> Option<&RuleDetail> {
        self.details.get(&category)
    }
}

/// 报告构建器 - 各规则独立累加差异与警告
#[derive(Debug)]
pub struct ReportBuilder {
    missing_documents: Vec<DocumentType>,
    discrepancies: Vec<String>,
    warnings: Vec<String>,
    details: IndexMap<RuleCategory, RuleDetail>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        let details = RuleCategory::ALL
            .into_iter()
            .map(|c| (c, RuleDetail::default()))
            .collect();

        Self {
            missing_documents: Vec::new(),
            discrepancies: Vec::new(),
            warnings: Vec::new(),
            details,
        }
    }

    fn entry(&mut self, category: RuleCategory) -> &mut RuleDetail {
        self.details.entry(category).or_default()
    }

    /// 记录差异 (使报告无效)
    pub fn discrepancy(&mut self, category: RuleCategory, message: impl Into<String>) {
        let message = message.into();
        let detail = self.entry(category);
        detail.status = RuleStatus::Failed;
        detail.findings.push(message.clone());
        self.discrepancies.push(message);
    }

    /// 记录警告 (不影响有效性)
    pub fn warning(&mut self, category: RuleCategory, message: impl Into<String>) {
        let message = message.into();
        let detail = self.entry(category);
        if detail.status == RuleStatus::Passed {
            detail.status = RuleStatus::Warning;
        }
        detail.findings.push(message.clone());
        self.warnings.push(message);
    }

    /// 规则不适用: 跳过并记录警告
    pub fn skip(&mut self, category: RuleCategory, message: impl Into<String>) {
        self.warning(category, message);
        let detail = self.entry(category);
        if detail.status != RuleStatus::Failed {
            detail.status = RuleStatus::Skipped;
        }
    }

    /// 记录缺失的单据类型
    pub fn missing(&mut self, document_type: DocumentType) {
        if self.missing_documents.contains(&document_type) {
            return;
        }
        self.missing_documents.push(document_type);
        self.warning(
            RuleCategory::Completeness,
            format!("Missing required document: {}", document_type.label()),
        );
    }

    pub fn finish(self) -> ValidationReport {
        ValidationReport {
            is_valid: self.discrepancies.is_empty(),
            missing_documents: self.missing_documents,
            discrepancies: self.discrepancies,
            warnings: self.warnings,
            details: self.details,
        }
    }
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
