pub mod document;
pub mod field;
pub mod report;

pub use document::{DocumentType, ExtractedDocument, ParsedDocument};
pub use field::{FieldError, FieldKey, FieldKind, FieldValue};
pub use report::{ReportBuilder, RuleCategory, RuleDetail, RuleStatus, ValidationReport};
