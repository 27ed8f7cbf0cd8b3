pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use error::ProcessingError;
pub use models::{DocumentType, ExtractedDocument, ValidationReport};
pub use service::{DocumentProcessor, ValidationEngine};
