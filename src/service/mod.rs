pub mod processor;
pub mod prompts;
pub mod rules;
pub mod validator;

pub use processor::{ClaimResult, DocumentProcessor, UploadedFile};
pub use validator::ValidationEngine;
