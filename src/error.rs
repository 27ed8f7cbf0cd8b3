use crate::client::{AiError, PdfError};

/// 单个文件处理错误 (只影响该文件, 不中断整批)
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("{0} is not a PDF file")]
    NotPdfFile(String),
    #[error("empty file")]
    EmptyFile,
    #[error("file too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error("could not extract text from document")]
    NoText,
    #[error("AI service error: {0}")]
    Ai(#[from] AiError),
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),
}
