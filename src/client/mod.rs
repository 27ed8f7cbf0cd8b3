pub mod gemini;
pub mod ocr;
pub mod pdf;

use async_trait::async_trait;

pub use gemini::{AiError, GeminiClient};
pub use ocr::{OcrEngine, OcrError, TesseractOcr};
pub use pdf::{ExtractedText, PdfError, PdfInfo, PdfTextExtractor};

/// 生成式 AI 文本补全 (分类与字段抽取共用)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;

    /// 是否已配置可用的凭据
    fn is_configured(&self) -> bool {
        true
    }
}
