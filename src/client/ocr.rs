use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::OcrConfig;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to start {command}: {message}")]
    Spawn { command: String, message: String },
    #[error("OCR I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tesseract exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// OCR 引擎 (图片字节 -> 文本)
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError>;

    /// 引擎是否可用 (用于健康检查)
    async fn is_available(&self) -> bool;
}

/// 调用本地 tesseract 命令行
pub struct TesseractOcr {
    command: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            command: config.tesseract_cmd.clone(),
            language: config.language.clone(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        // tesseract stdin stdout: 从标准输入读图片, 文本写到标准输出
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OcrError::Spawn {
                command: self.command.clone(),
                message: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(chars = text.len(), "OCR finished");
        Ok(text)
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
