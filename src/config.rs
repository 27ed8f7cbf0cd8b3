use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::DocumentType;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub upload: UploadConfig,
    pub ocr: OcrConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Gemini 生成式 AI 服务
#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

// 日志中不输出密钥
impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// 上传限制 (字节)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    pub enabled: bool,
    pub tesseract_cmd: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// 明细合计与总额的允许误差
    pub amount_tolerance: f64,
    pub required_documents: Vec<DocumentType>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            gemini: GeminiConfig {
                api_key: None,
                model: "gemini-1.5-flash".to_string(),
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                timeout_secs: 60,
            },
            upload: UploadConfig {
                max_file_size: 10 * 1024 * 1024,
                max_request_size: 50 * 1024 * 1024,
            },
            ocr: OcrConfig {
                enabled: true,
                tesseract_cmd: "tesseract".to_string(),
                language: "eng".to_string(),
            },
            validation: ValidationConfig {
                amount_tolerance: 0.01,
                required_documents: vec![DocumentType::Bill, DocumentType::DischargeSummary],
            },
        }
    }
}

impl AppConfig {
    /// 分层加载: 默认值 -> claims.toml (可选) -> CLAIMS__SECTION__KEY 环境变量 -> 兼容旧环境变量
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("claims").required(false))
            .add_source(
                Environment::with_prefix("CLAIMS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("gemini.api_key", std::env::var("GOOGLE_API_KEY").ok())?
            .build()?
            .try_deserialize()
    }

    /// 从环境变量加载配置, 出错时回退到默认值
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// 是否已配置 AI 密钥 (忽略示例占位值)
    pub fn has_api_key(&self) -> bool {
        self.gemini
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty() && k != "your_api_key_here")
    }
}
