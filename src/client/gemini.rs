use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::LanguageModel;
use crate::config::GeminiConfig;

/// 错误响应体截断长度
const MAX_ERROR_BODY: usize = 500;

/// 生成式 AI 调用错误
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI API key is not configured")]
    NotConfigured,
    #[error("cannot reach AI service at {0}")]
    Connection(String),
    #[error("AI request timed out after {0}s")]
    Timeout(u64),
    #[error("AI service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("HTTP client error: {0}")]
    Http(String),
    #[error("AI response parsing failed: {0}")]
    ResponseParsing(String),
    #[error("AI response contained no text")]
    EmptyResponse,
}

/// Google Generative Language REST 客户端
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::Http(e.to_string()))?;

        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty() && k != "your_api_key_here");

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            client,
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

/// generateContent 请求体
#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// generateContent 响应体
#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        }
    }
}

/// 取第一个候选结果的全部文本片段
fn candidate_text(response: GenerateContentResponse) -> Result<String, AiError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(text.trim().to_string())
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AiError::NotConfigured);
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&GenerateContentRequest::new(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AiError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    AiError::Timeout(self.timeout_secs)
                } else {
                    AiError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                body.truncate(cut);
            }
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AiError::Timeout(self.timeout_secs)
            } else {
                AiError::ResponseParsing(e.to_string())
            }
        })?;

        candidate_text(parsed)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
