use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// 错误响应体 `{error: {code, message}}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// HTTP 层错误 (单个文件的处理错误不在此列, 见 `ProcessingError`)
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),
    #[error("No files uploaded")]
    NoFiles,
    #[error("AI service is not configured")]
    NotConfigured,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::PayloadTooLarge(detail) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "FILE_TOO_LARGE",
                format!("File too large: {}", detail),
            ),
            ApiError::NoFiles => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "NO_FILES",
                "At least one PDF file must be uploaded".to_string(),
            ),
            ApiError::NotConfigured => {
                tracing::error!("Request rejected: GOOGLE_API_KEY is not configured");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "AI_NOT_CONFIGURED",
                    "AI service is not configured, set GOOGLE_API_KEY".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

// 保留 multipart 解析错误自带的状态码 (超出请求体上限时为 413)
impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}
