pub mod error;
pub mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::OcrEngine;
use crate::service::DocumentProcessor;

pub use error::ApiError;
pub use handlers::{health_check, index_page, process_claim};

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<DocumentProcessor>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
}

/// 构建路由
pub fn router(state: AppState, max_request_size: usize) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/health", get(health_check))
        .route("/api/v1/process-claim", post(process_claim))
        .route("/process-documents", post(process_claim))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
