use medical_claims_rust::api::{self, AppState};
use medical_claims_rust::client::{GeminiClient, OcrEngine, PdfTextExtractor, TesseractOcr};
use medical_claims_rust::{AppConfig, DocumentProcessor, ValidationEngine};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!("Starting server with config: {:?}", config);

    // AI 客户端 (未配置密钥时服务仍可启动, 处理请求返回 503)
    let gemini = GeminiClient::new(&config.gemini)?;
    if config.has_api_key() {
        info!("AI model: {}", gemini.model());
    } else {
        warn!("GOOGLE_API_KEY 未配置, 单据处理接口将不可用");
    }

    // OCR (可选)
    let ocr: Option<Arc<dyn OcrEngine>> = if config.ocr.enabled {
        let engine = TesseractOcr::new(&config.ocr);
        if engine.is_available().await {
            info!("OCR enabled ({})", config.ocr.tesseract_cmd);
            Some(Arc::new(engine))
        } else {
            warn!("{} not found, scanned pages will be skipped", config.ocr.tesseract_cmd);
            None
        }
    } else {
        info!("OCR disabled");
        None
    };

    let processor = DocumentProcessor::new(
        Arc::new(gemini),
        PdfTextExtractor::new(ocr.clone()),
        config.upload.clone(),
        ValidationEngine::from_config(&config.validation),
    );

    // 构建路由
    let state = AppState {
        processor: Arc::new(processor),
        ocr,
    };
    let app = api::router(state, config.upload.max_request_size);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET  /                      - Upload page");
    info!("  GET  /health                - Health check");
    info!("  POST /api/v1/process-claim  - Process and validate claim documents");
    info!("  POST /process-documents     - Alias of /api/v1/process-claim");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
