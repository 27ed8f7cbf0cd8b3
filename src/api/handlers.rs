use axum::{
    extract::{Json, Multipart, State},
    response::Html,
};
use serde::Serialize;

use super::{ApiError, AppState};
use crate::service::{ClaimResult, UploadedFile};

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ai: &'static str,
    pub ocr: &'static str,
}

/// 健康检查
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ocr_available = match &state.ocr {
        Some(engine) => engine.is_available().await,
        None => false,
    };

    Json(HealthResponse {
        status: "healthy",
        ai: if state.processor.is_ai_configured() {
            "configured"
        } else {
            "not configured"
        },
        ocr: if ocr_available { "available" } else { "unavailable" },
    })
}

/// 上传页面
pub async fn index_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE_HTML)
}

/// 批量处理理赔单据: 接收任意字段名的文件, 逐个处理后统一校验
pub async fn process_claim(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ClaimResult>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(ApiError::from)?
    {
        // 没有文件名的普通表单字段忽略
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!("Failed to read upload {}: {}", filename, e);
            ApiError::from(e)
        })?;
        files.push(UploadedFile::new(filename, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::NoFiles);
    }
    if !state.processor.is_ai_configured() {
        return Err(ApiError::NotConfigured);
    }

    tracing::info!(
        "收到 {} 个文件: {:?}",
        files.len(),
        files.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>()
    );

    let result = state.processor.process_documents(files).await;
    Ok(Json(result))
}

const UPLOAD_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Medical Claims Processor</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
        .upload-form { border: 2px dashed #ccc; padding: 20px; text-align: center; margin: 20px 0; }
        pre { background: #f6f6f6; padding: 12px; overflow-x: auto; }
    </style>
</head>
<body>
    <h1>Medical Claims Processor</h1>
    <div class="upload-form">
        <h2>Upload Documents</h2>
        <form id="upload" action="/api/v1/process-claim" method="post" enctype="multipart/form-data">
            <input type="file" name="files" multiple accept=".pdf" required>
            <br><br>
            <button type="submit">Process Documents</button>
        </form>
    </div>
    <pre id="result"></pre>
    <script>
        document.getElementById('upload').addEventListener('submit', async (event) => {
            event.preventDefault();
            const output = document.getElementById('result');
            output.textContent = 'Processing...';
            const response = await fetch(event.target.action, { method: 'POST', body: new FormData(event.target) });
            output.textContent = JSON.stringify(await response.json(), null, 2);
        });
    </script>
</body>
</html>
"#;
