use axum::{
    body::Bytes,
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use crate::{ApiError, DetectShotsRequest, DetectShotsResponse, HealthResponse, ShotDetector};

/// 所有请求共享的只读状态
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn ShotDetector>,
}

impl AppState {
    pub fn new(detector: impl ShotDetector + 'static) -> Self {
        Self {
            detector: Arc::new(detector),
        }
    }
}

/// 构建路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/detect-shots", post(detect_shots))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 健康检查 Handler
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// 镜头检测 Handler
#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn detect_shots(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DetectShotsResponse>, ApiError> {
    let video_path = resolve_video_path(&body)?;
    info!("收到镜头检测请求: {}", video_path.display());

    // 检测是阻塞调用，放到阻塞线程池中执行
    let detector = Arc::clone(&state.detector);
    let path = video_path.clone();
    let scenes = tokio::task::spawn_blocking(move || detector.detect(&path))
        .await
        .map_err(|e| {
            error!("检测任务异常退出: {}", e);
            ApiError::Internal(format!("detection task failed: {}", e))
        })?
        .map_err(|e| {
            error!("镜头检测失败: {:#}", e);
            ApiError::from(e)
        })?;

    let response = DetectShotsResponse::from_scenes(&scenes);
    info!("检测完成: {} 个镜头", response.total_shots);

    Ok(Json(response))
}

/// 解析请求体并校验视频路径
///
/// - 空请求体、缺少或为空的 `video_path` → `MissingParameter`
/// - 非法 JSON 或字段类型错误 → `InvalidRequest`
/// - 路径不存在 → `NotFound`
pub fn resolve_video_path(body: &[u8]) -> Result<PathBuf, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::MissingParameter);
    }

    let request: DetectShotsRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let video_path = request
        .video_path
        .filter(|p| !p.is_empty())
        .ok_or(ApiError::MissingParameter)?;

    check_video_path(video_path)
}

/// 校验视频路径是否存在
pub fn check_video_path(video_path: impl Into<PathBuf>) -> Result<PathBuf, ApiError> {
    let video_path = video_path.into();
    if !video_path.exists() {
        return Err(ApiError::NotFound);
    }
    Ok(video_path)
}
