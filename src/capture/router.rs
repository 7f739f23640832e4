//! 捕获 API 路由

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

use super::handlers::{
    capture_request, clear_logs, download_logs, get_latest, get_logs, get_recent, health,
};
use super::service::CaptureService;

/// 捕获 API 状态
#[derive(Clone)]
pub struct CaptureState {
    pub service: Arc<CaptureService>,
}

/// 创建捕获 API 路由
///
/// # 端点
/// - `GET /latest` - 最近一条记录
/// - `GET /logs` - 全部历史（读取日志文件）
/// - `GET /recent` - 内存中最近的记录
/// - `GET /download` - 下载原始日志（JSON Lines）
/// - `GET|POST /clear` - 清空内存缓冲和日志文件
/// - `GET /health` - 健康检查
///
/// 其余任意路径、任意方法的请求都会被捕获
pub fn create_capture_router(service: Arc<CaptureService>) -> Router {
    let state = CaptureState { service };

    Router::new()
        .route("/latest", get(get_latest))
        .route("/logs", get(get_logs))
        .route("/recent", get(get_recent))
        .route("/download", get(download_logs))
        .route("/clear", get(clear_logs).post(clear_logs))
        .route("/health", get(health))
        .fallback(capture_request)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
