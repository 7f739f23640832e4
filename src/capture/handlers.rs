//! 捕获 API 处理器

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;

use crate::common::{parse_urlencoded, truncate_with_ellipsis};

use super::error::CaptureError;
use super::model::{CaptureRequest, Headers};
use super::router::CaptureState;
use super::service::CaptureService;
use super::types::{
    EntryListResponse, ErrorResponse, HealthResponse, RecentResponse, SuccessResponse,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// 在阻塞线程池中执行核心操作（追加会 fsync，不能占用异步线程）
async fn run_blocking<T, F>(state: &CaptureState, f: F) -> Result<T, Response>
where
    F: FnOnce(&CaptureService) -> T + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || f(service.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!("后台任务执行失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(format!("后台任务执行失败: {}", e))),
            )
                .into_response()
        })
}

/// 任意路径、任意方法：捕获请求
pub async fn capture_request(
    State(state): State<CaptureState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = build_capture_request(&method, &uri, &headers, &body);
    if let Some(ref text) = request.body {
        tracing::debug!("请求体预览: {}", truncate_with_ellipsis(text, 256));
    }

    let result = match run_blocking(&state, move |service| service.capture(request)).await {
        Ok(result) => result,
        Err(response) => return response,
    };

    match result {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => {
            let id = e.entry().id.clone();
            let CaptureError::Persist { source, .. } = &e;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(
                    ErrorResponse::storage_error(format!("请求已记录到内存，但持久化失败: {}", source))
                        .with_entry_id(id),
                ),
            )
                .into_response()
        }
    }
}

/// 把 HTTP 请求整理为待捕获的内容
///
/// GET 的参数总是取 query；其他方法的表单请求体解析为参数。
/// 未解析为参数的非空请求体原样保存
fn build_capture_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> CaptureRequest {
    let is_form = *method != Method::GET
        && headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .eq_ignore_ascii_case(FORM_CONTENT_TYPE)
            })
            .unwrap_or(false);

    let request = CaptureRequest::new(method.as_str())
        .with_path(uri.path())
        .with_headers(collect_headers(headers));

    if is_form {
        request.with_params(parse_urlencoded(&String::from_utf8_lossy(body)))
    } else {
        let request = request.with_params(parse_urlencoded(uri.query().unwrap_or_default()));
        if body.is_empty() {
            request
        } else {
            request.with_body(String::from_utf8_lossy(body))
        }
    }
}

/// 同名请求头以 ", " 拼接
fn collect_headers(headers: &HeaderMap) -> Headers {
    let mut collected = Headers::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

/// GET /latest
pub async fn get_latest(State(state): State<CaptureState>) -> Response {
    match state.service.latest() {
        Some(entry) => Json(entry).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found("暂无捕获记录")),
        )
            .into_response(),
    }
}

/// GET /logs
pub async fn get_logs(State(state): State<CaptureState>) -> Response {
    match run_blocking(&state, |service| service.all()).await {
        Ok(Ok(entries)) => Json(EntryListResponse {
            total: entries.len(),
            entries,
        })
        .into_response(),
        Ok(Err(e)) => {
            tracing::error!("读取捕获记录失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::storage_error(format!("读取失败: {}", e))),
            )
                .into_response()
        }
        Err(response) => response,
    }
}

/// GET /recent
pub async fn get_recent(State(state): State<CaptureState>) -> Response {
    let entries = state.service.recent_snapshot();
    Json(RecentResponse {
        total: entries.len(),
        capacity: state.service.capacity(),
        entries,
    })
    .into_response()
}

/// GET /download
pub async fn download_logs(State(state): State<CaptureState>) -> Response {
    match run_blocking(&state, |service| service.download()).await {
        Ok(Ok(bytes)) => {
            let disposition = state
                .service
                .log_path()
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| {
                    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name)).ok()
                })
                .unwrap_or_else(|| HeaderValue::from_static("attachment"));
            (
                [
                    (
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/x-ndjson"),
                    ),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Ok(Err(e)) => {
            tracing::error!("读取日志文件失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::storage_error(format!("读取失败: {}", e))),
            )
                .into_response()
        }
        Err(response) => response,
    }
}

/// GET|POST /clear
pub async fn clear_logs(State(state): State<CaptureState>) -> Response {
    match run_blocking(&state, |service| service.clear()).await {
        Ok(Ok(())) => Json(SuccessResponse::new("日志已清空")).into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::storage_error(e.to_string())),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// GET /health
pub async fn health(State(state): State<CaptureState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stats: state.service.stats(),
    })
}
