//! HTTP 接口集成测试：捕获、查询、下载、清空

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

use hookcatch::capture::{CaptureService, create_capture_router};

struct TestApp {
    _dir: tempfile::TempDir,
    service: Arc<CaptureService>,
    router: Router,
}

impl TestApp {
    fn new(capacity: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(CaptureService::new(dir.path().join("log.json"), capacity));
        let router = create_capture_router(service.clone());
        Self {
            _dir: dir,
            service,
            router,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}

fn form_post(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_capture_latest_logs_clear_flow() {
    let app = TestApp::new(100);

    let (status, _) = app.get_json("/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, captured) = app.get_json("/?a=1&a=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(captured["method"], "GET");
    assert_eq!(captured["data"]["a"], serde_json::json!(["1", "2"]));

    let (status, latest) = app.get_json("/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], captured["id"]);
    assert_eq!(latest["data"]["a"], serde_json::json!(["1", "2"]));

    let (status, _) = app.send(form_post("/", "x=y")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, logs) = app.get_json("/logs").await;
    assert_eq!(logs["total"], 2);
    assert_eq!(logs["entries"][1]["method"], "POST");
    assert_eq!(logs["entries"][1]["data"]["x"], serde_json::json!(["y"]));

    let (status, cleared) = app.get_json("/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["success"], true);

    let (_, logs) = app.get_json("/logs").await;
    assert_eq!(logs["total"], 0);
    let (status, _) = app.get_json("/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_capture_any_path_and_json_body() {
    let app = TestApp::new(100);

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/hooks/stripe?token=abc")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Event-Type", "invoice.paid")
        .body(Body::from(r#"{"id":"evt_1"}"#))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let entry: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(entry["method"], "PUT");
    assert_eq!(entry["path"], "/hooks/stripe");
    assert_eq!(entry["data"]["token"], serde_json::json!(["abc"]));
    assert_eq!(entry["body"], r#"{"id":"evt_1"}"#);
    assert_eq!(entry["headers"]["x-event-type"], "invoice.paid");

    let stored = app.service.latest().unwrap();
    assert_eq!(stored.header("X-Event-Type"), Some("invoice.paid"));
}

#[tokio::test]
async fn test_form_body_with_charset_and_repeated_keys() {
    let app = TestApp::new(100);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/?ignored=1")
        .header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded; charset=utf-8",
        )
        .body(Body::from("tag=a&tag=b&msg=hello+world"))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let entry = app.service.latest().unwrap();
    assert_eq!(entry.param("tag").unwrap(), ["a", "b"]);
    assert_eq!(entry.param("msg").unwrap(), ["hello world"]);
    assert!(entry.param("ignored").is_none());
    assert!(entry.body.is_none());
}

#[tokio::test]
async fn test_get_with_form_body_keeps_query_params() {
    let app = TestApp::new(100);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/?a=1&a=2")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("z=9"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let captured: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(captured["data"]["a"], serde_json::json!(["1", "2"]));
    assert!(captured["data"].get("z").is_none());
    assert_eq!(captured["body"], "z=9");

    let entry = app.service.latest().unwrap();
    assert_eq!(entry.param("a").unwrap(), ["1", "2"]);
    assert_eq!(entry.body.as_deref(), Some("z=9"));
}

#[tokio::test]
async fn test_recent_is_bounded_and_logs_are_complete() {
    let app = TestApp::new(3);

    for i in 0..5 {
        let (status, _) = app.send(form_post("/", &format!("n={}", i))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, recent) = app.get_json("/recent").await;
    assert_eq!(recent["total"], 3);
    assert_eq!(recent["capacity"], 3);
    let values: Vec<&str> = recent["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["data"]["n"][0].as_str().unwrap())
        .collect();
    assert_eq!(values, ["2", "3", "4"]);

    let (_, logs) = app.get_json("/logs").await;
    assert_eq!(logs["total"], 5);
}

#[tokio::test]
async fn test_download_returns_ndjson() {
    let app = TestApp::new(10);

    app.send(form_post("/", "a=1")).await;
    app.send(form_post("/", "a=2")).await;

    let request = Request::builder()
        .uri("/download")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-ndjson"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"log.json\""
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 2);
    for line in text.lines() {
        let record: Value = serde_json::from_str(line).unwrap();
        assert_eq!(record["method"], "POST");
    }
}

#[tokio::test]
async fn test_persist_failure_returns_error_with_entry_id() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(CaptureService::new(
        dir.path().join("missing").join("log.json"),
        10,
    ));
    let router = create_capture_router(service.clone());

    let request = Request::builder().uri("/?k=v").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"]["type"], "storage_error");

    // 记录仍在内存中
    let latest = service.latest().unwrap();
    assert_eq!(error["error"]["entryId"], latest.id.as_str());
}

#[tokio::test]
async fn test_post_clear_and_health() {
    let app = TestApp::new(10);
    app.send(form_post("/", "a=1")).await;

    let (_, health) = app.get_json("/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["buffered"], 1);
    assert_eq!(health["capacity"], 10);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/clear")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, health) = app.get_json("/health").await;
    assert_eq!(health["buffered"], 0);
    assert_eq!(health["logSizeBytes"], 0);
}

#[tokio::test]
async fn test_concurrent_http_captures() {
    let app = Arc::new(TestApp::new(8));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move {
                let (status, _) = app.send(form_post("/", &format!("marker=m{}", i))).await;
                assert_eq!(status, StatusCode::OK);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let (_, logs) = app.get_json("/logs").await;
    assert_eq!(logs["total"], 32);
    let mut markers: Vec<String> = logs["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["data"]["marker"][0].as_str().unwrap().to_string())
        .collect();
    markers.sort();
    markers.dedup();
    assert_eq!(markers.len(), 32);
}
