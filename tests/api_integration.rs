use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rivault::actor::ActorRegistry;
use rivault::api::{router, ApiState};
use rivault::blob::{BlobStore, SledBlobStore};
use rivault::config::Config;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    app: axum::Router,
}

fn build_fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("meta");
    config.storage.blob_dir = dir.path().join("blobs");
    config.storage.default_drive_quota = 10 * 1024 * 1024 * 1024;

    let blob: Arc<dyn BlobStore> = Arc::new(SledBlobStore::open(&config.storage.blob_dir, config.storage.max_chunk_bytes).unwrap());
    let registry = Arc::new(ActorRegistry::new(config.storage.data_dir.clone(), config.storage.default_drive_quota));
    let state = Arc::new(ApiState { registry, blob, config: Arc::new(config) });
    Fixture { _dir: dir, app: router(state) }
}

async fn json_request(app: &axum::Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(path).header("X-User-Id", "alice").header("Content-Type", "application/json");
    let request = match body {
        Some(v) => builder.body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

#[tokio::test]
async fn fresh_init_lists_default_drive_and_stats() {
    let fixture = build_fixture();

    let (status, body) = json_request(&fixture.app, "GET", "/folders/root", None).await;
    assert_eq!(status, StatusCode::OK);
    let drives = body.as_array().unwrap();
    assert_eq!(drives.len(), 1);
    assert_eq!(drives[0]["name"], "Local Disk (C:)");
    assert_eq!(drives[0]["quota"], 10u64 * 1024 * 1024 * 1024);

    let (status, stats) = json_request(&fixture.app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_used"], 0);
    assert_eq!(stats["file_count"], 0);
    assert_eq!(stats["folder_count"], 2);
}

#[tokio::test]
async fn upload_and_download_round_trip() {
    let fixture = build_fixture();
    let (_, drives) = json_request(&fixture.app, "GET", "/folders/root", None).await;
    let drive_id = drives[0]["id"].as_str().unwrap().to_string();

    let (status, file) = json_request(
        &fixture.app,
        "POST",
        "/files",
        Some(json!({
            "parent_id": drive_id,
            "name": "a.txt",
            "size": 11,
            "mime_type": "text/plain",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let file_id = file["id"].as_str().unwrap().to_string();

    let chunk_body = b"hello world".to_vec();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/files/{}/chunks?order=0", file_id))
        .header("X-User-Id", "alice")
        .body(Body::from(chunk_body.clone()))
        .unwrap();
    let response = fixture.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .method("GET")
        .uri(format!("/files/{}/download", file_id))
        .header("X-User-Id", "alice")
        .body(Body::empty())
        .unwrap();
    let response = fixture.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), chunk_body.as_slice());
}

#[tokio::test]
async fn cycle_rejection_on_move() {
    let fixture = build_fixture();
    let (_, drives) = json_request(&fixture.app, "GET", "/folders/root", None).await;
    let drive_id = drives[0]["id"].as_str().unwrap().to_string();

    let (_, a) = json_request(&fixture.app, "POST", "/folders", Some(json!({"parent_id": drive_id, "name": "A"}))).await;
    let a_id = a["id"].as_str().unwrap().to_string();
    let (_, b) = json_request(&fixture.app, "POST", "/folders", Some(json!({"parent_id": a_id, "name": "B"}))).await;
    let b_id = b["id"].as_str().unwrap().to_string();

    let (status, _) = json_request(&fixture.app, "POST", &format!("/nodes/{}/move", a_id), Some(json!({"new_parent_id": b_id}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn quota_enforcement_rejects_overage() {
    let fixture = build_fixture();
    let (_, drives) = json_request(&fixture.app, "GET", "/folders/root", None).await;
    let drive_id = drives[0]["id"].as_str().unwrap().to_string();

    let (_, drive_tight) = json_request(&fixture.app, "POST", "/drives", Some(json!({"letter": "Z", "size": 1024}))).await;
    let tight_id = drive_tight["id"].as_str().unwrap().to_string();
    let _ = drive_id;

    let (status, _) = json_request(
        &fixture.app,
        "POST",
        "/files",
        Some(json!({"parent_id": tight_id, "name": "a.bin", "size": 1024, "mime_type": "application/octet-stream"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = json_request(
        &fixture.app,
        "POST",
        "/files",
        Some(json!({"parent_id": tight_id, "name": "b.bin", "size": 1, "mime_type": "application/octet-stream"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stats) = json_request(&fixture.app, "GET", "/stats", None).await;
    assert_eq!(stats["total_used"], 1024);
}

#[tokio::test]
async fn recursive_delete_refuses_locked_descendant() {
    let fixture = build_fixture();
    let (_, drives) = json_request(&fixture.app, "GET", "/folders/root", None).await;
    let drive_id = drives[0]["id"].as_str().unwrap().to_string();

    let (_, folder) = json_request(&fixture.app, "POST", "/folders", Some(json!({"parent_id": drive_id, "name": "F"}))).await;
    let folder_id = folder["id"].as_str().unwrap().to_string();
    let (_, file) = json_request(
        &fixture.app,
        "POST",
        "/files",
        Some(json!({"parent_id": folder_id, "name": "L", "size": 10, "mime_type": "text/plain"})),
    )
    .await;
    let file_id = file["id"].as_str().unwrap().to_string();

    let (status, _) = json_request(&fixture.app, "POST", &format!("/nodes/{}/lock", file_id), Some(json!({"password": "secret"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = json_request(&fixture.app, "DELETE", &format!("/nodes/{}", folder_id), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn overwrite_resets_chunks_and_adjusts_stats() {
    let fixture = build_fixture();
    let (_, drives) = json_request(&fixture.app, "GET", "/folders/root", None).await;
    let drive_id = drives[0]["id"].as_str().unwrap().to_string();

    let (_, file) = json_request(
        &fixture.app,
        "POST",
        "/files",
        Some(json!({"parent_id": drive_id, "name": "x.bin", "size": 15 * 1024 * 1024, "mime_type": "application/octet-stream"})),
    )
    .await;
    let file_id = file["id"].as_str().unwrap().to_string();

    let (status, overwritten) = json_request(
        &fixture.app,
        "POST",
        "/files",
        Some(json!({"parent_id": drive_id, "name": "x.bin", "size": 3, "mime_type": "text/plain", "overwrite": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overwritten["id"], file_id);

    let (_, stats) = json_request(&fixture.app, "GET", "/stats", None).await;
    assert_eq!(stats["total_used"], 3);
}
