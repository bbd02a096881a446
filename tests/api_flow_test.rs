mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{JWT_SECRET, TestEnv, payload};
use drive_upload::utils::auth::create_jwt;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "----drive-upload-test-boundary";

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn chunk_request(token: &str, upload_id: &str, index: u32, total: u32, size: usize, data: &[u8]) -> Request<Body> {
    let index = index.to_string();
    let total = total.to_string();
    let size = size.to_string();
    let body = multipart_body(
        &[
            ("chunkIndex", index.as_str()),
            ("totalChunks", total.as_str()),
            ("uploadId", upload_id),
            ("fileName", "holiday.mp4"),
            ("fileSize", size.as_str()),
            ("mimeType", "video/mp4"),
        ],
        Some(("chunk", "blob", data)),
    );
    multipart_request("/api/files/upload-chunk", token, body)
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let env = TestEnv::new().await;
    let app = env.app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/storage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chunked_upload_over_http() {
    let env = TestEnv::new().await;
    env.add_owner("alice", 0, 1024 * 1024).await;
    let token = create_jwt("alice", JWT_SECRET).unwrap();

    let chunks = [payload(3000, 1), payload(3000, 2), payload(1200, 3)];
    let size: usize = chunks.iter().map(|c| c.len()).sum();

    for index in [2u32, 0, 1] {
        let response = env
            .app()
            .oneshot(chunk_request(&token, "abc123", index, 3, size, &chunks[index as usize]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body, json!({ "success": true, "chunkIndex": index }));
    }

    let response = env
        .app()
        .oneshot(json_request(
            "POST",
            "/api/files/upload-complete",
            &token,
            json!({
                "uploadId": "abc123",
                "fileName": "holiday.mp4",
                "fileSize": size,
                "mimeType": "video/mp4",
                "folder": null
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["file"]["name"], "holiday.mp4");
    assert_eq!(body["file"]["size"], size as i64);
    assert_eq!(body["file"]["mimeType"], "video/mp4");

    let key = body["file"]["s3Key"].as_str().unwrap();
    assert_eq!(env.storage.object(key).unwrap(), chunks.concat());

    let response = env.app().oneshot(get_request("/api/storage", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let usage = json_body(response).await;
    assert_eq!(usage["used"], size as i64);
    assert_eq!(usage["reserved"], 0);
    assert_eq!(env.scratch_files(), 0);
}

#[tokio::test]
async fn test_completion_errors_use_json_envelope() {
    let env = TestEnv::new().await;
    env.add_owner("alice", 0, 1024 * 1024).await;
    let token = create_jwt("alice", JWT_SECRET).unwrap();

    let response = env
        .app()
        .oneshot(json_request(
            "POST",
            "/api/files/upload-complete",
            &token,
            json!({ "uploadId": "never-started", "fileName": "a.bin", "fileSize": 10 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_quota_exceeded_over_http() {
    let env = TestEnv::new().await;
    env.add_owner("alice", 0, 100).await;
    let token = create_jwt("alice", JWT_SECRET).unwrap();

    let data = payload(500, 1);
    let response = env
        .app()
        .oneshot(chunk_request(&token, "big", 0, 1, data.len(), &data))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = env
        .app()
        .oneshot(json_request(
            "POST",
            "/api/files/upload-complete",
            &token,
            json!({ "uploadId": "big", "fileName": "big.bin", "fileSize": 500 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INSUFFICIENT_STORAGE);
    assert_eq!(env.scratch_files(), 0);
}

#[tokio::test]
async fn test_missing_configuration_is_service_unavailable() {
    let env = TestEnv::unconfigured().await;
    env.add_owner("alice", 0, 1024).await;
    let token = create_jwt("alice", JWT_SECRET).unwrap();

    let data = payload(10, 1);
    let response = env
        .app()
        .oneshot(chunk_request(&token, "x", 0, 1, data.len(), &data))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(env.scratch_files(), 0);
}

#[tokio::test]
async fn test_simple_upload_and_download() {
    let env = TestEnv::new().await;
    env.add_owner("alice", 0, 1024 * 1024).await;
    let token = create_jwt("alice", JWT_SECRET).unwrap();

    let data = payload(2048, 4);
    let body = multipart_body(&[("folder", "docs")], Some(("file", "notes.txt", &data)));
    let response = env
        .app()
        .oneshot(multipart_request("/api/files/upload", &token, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["file"]["name"], "notes.txt");
    assert_eq!(body["file"]["folder"], "docs");
    assert_eq!(body["file"]["size"], 2048);
    let id = body["file"]["id"].as_str().unwrap().to_string();

    let response = env
        .app()
        .oneshot(get_request(&format!("/api/files/{}/download", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"notes.txt\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.to_vec(), data);

    let response = env
        .app()
        .oneshot(get_request(&format!("/api/files/{}/url", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["expires_in"], 3600);
    assert!(body["url"].as_str().unwrap().contains("X-Amz-Expires=3600"));
}

#[tokio::test]
async fn test_list_and_rename_over_http() {
    let env = TestEnv::new().await;
    env.add_owner("alice", 0, 1024 * 1024).await;
    let token = create_jwt("alice", JWT_SECRET).unwrap();

    let body = multipart_body(&[("folder", "docs")], Some(("file", "draft.txt", &b"hello"[..])));
    let response = env
        .app()
        .oneshot(multipart_request("/api/files/upload", &token, body))
        .await
        .unwrap();
    let id = json_body(response).await["file"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = env
        .app()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/files/{}", id),
            &token,
            json!({ "name": "final.txt" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["file"]["name"], "final.txt");

    let response = env
        .app()
        .oneshot(get_request("/api/files?folder=docs", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["currentFolder"], "docs");
    assert_eq!(body["files"][0]["id"], id.as_str());
    assert_eq!(body["files"][0]["name"], "final.txt");

    let response = env
        .app()
        .oneshot(get_request("/api/files", &token))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["files"], json!([]));

    let response = env
        .app()
        .oneshot(json_request(
            "PATCH",
            &format!("/api/files/{}", id),
            &token,
            json!({ "name": " " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_query_parameter_is_accepted() {
    let env = TestEnv::new().await;
    env.add_owner("alice", 0, 1024).await;
    let token = create_jwt("alice", JWT_SECRET).unwrap();

    let response = env
        .app()
        .oneshot(
            Request::builder()
                .uri(format!("/api/storage?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_health_reports_storage_state() {
    let env = TestEnv::unconfigured().await;

    let response = env
        .app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["database"], "connected");
    assert_eq!(body["storage"], "unconfigured");
    assert_eq!(body["pending_uploads"], 0);
}
