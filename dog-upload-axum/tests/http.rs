use axum::body::Body;
use axum::http::{HeaderValue, Request};
use dog_upload_axum::{build, ServerConfig, UploadApp};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

async fn app() -> (UploadApp, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        upload_dir: dir.path().join("files"),
        temp_dir: Some(dir.path().join("tmp")),
        ..ServerConfig::default()
    };
    (build(&config).await.unwrap(), dir)
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn put(location: &str, range: &str, body: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(location)
        .header("content-length", body.len())
        .header("content-range", range)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn health_ok() {
    let (ax, _dir) = app().await;

    let res = ax
        .router
        .oneshot(Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(std::str::from_utf8(&bytes).unwrap(), "ok");
}

#[tokio::test]
async fn simple_upload_returns_file_attributes() {
    let (ax, dir) = app().await;

    let res = ax
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload?uploadType=simple&name=hello")
                .header("content-type", "text/plain")
                .body(Body::from("Hello, world!"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 200);
    assert!(res.headers().get("x-request-id").is_some());

    let body = json_body(res).await;
    assert_eq!(body["name"], "hello");
    assert_eq!(body["size"], 13);
    assert_eq!(body["mimeType"], "text/plain");
    assert_eq!(body["storage"], "default");

    let stored = dir.path().join("files").join(body["path"].as_str().unwrap());
    assert_eq!(std::fs::read(stored).unwrap(), b"Hello, world!");
}

#[tokio::test]
async fn resumable_upload_over_http() {
    let (ax, _dir) = app().await;

    let res = ax
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload?uploadType=resumable")
                .header("content-type", "application/json; charset=UTF-8")
                .header("x-upload-content-type", "text/plain")
                .header("x-upload-content-length", "10")
                .body(Body::from(r#"{"name":"notes"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);

    let location = res.headers().get("location").unwrap().to_str().unwrap().to_string();
    assert!(location.starts_with("/upload?uploadType=resumable&uploadId="));

    let res = ax
        .router
        .clone()
        .oneshot(put(&location, "bytes 0-4/10", b"hello"))
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 308);
    assert_eq!(res.headers().get("range").unwrap(), "0-4");

    let res = ax
        .router
        .clone()
        .oneshot(put(&location, "bytes */10", b""))
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 308);
    assert_eq!(res.headers().get("range").unwrap(), "0-4");

    let res = ax
        .router
        .clone()
        .oneshot(put(&location, "bytes 5-9/10", b"world"))
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body = json_body(res).await;
    assert_eq!(body["name"], "notes");
    assert_eq!(body["size"], 10);

    let res = ax
        .router
        .oneshot(put(&location, "bytes */10", b""))
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);
    assert_eq!(res.headers().get("range").unwrap(), "0-9");
}

#[tokio::test]
async fn upload_errors_use_feathers_shape() {
    let (ax, _dir) = app().await;

    let res = ax
        .router
        .oneshot(put(
            "/upload?uploadType=resumable&uploadId=upl_missing",
            "bytes 0-4/10",
            b"hello",
        ))
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 400);
    assert!(res.headers().get("x-request-id").is_some());
    let body = json_body(res).await;
    assert_eq!(body["name"], "BadRequest");
    assert_eq!(body["code"], 400);
    assert_eq!(body["className"], "bad-request");
    assert_eq!(body["message"], "Unable to find upload session upl_missing");
    assert_eq!(
        body["errors"]["_schema"][0],
        "Unable to find upload session upl_missing"
    );
}

#[tokio::test]
async fn unknown_upload_type_is_bad_request() {
    let (ax, _dir) = app().await;

    let res = ax
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload?uploadType=ftp")
                .body(Body::from("x"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 400);
    let body = json_body(res).await;
    assert_eq!(body["message"], "Unknown upload processor for upload type ftp");
}

#[tokio::test]
async fn request_id_is_preserved_when_provided() {
    let (ax, _dir) = app().await;

    let provided = HeaderValue::from_static("req-test-123");
    let res = ax
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload?uploadType=simple")
                .header("content-type", "text/plain")
                .header("x-request-id", provided.clone())
                .body(Body::from("hi"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.headers().get("x-request-id").unwrap(), &provided);
}
