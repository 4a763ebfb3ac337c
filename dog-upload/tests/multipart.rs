mod common;

use common::{Harness, GIF_HEADER};
use dog_upload::prelude::*;
use http::Method;

const BOUNDARY: &str = "foo_bar_baz";

fn related(parts: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (content_type, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--").as_bytes());
    body
}

fn request(body: Vec<u8>) -> UploadRequest {
    UploadRequest::new(Method::POST, "/upload")
        .with_query("uploadType", "multipart")
        .with_header(
            "Content-Type",
            format!("multipart/related; boundary={BOUNDARY}"),
        )
        .with_header("Content-Length", body.len().to_string())
        .with_bytes(body)
}

#[tokio::test]
async fn stores_file_part_with_metadata() {
    let h = Harness::new();
    let body = related(&[
        ("application/json; charset=UTF-8", br#"{"name":"test"}"#),
        ("image/gif", GIF_HEADER),
    ]);

    let response = h.handle(request(body)).await.into_response();
    assert_eq!(response.status, 200, "{:?}", response.body);

    let body = response.body.unwrap();
    assert_eq!(body["name"], "test");
    assert_eq!(body["size"], GIF_HEADER.len() as u64);
    assert_eq!(body["mimeType"], "image/gif");

    let path = body["path"].as_str().unwrap();
    assert_eq!(h.final_fs.read(path).await.unwrap().as_ref(), GIF_HEADER);
}

#[tokio::test]
async fn metadata_must_come_first() {
    let h = Harness::new();
    let body = related(&[
        ("image/gif", GIF_HEADER),
        ("application/json", br#"{"name":"test"}"#),
    ]);

    let result = h.handle(request(body)).await;
    assert!(matches!(
        result.error,
        Some(UploadError::UnexpectedContentType { ref expected, .. }) if expected == "application/json"
    ));
    assert!(h.final_fs.is_empty());
}

#[tokio::test]
async fn metadata_without_file_is_empty() {
    let h = Harness::new();
    let body = related(&[("application/json", br#"{"name":"test"}"#)]);

    let result = h.handle(request(body)).await;
    assert!(matches!(result.error, Some(UploadError::EmptyContent)));
    assert!(h.final_fs.is_empty());
}

#[tokio::test]
async fn invalid_metadata_is_rejected() {
    let h = Harness::new();
    let body = related(&[("application/json", b"{name"), ("image/gif", GIF_HEADER)]);

    let result = h.handle(request(body)).await;
    assert!(matches!(result.error, Some(UploadError::InvalidJson { .. })));
}

#[tokio::test]
async fn boundary_is_required() {
    let h = Harness::new();
    let request = UploadRequest::new(Method::POST, "/upload")
        .with_query("uploadType", "multipart")
        .with_header("Content-Type", "multipart/related")
        .with_header("Content-Length", "0")
        .with_bytes("");

    let response = h.handle(request).await.into_response();
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn headers_are_required() {
    let h = Harness::new();
    let body = related(&[("application/json", b"{}"), ("text/plain", b"hi")]);
    let request = UploadRequest::new(Method::POST, "/upload")
        .with_query("uploadType", "multipart")
        .with_header(
            "Content-Type",
            format!("multipart/related; boundary={BOUNDARY}"),
        )
        .with_bytes(body);

    let result = h.handle(request).await;
    assert!(matches!(
        result.error,
        Some(UploadError::MissingHeader { ref header }) if header == "Content-Length"
    ));
}

#[tokio::test]
async fn oversized_parts_are_rejected() {
    let h = Harness::build(UploadConfig::new().with_max_part_bytes(32), &[], false);
    let big = vec![b'x'; 256];
    let body = related(&[("application/json", b"{}"), ("text/plain", &big)]);

    let result = h.handle(request(body)).await;
    assert!(matches!(result.error, Some(UploadError::PartTooLarge { limit: 32 })));
    assert!(h.final_fs.is_empty());
}

fn raw(file_part: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Type: application/json\r\n\r\n{{\"name\":\"test\"}}\r\n"
    )
    .into_bytes();
    body.extend_from_slice(file_part);
    body
}

#[tokio::test]
async fn blank_lines_in_a_headerless_part_stay_in_the_body() {
    let h = Harness::new();
    let body = raw(format!("--{BOUNDARY}\r\n\r\nAAAA\r\n\r\nBBBB\r\n--{BOUNDARY}--").as_bytes());

    let response = h.handle(request(body)).await.into_response();
    assert_eq!(response.status, 200, "{:?}", response.body);

    let body = response.body.unwrap();
    let path = body["path"].as_str().unwrap();
    assert_eq!(h.final_fs.read(path).await.unwrap().as_ref(), b"AAAA\r\n\r\nBBBB");
}

#[tokio::test]
async fn lf_headers_keep_crlf_body_intact() {
    let h = Harness::new();
    let body = raw(format!("--{BOUNDARY}\nContent-Type: text/plain\n\nX\r\n\r\nY\n--{BOUNDARY}--").as_bytes());

    let response = h.handle(request(body)).await.into_response();
    assert_eq!(response.status, 200, "{:?}", response.body);

    let body = response.body.unwrap();
    assert_eq!(body["size"], 6);
    let path = body["path"].as_str().unwrap();
    assert_eq!(h.final_fs.read(path).await.unwrap().as_ref(), b"X\r\n\r\nY");
}
