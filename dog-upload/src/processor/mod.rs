//! Wire protocols of the three upload modes.

mod multipart;
mod resumable;
mod simple;

pub use multipart::MultipartUploadProcessor;
pub use resumable::ResumableUploadProcessor;
pub use simple::SimpleUploadProcessor;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde_json::Value;

use crate::{ByteStream, FormBinder, FormErrors, Result, UploadError, UploadRequest, UploadResult};

pub(crate) const JSON: &str = "application/json";

/// Handles one upload mode
#[async_trait]
pub trait UploadProcessor: Send + Sync {
    async fn handle_upload(
        &self,
        request: &mut UploadRequest,
        form: Option<&dyn FormBinder>,
    ) -> Result<UploadResult>;
}

/// Fail with `MissingHeader` on the first absent or empty header
pub(crate) fn check_headers(request: &UploadRequest, headers: &[&str]) -> Result<()> {
    for header in headers {
        match request.header(header) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(UploadError::missing_header(*header)),
        }
    }
    Ok(())
}

/// Required header holding a byte count
pub(crate) fn header_u64(request: &UploadRequest, header: &str) -> Result<u64> {
    let value = request
        .header(header)
        .ok_or_else(|| UploadError::missing_header(header))?;
    value
        .trim()
        .parse()
        .map_err(|_| UploadError::invalid_header(header, value))
}

pub(crate) fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.trim_start().starts_with(JSON))
}

/// Bind through the form when there is one; without a form the data is taken as is
pub(crate) fn bind_form(
    form: Option<&dyn FormBinder>,
    data: Value,
) -> std::result::Result<Value, FormErrors> {
    match form {
        Some(form) => form.bind(&data),
        None => Ok(data),
    }
}

/// Take the request body, failing with `EmptyContent` when it has no bytes
pub(crate) async fn non_empty_body(request: &mut UploadRequest) -> Result<ByteStream> {
    let mut body = request.take_body();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            let head = futures_util::stream::once(async move { Ok::<_, std::io::Error>(chunk) });
            return Ok(Box::pin(head.chain(body)));
        }
    }
    Err(UploadError::EmptyContent)
}

/// Collect a small body such as JSON metadata, bounded by `limit`
pub(crate) async fn read_bounded(mut body: ByteStream, limit: u64) -> Result<Bytes> {
    let mut data = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if (data.len() + chunk.len()) as u64 > limit {
            return Err(UploadError::invalid_json(format!(
                "metadata is larger than {limit} bytes"
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data.freeze())
}

/// Parse a JSON metadata document; an empty document is an empty object
pub(crate) fn parse_json(data: &[u8]) -> Result<Value> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(data).map_err(|e| UploadError::invalid_json(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[tokio::test]
    async fn empty_bodies_are_rejected() {
        let mut request = UploadRequest::new(Method::POST, "/").with_bytes(Bytes::new());
        assert!(matches!(
            non_empty_body(&mut request).await,
            Err(UploadError::EmptyContent)
        ));

        let mut request = UploadRequest::new(Method::POST, "/");
        assert!(non_empty_body(&mut request).await.is_err());
    }

    #[tokio::test]
    async fn non_empty_body_keeps_every_byte() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ];
        let mut request = UploadRequest::new(Method::POST, "/")
            .with_body(Box::pin(futures_util::stream::iter(chunks)));

        let body = non_empty_body(&mut request).await.unwrap();
        assert_eq!(read_bounded(body, 10).await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[test]
    fn headers() {
        let request = UploadRequest::new(Method::POST, "/")
            .with_header("content-length", "12")
            .with_header("x-upload-content-length", "lots");

        assert!(check_headers(&request, &["Content-Length"]).is_ok());
        assert!(matches!(
            check_headers(&request, &["Content-Length", "Content-Type"]),
            Err(UploadError::MissingHeader { header }) if header == "Content-Type"
        ));
        assert_eq!(header_u64(&request, "Content-Length").unwrap(), 12);
        assert!(matches!(
            header_u64(&request, "X-Upload-Content-Length"),
            Err(UploadError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn json_documents() {
        assert!(is_json(Some("application/json; charset=UTF-8")));
        assert!(!is_json(Some("text/json")));
        assert!(!is_json(None));
        assert_eq!(parse_json(b"  ").unwrap(), serde_json::json!({}));
        assert!(matches!(parse_json(b"{"), Err(UploadError::InvalidJson { .. })));
    }
}
