use bytes::Bytes;
use futures_core::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

/// Stream of bytes for upload content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk stream
pub fn bytes_stream<B: Into<Bytes>>(data: B) -> ByteStream {
    let data = data.into();
    Box::pin(futures_util::stream::once(async move { Ok(data) }))
}

/// A stream that yields nothing
pub fn empty_stream() -> ByteStream {
    Box::pin(futures_util::stream::empty())
}

/// Opaque identifier of a resumable upload session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything about an inbound request except its body
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// First value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Header value as a string, `None` when absent or not visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path followed by the query with `extra` set (replacing any previous value)
    pub fn location_with(&self, name: &str, value: &str) -> String {
        let mut pairs: Vec<(&str, &str)> = self
            .query
            .iter()
            .filter(|(key, _)| key != name)
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        pairs.push((name, value));

        let query = serde_urlencoded::to_string(&pairs).unwrap_or_default();
        format!("{}?{}", self.path, query)
    }
}

/// Framework-neutral upload request: head plus a body that can be taken once
pub struct UploadRequest {
    head: RequestHead,
    body: Option<ByteStream>,
}

impl UploadRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            head: RequestHead {
                method,
                path: path.into(),
                query: Vec::new(),
                headers: HeaderMap::new(),
            },
            body: None,
        }
    }

    pub fn from_parts(head: RequestHead, body: ByteStream) -> Self {
        Self {
            head,
            body: Some(body),
        }
    }

    /// Append the pairs of an url-encoded query string; malformed strings are ignored
    pub fn with_query_string(mut self, query: &str) -> Self {
        if let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            self.head.query.extend(pairs);
        }
        self
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.head.query.push((key.into(), value.into()));
        self
    }

    /// Set a header; invalid names or values are dropped
    pub fn with_header<V: AsRef<str>>(mut self, name: &str, value: V) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.head.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: ByteStream) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_bytes<B: Into<Bytes>>(self, data: B) -> Self {
        self.with_body(bytes_stream(data))
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.head.query_param(name)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    /// Take the body; subsequent calls yield an empty stream
    pub fn take_body(&mut self) -> ByteStream {
        self.body.take().unwrap_or_else(empty_stream)
    }
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("head", &self.head)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_prefixed() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("upl_"));
    }

    #[test]
    fn location_keeps_original_query() {
        let request = UploadRequest::new(Method::POST, "/upload")
            .with_query_string("uploadType=resumable&name=my%20file");

        let location = request.head().location_with("uploadId", "upl_1");
        assert_eq!(
            location,
            "/upload?uploadType=resumable&name=my+file&uploadId=upl_1"
        );
    }

    #[test]
    fn location_replaces_existing_session_parameter() {
        let request = UploadRequest::new(Method::POST, "/upload")
            .with_query_string("uploadId=old&uploadType=resumable");

        let location = request.head().location_with("uploadId", "new");
        assert_eq!(location, "/upload?uploadType=resumable&uploadId=new");
    }
}
