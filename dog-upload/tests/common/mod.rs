#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use dog_upload::prelude::*;
use dog_upload::{SessionReaper, UploadSessionStore};
use http::Method;
use serde_json::{json, Value};

pub const GIF_HEADER: &[u8] = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";

/// A GIF of exactly `len` bytes
pub fn gif(len: usize) -> Vec<u8> {
    let mut data = GIF_HEADER.to_vec();
    data.extend((0..len.saturating_sub(GIF_HEADER.len())).map(|i| (i % 251) as u8));
    data.truncate(len);
    data
}

pub struct Harness {
    pub uploads: UploadHandler,
    pub storage: Arc<StorageHandler>,
    pub sessions: MemoryUploadSessionStore,
    pub config: Arc<UploadConfig>,
    pub final_fs: MemoryFilesystem,
    pub temp_fs: MemoryFilesystem,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(UploadConfig::default(), &[], false)
    }

    pub fn build(config: UploadConfig, accepted: &[&str], with_temp: bool) -> Self {
        let final_fs = MemoryFilesystem::new();
        let temp_fs = MemoryFilesystem::new();

        let mut voter = StorageVoter::new()
            .with_storage(
                FileStorage::new("default", final_fs.clone())
                    .with_accepted_mime_types(accepted.iter().copied()),
            )
            .unwrap();
        if with_temp {
            voter = voter.with_temp_storage(FileStorage::new("temp", temp_fs.clone()));
        }

        let config = Arc::new(config);
        let storage = Arc::new(StorageHandler::new(voter));
        let sessions = MemoryUploadSessionStore::new();
        let uploads = UploadHandler::with_default_processors(
            config.clone(),
            storage.clone(),
            Arc::new(sessions.clone()),
        );

        Self {
            uploads,
            storage,
            sessions,
            config,
            final_fs,
            temp_fs,
        }
    }

    pub fn reaper(&self) -> SessionReaper {
        SessionReaper::new(
            self.storage.clone(),
            Arc::new(self.sessions.clone()),
            self.config.session_ttl,
        )
    }

    /// Start a resumable session and return its location
    pub async fn start(&self, length: usize, content_type: &str, metadata: Value) -> String {
        let request = UploadRequest::new(Method::POST, "/upload")
            .with_query("uploadType", "resumable")
            .with_header("Content-Type", "application/json; charset=UTF-8")
            .with_header("X-Upload-Content-Type", content_type)
            .with_header("X-Upload-Content-Length", length.to_string())
            .with_bytes(metadata.to_string());

        let response = self.handle(request).await.into_response();
        assert_eq!(response.status, 200, "{:?}", response.body);
        response.header("Location").unwrap().to_string()
    }

    pub async fn handle(&self, mut request: UploadRequest) -> UploadResult {
        self.uploads.handle_request(&mut request, None).await
    }

    /// PUT a chunk to a session location
    pub async fn put(&self, location: &str, range: Option<&str>, body: &[u8]) -> UploadResult {
        self.handle(put_request(location, range, body)).await
    }

    /// Ask for the upload status
    pub async fn status(&self, location: &str, total: usize) -> UploadResponse {
        self.put(location, Some(&format!("bytes */{total}")), b"")
            .await
            .into_response()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn session(&self, location: &str) -> Option<dog_upload::UploadSession> {
        let id = session_id(location);
        self.sessions.find(&id).await.unwrap()
    }
}

pub fn put_request(location: &str, range: Option<&str>, body: &[u8]) -> UploadRequest {
    let (path, query) = location.split_once('?').unwrap();
    let mut request = UploadRequest::new(Method::PUT, path)
        .with_query_string(query)
        .with_header("Content-Length", body.len().to_string())
        .with_bytes(Bytes::copy_from_slice(body));
    if let Some(range) = range {
        request = request.with_header("Content-Range", range);
    }
    request
}

pub fn session_id(location: &str) -> String {
    let (_, query) = location.split_once('?').unwrap();
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap();
    pairs
        .into_iter()
        .find(|(k, _)| k == "uploadId")
        .map(|(_, v)| v)
        .unwrap()
}

pub fn metadata() -> Value {
    json!({"name": "test"})
}
