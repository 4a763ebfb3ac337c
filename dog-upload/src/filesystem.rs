use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::{ByteStream, Result};

/// Options passed along with a write
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Content type declared by the client, stored as object metadata
    pub content_type: Option<String>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A file living in a filesystem backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub path: String,
    pub size: u64,
    pub content_type: Option<String>,
}

impl FileHandle {
    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Byte storage capability backing a `FileStorage`
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Create an object, failing with `ObjectAlreadyExists` when it is present
    async fn write(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle>;

    /// Create or replace an object
    async fn put(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle>;

    /// Create an object from a stream, failing with `ObjectAlreadyExists` when it is present
    async fn write_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle>;

    /// Create or replace an object from a stream
    async fn put_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle>;

    /// Read the whole object
    async fn read(&self, path: &str) -> Result<Bytes> {
        let mut stream = self.read_stream(path).await?;
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(data))
    }

    /// Read the object as a stream
    async fn read_stream(&self, path: &str) -> Result<ByteStream>;

    async fn has(&self, path: &str) -> Result<bool>;

    /// Object metadata, `ObjectNotFound` when absent
    async fn get(&self, path: &str) -> Result<FileHandle>;

    async fn size(&self, path: &str) -> Result<u64> {
        Ok(self.get(path).await?.size)
    }

    /// Delete an object; deleting a missing object is not an error
    async fn delete(&self, path: &str) -> Result<()>;

    /// Sniff the mime type of the stored bytes
    async fn mime_type(&self, path: &str) -> Result<String>;
}
