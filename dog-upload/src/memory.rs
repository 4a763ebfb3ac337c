use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::filesystem::{FileHandle, Filesystem, WriteOptions};
use crate::{mime, ByteStream, Result, UploadError};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

/// In-process filesystem for tests, development and short-lived temp storage
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Paths of every stored object, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    async fn collect(mut stream: ByteStream) -> Result<Bytes> {
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(data))
    }

    fn insert(&self, path: &str, data: Bytes, options: &WriteOptions, overwrite: bool) -> Result<FileHandle> {
        let mut objects = self.objects.write();
        if !overwrite && objects.contains_key(path) {
            return Err(UploadError::ObjectAlreadyExists {
                path: path.to_string(),
            });
        }

        let handle = FileHandle {
            path: path.to_string(),
            size: data.len() as u64,
            content_type: options.content_type.clone(),
        };
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                content_type: options.content_type.clone(),
            },
        );
        Ok(handle)
    }

    fn object(&self, path: &str) -> Result<StoredObject> {
        self.objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| UploadError::object_not_found(path))
    }
}

#[async_trait]
impl Filesystem for MemoryFilesystem {
    async fn write(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle> {
        self.insert(path, content, options, false)
    }

    async fn put(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle> {
        self.insert(path, content, options, true)
    }

    async fn write_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle> {
        if self.objects.read().contains_key(path) {
            return Err(UploadError::ObjectAlreadyExists {
                path: path.to_string(),
            });
        }
        let data = Self::collect(stream).await?;
        self.insert(path, data, options, false)
    }

    async fn put_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle> {
        let data = Self::collect(stream).await?;
        self.insert(path, data, options, true)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        Ok(self.object(path)?.data)
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        Ok(crate::bytes_stream(self.object(path)?.data))
    }

    async fn has(&self, path: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(path))
    }

    async fn get(&self, path: &str) -> Result<FileHandle> {
        let object = self.object(path)?;
        Ok(FileHandle {
            path: path.to_string(),
            size: object.data.len() as u64,
            content_type: object.content_type,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects.write().remove(path);
        Ok(())
    }

    async fn mime_type(&self, path: &str) -> Result<String> {
        Ok(mime::sniff(&self.object(path)?.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_refuses_to_overwrite() {
        let fs = MemoryFilesystem::new();
        let options = WriteOptions::new();

        fs.write("a.txt", Bytes::from_static(b"one"), &options).await.unwrap();
        let err = fs
            .write("a.txt", Bytes::from_static(b"two"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::ObjectAlreadyExists { .. }));

        fs.put("a.txt", Bytes::from_static(b"three"), &options).await.unwrap();
        assert_eq!(fs.read("a.txt").await.unwrap(), Bytes::from_static(b"three"));
    }

    #[tokio::test]
    async fn missing_objects() {
        let fs = MemoryFilesystem::new();
        assert!(!fs.has("nope").await.unwrap());
        assert!(matches!(
            fs.size("nope").await.unwrap_err(),
            UploadError::ObjectNotFound { .. }
        ));
        fs.delete("nope").await.unwrap();
    }
}
