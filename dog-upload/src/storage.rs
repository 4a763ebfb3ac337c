use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::filesystem::{FileHandle, Filesystem, WriteOptions};
use crate::strategy::{FlatStorageStrategy, NamingStrategy, StorageStrategy, UniqueNamingStrategy};
use crate::{ByteStream, Result, UploadContext};

/// A named filesystem plus the strategies that place new files in it
pub struct FileStorage {
    name: String,
    filesystem: Arc<dyn Filesystem>,
    storage_strategy: Arc<dyn StorageStrategy>,
    naming_strategy: Arc<dyn NamingStrategy>,
    accepted_mime_types: Vec<String>,
    check_mime_type: bool,
}

impl FileStorage {
    /// Storage with flat placement and unique names
    pub fn new<S, F>(name: S, filesystem: F) -> Self
    where
        S: Into<String>,
        F: Filesystem + 'static,
    {
        Self::from_arc(name, Arc::new(filesystem))
    }

    pub fn from_arc<S: Into<String>>(name: S, filesystem: Arc<dyn Filesystem>) -> Self {
        Self {
            name: name.into(),
            filesystem,
            storage_strategy: Arc::new(FlatStorageStrategy),
            naming_strategy: Arc::new(UniqueNamingStrategy),
            accepted_mime_types: Vec::new(),
            check_mime_type: false,
        }
    }

    pub fn with_storage_strategy<S: StorageStrategy + 'static>(mut self, strategy: S) -> Self {
        self.storage_strategy = Arc::new(strategy);
        self
    }

    pub fn with_naming_strategy<N: NamingStrategy + 'static>(mut self, strategy: N) -> Self {
        self.naming_strategy = Arc::new(strategy);
        self
    }

    /// Only accept completed files whose sniffed mime type is listed
    pub fn with_accepted_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_mime_types = types.into_iter().map(Into::into).collect();
        self.check_mime_type = !self.accepted_mime_types.is_empty();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.filesystem
    }

    pub fn check_mime_type(&self) -> bool {
        self.check_mime_type
    }

    pub fn accepted_mime_types(&self) -> &[String] {
        &self.accepted_mime_types
    }

    /// Path for the context's file: the already written one, or a new one
    pub fn resolve_path(&self, ctx: &UploadContext) -> String {
        if let Some(file) = &ctx.file {
            return file.file.path.clone();
        }

        let name = self.naming_strategy.file_name(ctx);
        let directory = self.storage_strategy.directory(ctx, &name);
        let directory = directory.trim_matches('/');
        if directory.is_empty() {
            name
        } else {
            format!("{directory}/{name}")
        }
    }

    pub async fn store(
        self: &Arc<Self>,
        ctx: &UploadContext,
        content: Bytes,
        options: &WriteOptions,
        overwrite: bool,
    ) -> Result<UploadedFile> {
        let path = self.resolve_path(ctx);
        let handle = if overwrite {
            self.filesystem.put(&path, content, options).await?
        } else {
            self.filesystem.write(&path, content, options).await?
        };
        Ok(self.uploaded(ctx, handle))
    }

    pub async fn store_stream(
        self: &Arc<Self>,
        ctx: &UploadContext,
        stream: ByteStream,
        options: &WriteOptions,
        overwrite: bool,
    ) -> Result<UploadedFile> {
        let path = self.resolve_path(ctx);
        let handle = if overwrite {
            self.filesystem.put_stream(&path, stream, options).await?
        } else {
            self.filesystem.write_stream(&path, stream, options).await?
        };
        Ok(self.uploaded(ctx, handle))
    }

    /// Look up an existing file
    pub async fn get(self: &Arc<Self>, path: &str) -> Result<UploadedFile> {
        let handle = self.filesystem.get(path).await?;
        Ok(UploadedFile::new(self.clone(), handle))
    }

    // A re-write of the context's file keeps its identity
    fn uploaded(self: &Arc<Self>, ctx: &UploadContext, handle: FileHandle) -> UploadedFile {
        let mut file = UploadedFile::new(self.clone(), handle);
        if let Some(previous) = &ctx.file {
            file.id = previous.id.clone();
            file.mime_type = previous.mime_type.clone();
        }
        file
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("name", &self.name)
            .field("accepted_mime_types", &self.accepted_mime_types)
            .field("check_mime_type", &self.check_mime_type)
            .finish_non_exhaustive()
    }
}

/// A file stored in a `FileStorage`
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub id: String,
    pub storage: Arc<FileStorage>,
    pub file: FileHandle,

    /// Sniffed mime type, set once the upload is finished
    pub mime_type: Option<String>,
}

impl UploadedFile {
    pub fn new(storage: Arc<FileStorage>, file: FileHandle) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            storage,
            file,
            mime_type: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.file.path
    }

    pub fn size(&self) -> u64 {
        self.file.size
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    /// Public attributes rendered for clients
    pub fn attributes(&self) -> Value {
        json!({
            "id": self.id,
            "path": self.file.path,
            "name": self.name(),
            "size": self.file.size,
            "mimeType": self.mime_type,
            "storage": self.storage.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::TempNamingStrategy;
    use crate::{MemoryFilesystem, UploadConfig, UploadError, UploadRequest};
    use http::Method;

    fn context() -> UploadContext {
        let request = UploadRequest::new(Method::POST, "/upload");
        UploadContext::new(request.head().clone(), Arc::new(UploadConfig::default()))
    }

    struct FixedDirectory;

    impl StorageStrategy for FixedDirectory {
        fn directory(&self, _ctx: &UploadContext, _file_name: &str) -> String {
            "/photos/".to_string()
        }
    }

    #[tokio::test]
    async fn new_files_follow_strategies() {
        let fs = MemoryFilesystem::new();
        let storage = Arc::new(
            FileStorage::new("photos", fs.clone())
                .with_storage_strategy(FixedDirectory)
                .with_naming_strategy(TempNamingStrategy),
        );

        let file = storage
            .store(&context(), Bytes::from_static(b"abc"), &WriteOptions::new(), false)
            .await
            .unwrap();

        assert!(file.path().starts_with("photos/"));
        assert!(file.name().ends_with(".tmp"));
        assert_eq!(file.size(), 3);
        assert_eq!(fs.paths(), vec![file.path().to_string()]);
    }

    #[tokio::test]
    async fn rewrites_reuse_the_context_file() {
        let storage = Arc::new(FileStorage::new("default", MemoryFilesystem::new()));
        let first = storage
            .store(&context(), Bytes::new(), &WriteOptions::new(), false)
            .await
            .unwrap();

        let ctx = context().with_file(first.clone());
        let err = storage
            .store(&ctx, Bytes::from_static(b"x"), &WriteOptions::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::ObjectAlreadyExists { .. }));

        let second = storage
            .store_stream(&ctx, crate::bytes_stream("xyz"), &WriteOptions::new(), true)
            .await
            .unwrap();
        assert_eq!(second.path(), first.path());
        assert_eq!(second.id, first.id);
        assert_eq!(second.size(), 3);
    }

    #[tokio::test]
    async fn attributes_expose_public_fields() {
        let storage = Arc::new(FileStorage::new("default", MemoryFilesystem::new()));
        let file = storage
            .store(&context(), Bytes::from_static(b"hello"), &WriteOptions::new(), false)
            .await
            .unwrap();

        let attributes = file.attributes();
        assert_eq!(attributes["size"], 5);
        assert_eq!(attributes["storage"], "default");
        assert_eq!(attributes["path"], file.path());
        assert_eq!(attributes["name"], file.name());
    }
}
