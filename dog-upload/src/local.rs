use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::filesystem::{FileHandle, Filesystem, WriteOptions};
use crate::{mime, ByteStream, Result, UploadError};

/// Filesystem rooted at a directory on local disk.
///
/// Object paths are relative to the root and may contain `/` separated
/// directories, which are created on demand. Paths that would leave the root
/// are rejected.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if path.is_empty() || escapes {
            return Err(UploadError::Io {
                source: std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("path {path:?} escapes the storage root"),
                ),
            });
        }
        Ok(self.root.join(relative))
    }

    async fn open_for_write(&self, path: &str, overwrite: bool) -> Result<(PathBuf, File)> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        match options.open(&target).await {
            Ok(file) => Ok((target, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(UploadError::ObjectAlreadyExists {
                path: path.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_from(
        &self,
        path: &str,
        mut stream: ByteStream,
        options: &WriteOptions,
        overwrite: bool,
    ) -> Result<FileHandle> {
        let (target, mut file) = self.open_for_write(path, overwrite).await?;

        let mut size = 0u64;
        let copied: Result<()> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                size += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(e) = copied {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&target).await {
                warn!(path = %target.display(), error = %cleanup, "failed to remove partial file");
            }
            return Err(e);
        }

        Ok(FileHandle {
            path: path.to_string(),
            size,
            content_type: options.content_type.clone(),
        })
    }
}

fn not_found(path: &str, e: std::io::Error) -> UploadError {
    if e.kind() == ErrorKind::NotFound {
        UploadError::object_not_found(path)
    } else {
        e.into()
    }
}

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn write(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle> {
        self.write_from(path, crate::bytes_stream(content), options, false)
            .await
    }

    async fn put(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle> {
        self.write_from(path, crate::bytes_stream(content), options, true)
            .await
    }

    async fn write_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle> {
        self.write_from(path, stream, options, false).await
    }

    async fn put_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle> {
        self.write_from(path, stream, options, true).await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let file = File::open(self.resolve(path)?)
            .await
            .map_err(|e| not_found(path, e))?;
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn has(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.resolve(path)?).await?)
    }

    async fn get(&self, path: &str) -> Result<FileHandle> {
        let metadata = fs::metadata(self.resolve(path)?)
            .await
            .map_err(|e| not_found(path, e))?;
        if !metadata.is_file() {
            return Err(UploadError::object_not_found(path));
        }

        Ok(FileHandle {
            path: path.to_string(),
            size: metadata.len(),
            content_type: None,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn mime_type(&self, path: &str) -> Result<String> {
        let file = File::open(self.resolve(path)?)
            .await
            .map_err(|e| not_found(path, e))?;

        let mut head = Vec::with_capacity(mime::SNIFF_LEN);
        file.take(mime::SNIFF_LEN as u64).read_to_end(&mut head).await?;
        Ok(mime::sniff(&head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());

        let handle = fs
            .write("2024/05/hello.txt", Bytes::from_static(b"hello"), &WriteOptions::new())
            .await
            .unwrap();
        assert_eq!(handle.size, 5);
        assert_eq!(handle.name(), "hello.txt");

        assert!(fs.has("2024/05/hello.txt").await.unwrap());
        assert_eq!(fs.size("2024/05/hello.txt").await.unwrap(), 5);
        assert_eq!(fs.read("2024/05/hello.txt").await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(fs.mime_type("2024/05/hello.txt").await.unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn create_if_absent_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        let options = WriteOptions::new();

        fs.write("a.bin", Bytes::from_static(b"first"), &options).await.unwrap();
        let err = fs
            .write("a.bin", Bytes::from_static(b"second"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::ObjectAlreadyExists { .. }));

        fs.put("a.bin", Bytes::from_static(b"2nd"), &options).await.unwrap();
        assert_eq!(fs.read("a.bin").await.unwrap(), Bytes::from_static(b"2nd"));

        fs.delete("a.bin").await.unwrap();
        fs.delete("a.bin").await.unwrap();
        assert!(!fs.has("a.bin").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path().join("inner"));

        let err = fs
            .put("../escape.txt", Bytes::from_static(b"x"), &WriteOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Io { .. }));
        assert!(fs.read("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());
        assert!(matches!(
            fs.get("missing").await.unwrap_err(),
            UploadError::ObjectNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFilesystem::new(dir.path());

        let broken: ByteStream = Box::pin(futures_util::stream::iter([
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ]));
        assert!(fs
            .write_stream("broken.bin", broken, &WriteOptions::new())
            .await
            .is_err());
        assert!(!fs.has("broken.bin").await.unwrap());
        assert!(!dir.path().join("broken.bin").exists());
    }
}
