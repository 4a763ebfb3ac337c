use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};
use bytes::Bytes;
use futures_util::StreamExt;
use std::env;
use tokio_util::io::ReaderStream;

use crate::filesystem::{FileHandle, Filesystem, WriteOptions};
use crate::{mime, ByteStream, Result, UploadError};

/// S3 connection settings read from the environment
#[derive(Debug)]
struct S3Config {
    region: String,
    access_key_id: String,
    secret_access_key: String,
    endpoint_url: String,
}

impl S3Config {
    fn from_env() -> Result<Self> {
        fn get_env(key: &str) -> Result<String> {
            env::var(key).map_err(|_| UploadError::Backend {
                source: format!("{} environment variable required", key).into(),
            })
        }

        Ok(Self {
            region: get_env("S3_REGION")?,
            access_key_id: get_env("S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("S3_SECRET_ACCESS_KEY")?,
            endpoint_url: get_env("S3_ENDPOINT_URL")?,
        })
    }
}

/// Filesystem backed by a bucket of an S3-compatible object store
#[derive(Clone)]
pub struct S3Filesystem {
    client: Client,
    bucket: String,
}

impl S3Filesystem {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from `S3_REGION`, `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY` and `S3_ENDPOINT_URL`
    pub async fn from_env(bucket: impl Into<String>) -> Result<Self> {
        let config = S3Config::from_env()?;
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "dog-upload",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url)
            .load()
            .await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build(),
        );
        Ok(Self::new(client, bucket))
    }

    async fn collect_stream(mut stream: ByteStream) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }

    async fn upload(&self, path: &str, data: Vec<u8>, options: &WriteOptions) -> Result<FileHandle> {
        let size = data.len() as u64;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(AwsByteStream::from(data));

        if let Some(ct) = &options.content_type {
            request = request.content_type(ct);
        }

        request.send().await.map_err(UploadError::backend)?;

        Ok(FileHandle {
            path: path.to_string(),
            size,
            content_type: options.content_type.clone(),
        })
    }

    async fn ensure_absent(&self, path: &str) -> Result<()> {
        if self.has(path).await? {
            return Err(UploadError::ObjectAlreadyExists {
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Filesystem for S3Filesystem {
    async fn write(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle> {
        self.ensure_absent(path).await?;
        self.upload(path, content.to_vec(), options).await
    }

    async fn put(&self, path: &str, content: Bytes, options: &WriteOptions) -> Result<FileHandle> {
        self.upload(path, content.to_vec(), options).await
    }

    async fn write_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle> {
        self.ensure_absent(path).await?;
        let data = Self::collect_stream(stream).await?;
        self.upload(path, data, options).await
    }

    async fn put_stream(
        &self,
        path: &str,
        stream: ByteStream,
        options: &WriteOptions,
    ) -> Result<FileHandle> {
        let data = Self::collect_stream(stream).await?;
        self.upload(path, data, options).await
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => UploadError::object_not_found(path),
                _ => UploadError::backend(e),
            })?;

        Ok(Box::pin(ReaderStream::new(result.body.into_async_read())))
    }

    async fn has(&self, path: &str) -> Result<bool> {
        match self.get(path).await {
            Ok(_) => Ok(true),
            Err(UploadError::ObjectNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, path: &str) -> Result<FileHandle> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_not_found() => UploadError::object_not_found(path),
                _ => UploadError::backend(e),
            })?;

        Ok(FileHandle {
            path: path.to_string(),
            size: result.content_length.unwrap_or(0) as u64,
            content_type: result.content_type,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(UploadError::backend)?;
        Ok(())
    }

    async fn mime_type(&self, path: &str) -> Result<String> {
        // Range requests against empty objects are unsatisfiable
        if self.get(path).await?.size == 0 {
            return Ok(mime::sniff(&[]));
        }

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .range(format!("bytes=0-{}", mime::SNIFF_LEN - 1))
            .send()
            .await
            .map_err(UploadError::backend)?;

        let body = result.body.collect().await.map_err(UploadError::backend)?;
        Ok(mime::sniff(&body.into_bytes()))
    }
}
