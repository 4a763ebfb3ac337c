//! dog-upload-axum: Axum adapter for dog-upload.
//!
//! Mounts the upload protocol on an axum router, renders failures as
//! Feathers-style JSON errors and wires the storages of the standalone
//! `dog-upload-server` binary from the environment.

pub mod app;
pub mod config;
mod error;
pub mod rest;
pub mod state;

use std::sync::Arc;

use dog_upload::{
    FileStorage, LocalFilesystem, MemoryUploadSessionStore, StorageHandler, StorageVoter,
    UploadHandler, UploadSessionStore,
};

pub use app::UploadApp;
pub use config::ServerConfig;
pub use error::UploadHttpError;
pub use state::UploadAxumState;

/// Assemble storages, processors and routes.
///
/// Uploads are served at `/upload` and a liveness check at `/health`.
pub async fn build(config: &ServerConfig) -> anyhow::Result<UploadApp> {
    let default = default_storage(config)
        .await?
        .with_accepted_mime_types(config.accepted_mime_types.iter().cloned());

    let mut voter = StorageVoter::new().with_storage(default)?;
    if let Some(dir) = &config.temp_dir {
        voter = voter.with_temp_storage(FileStorage::new("temp", LocalFilesystem::new(dir)));
    }

    let storage = Arc::new(StorageHandler::new(voter));
    let sessions: Arc<dyn UploadSessionStore> = Arc::new(MemoryUploadSessionStore::new());
    let uploads = UploadHandler::with_default_processors(
        Arc::new(config.upload.clone()),
        Arc::clone(&storage),
        Arc::clone(&sessions),
    );

    Ok(UploadApp::new(uploads, storage, sessions)
        .use_uploads("/upload", None)
        .service("/health", || async { "ok" })
        .with_http_layers())
}

#[cfg(feature = "s3")]
async fn default_storage(config: &ServerConfig) -> anyhow::Result<FileStorage> {
    match &config.s3_bucket {
        Some(bucket) => {
            let filesystem = dog_upload::S3Filesystem::from_env(bucket.clone()).await?;
            Ok(FileStorage::new("default", filesystem))
        }
        None => Ok(FileStorage::new("default", LocalFilesystem::new(&config.upload_dir))),
    }
}

#[cfg(not(feature = "s3"))]
async fn default_storage(config: &ServerConfig) -> anyhow::Result<FileStorage> {
    if config.s3_bucket.is_some() {
        anyhow::bail!("UPLOAD_S3_BUCKET is set but dog-upload-axum was built without the s3 feature");
    }
    Ok(FileStorage::new("default", LocalFilesystem::new(&config.upload_dir)))
}
