//! # dog-upload: Simple, multipart and resumable uploads
//!
//! `dog-upload` implements the server side of a REST upload protocol for DogRS
//! applications. It knows nothing about HTTP frameworks: requests come in as an
//! [`UploadRequest`] and leave as an [`UploadResponse`], so the same core runs
//! behind axum, a CLI or a test harness.
//!
//! ## Upload modes
//!
//! - **simple**: the whole file is the request body, form fields travel in the query string
//! - **multipart**: a `multipart/related` body with a JSON metadata part then the file part
//! - **resumable**: a session is started with the metadata, then the file is sent in
//!   one or more `Content-Range` chunks; `bytes */<total>` reports progress
//!
//! ## Storage
//!
//! Files land in named [`FileStorage`]s, each a [`Filesystem`] plus naming and
//! placement strategies. The [`StorageVoter`] picks the storage for every write,
//! routing unfinished uploads to an optional temp storage. When an upload
//! completes the [`StorageHandler`] sniffs its mime type, enforces the
//! destination allowlist and promotes it out of temp storage.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dog_upload::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> dog_upload::Result<()> {
//! let voter = StorageVoter::new()
//!     .with_storage(FileStorage::new("default", MemoryFilesystem::new()))?;
//!
//! let uploads = UploadHandler::with_default_processors(
//!     Arc::new(UploadConfig::default()),
//!     Arc::new(StorageHandler::new(voter)),
//!     Arc::new(MemoryUploadSessionStore::new()),
//! );
//!
//! let mut request = UploadRequest::new(http::Method::POST, "/upload")
//!     .with_query_string("uploadType=simple&name=hello")
//!     .with_header("Content-Type", "text/plain")
//!     .with_bytes("Hello, world!");
//!
//! let response = uploads.handle_request(&mut request, None).await.into_response();
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body.unwrap()["name"], "hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  UploadHandler   │  ← picks a processor by upload type
//! ├──────────────────┤
//! │ UploadProcessor  │  ← simple / multipart / resumable wire protocols
//! ├──────────────────┤
//! │ StorageHandler   │  ← store, mime gating, temp promotion
//! ├──────────────────┤
//! │  StorageVoter    │  ← which FileStorage backs a write
//! ├──────────────────┤
//! │   Filesystem     │  ← memory, local disk, S3
//! └──────────────────┘
//! ```

mod config;
mod content_range;
mod context;
mod dispatch;
mod error;
pub mod filesystem;
mod form;
mod handler;
mod local;
mod memory;
pub mod mime;
pub mod processor;
mod reaper;
#[cfg(feature = "s3")]
mod s3_store;
mod session;
mod storage;
pub mod strategy;
mod types;
mod voter;

pub use config::UploadConfig;
pub use content_range::ContentRange;
pub use context::{UploadContext, UploadResponse, UploadResult};
pub use dispatch::UploadHandler;
pub use error::{Result, UploadError};
pub use filesystem::{FileHandle, Filesystem, WriteOptions};
pub use form::{FormBinder, FormErrors, ValidatorForm};
pub use handler::StorageHandler;
pub use local::LocalFilesystem;
pub use memory::MemoryFilesystem;
pub use processor::{
    MultipartUploadProcessor, ResumableUploadProcessor, SimpleUploadProcessor, UploadProcessor,
};
pub use reaper::SessionReaper;
#[cfg(feature = "s3")]
pub use s3_store::S3Filesystem;
pub use session::{
    MemoryUploadSessionStore, SessionLockGuard, SessionLocks, UploadSession, UploadSessionStore,
};
pub use storage::{FileStorage, UploadedFile};
pub use types::{bytes_stream, empty_stream, ByteStream, RequestHead, SessionId, UploadRequest};
pub use voter::StorageVoter;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        FileStorage, Filesystem, FormBinder, LocalFilesystem, MemoryFilesystem,
        MemoryUploadSessionStore, StorageHandler, StorageVoter, UploadConfig, UploadError,
        UploadHandler, UploadRequest, UploadResponse, UploadResult,
    };
}
