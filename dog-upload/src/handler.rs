use bytes::Bytes;
use std::sync::Arc;
use tracing::{info, warn};

use crate::filesystem::{Filesystem, WriteOptions};
use crate::{
    mime, ByteStream, FileStorage, Result, SessionLocks, StorageVoter, UploadContext, UploadError,
    UploadedFile,
};

/// Writes through the storage picked by the voter and finishes uploads:
/// mime gating, then promotion out of temp storage.
#[derive(Debug)]
pub struct StorageHandler {
    voter: StorageVoter,
    session_locks: SessionLocks,
}

impl StorageHandler {
    pub fn new(voter: StorageVoter) -> Self {
        Self {
            voter,
            session_locks: SessionLocks::new(),
        }
    }

    pub fn voter(&self) -> &StorageVoter {
        &self.voter
    }

    /// Locks guarding the bytes of resumable sessions written through this handler
    pub fn session_locks(&self) -> &SessionLocks {
        &self.session_locks
    }

    pub fn storage(&self, ctx: &UploadContext) -> Result<Arc<FileStorage>> {
        self.voter.select_storage(ctx)
    }

    pub fn filesystem(&self, ctx: &UploadContext) -> Result<Arc<dyn Filesystem>> {
        Ok(self.storage(ctx)?.filesystem().clone())
    }

    pub async fn store(
        &self,
        ctx: &UploadContext,
        content: Bytes,
        options: &WriteOptions,
        overwrite: bool,
    ) -> Result<UploadedFile> {
        self.storage(ctx)?
            .store(ctx, content, options, overwrite)
            .await
    }

    pub async fn store_stream(
        &self,
        ctx: &UploadContext,
        stream: ByteStream,
        options: &WriteOptions,
        overwrite: bool,
    ) -> Result<UploadedFile> {
        self.storage(ctx)?
            .store_stream(ctx, stream, options, overwrite)
            .await
    }

    /// Finish the context's file.
    ///
    /// The sniffed mime type is checked against the destination allowlist; a
    /// rejected file is deleted. A file in temp storage is then copied into the
    /// finished storage under a new name and the temp copy removed. On success
    /// the context points at the finished file.
    pub async fn finish_store(&self, ctx: &mut UploadContext) -> Result<UploadedFile> {
        let mut file = ctx.file.clone().ok_or(UploadError::EmptyContent)?;
        let active = self.storage(ctx)?;
        let filesystem = active.filesystem();
        let path = file.path().to_string();

        let detected = filesystem.mime_type(&path).await?;
        if let Some(accepted) = self.voter.accepted_mime_types(ctx)? {
            if !accepted.iter().any(|a| mime::matches(&detected, a)) {
                warn!(path = %path, mime_type = %detected, "rejecting upload with unaccepted mime type");
                if let Err(e) = filesystem.delete(&path).await {
                    warn!(path = %path, error = %e, "failed to delete rejected upload");
                }
                return Err(UploadError::MimeTypeRejected {
                    mime_type: detected,
                });
            }
        }

        if !self.voter.is_temp(&active) {
            file.mime_type = Some(detected);
            ctx.file = Some(file.clone());
            return Ok(file);
        }

        let finished = self.voter.finished_storage(ctx)?;
        let mut target = ctx.clone();
        target.file = None;
        target.unfinished = false;

        let mut options = WriteOptions::new();
        options.content_type = file
            .file
            .content_type
            .clone()
            .or_else(|| ctx.content_type.clone());

        let stream = filesystem.read_stream(&path).await?;
        let mut promoted = finished.store_stream(&target, stream, &options, false).await?;
        promoted.id = file.id.clone();
        promoted.mime_type = Some(detected);

        if let Err(e) = filesystem.delete(&path).await {
            warn!(path = %path, error = %e, "failed to delete promoted temp file");
        }

        info!(
            from = %path,
            to = %promoted.path(),
            storage = %finished.name(),
            size = promoted.size(),
            "promoted upload out of temp storage"
        );

        ctx.file = Some(promoted.clone());
        ctx.unfinished = false;
        Ok(promoted)
    }
}
