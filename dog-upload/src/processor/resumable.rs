use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

use super::{
    bind_form, check_headers, header_u64, is_json, parse_json, read_bounded, UploadProcessor, JSON,
};
use crate::filesystem::{FileHandle, Filesystem, WriteOptions};
use crate::reaper::purge_session;
use crate::{
    ByteStream, ContentRange, FileStorage, FormBinder, RequestHead, Result, SessionId, StorageHandler,
    UploadConfig, UploadContext, UploadError, UploadRequest, UploadResponse, UploadResult,
    UploadSession, UploadSessionStore, UploadedFile,
};

/// Where the bytes of an unfinished session accumulate
struct Target {
    storage: Arc<FileStorage>,
    path: String,
    staged: bool,
}

/// Session-based chunked uploads.
///
/// A POST without a session id starts a session and answers with its
/// `Location`. PUTs to that location carry the bytes, optionally in several
/// `Content-Range` chunks, and `bytes */<total>` asks how far the upload got.
/// Requests for one session run one at a time under the handler's session locks.
pub struct ResumableUploadProcessor {
    handler: Arc<StorageHandler>,
    sessions: Arc<dyn UploadSessionStore>,
    config: Arc<UploadConfig>,
}

impl ResumableUploadProcessor {
    pub fn new(
        handler: Arc<StorageHandler>,
        sessions: Arc<dyn UploadSessionStore>,
        config: Arc<UploadConfig>,
    ) -> Self {
        Self {
            handler,
            sessions,
            config,
        }
    }

    #[instrument(skip_all, fields(upload_type = "resumable", path = %request.head().path))]
    async fn start_session(
        &self,
        request: &mut UploadRequest,
        form: Option<&dyn FormBinder>,
    ) -> Result<UploadResult> {
        check_headers(
            request,
            &["Content-Type", "X-Upload-Content-Type", "X-Upload-Content-Length"],
        )?;
        if !is_json(request.header("Content-Type")) {
            return Err(UploadError::unexpected_content_type(
                JSON,
                request.header("Content-Type"),
            ));
        }

        let content_type = request
            .header("X-Upload-Content-Type")
            .unwrap_or_default()
            .to_string();
        let content_length = header_u64(request, "X-Upload-Content-Length")?;

        let body = read_bounded(request.take_body(), self.config.max_part_bytes).await?;
        let form_data = match bind_form(form, parse_json(&body)?) {
            Ok(data) => data,
            Err(errors) => return Ok(UploadResult::from_form_errors(errors)),
        };

        let ctx = UploadContext::new(request.head().clone(), self.config.clone())
            .with_content_type(content_type.clone());
        let options = WriteOptions::new().with_content_type(content_type.clone());
        let placeholder = self.handler.store(&ctx, Bytes::new(), &options, false).await?;

        let session = UploadSession {
            session_id: SessionId::new(),
            storage_name: placeholder.storage.name().to_string(),
            file_path: placeholder.path().to_string(),
            content_type,
            content_length,
            form_data,
            created_at: Utc::now(),
            completed_at: None,
        };

        if let Err(e) = self.sessions.save(session.clone()).await {
            if let Err(cleanup) = placeholder.storage.filesystem().delete(placeholder.path()).await {
                warn!(path = %placeholder.path(), error = %cleanup, "failed to delete placeholder");
            }
            return Err(e);
        }

        info!(
            session_id = %session.session_id,
            storage = %session.storage_name,
            content_length,
            "resumable upload session started"
        );

        let location = request
            .head()
            .location_with(&self.config.session_parameter, session.session_id.as_str());
        Ok(UploadResult::from_response(
            UploadResponse::new(200).with_header("Location", location),
        ))
    }

    #[instrument(skip_all, fields(upload_type = "resumable", session_id = %session.session_id))]
    async fn resume(&self, request: &mut UploadRequest, session: UploadSession) -> Result<UploadResult> {
        let content_length = header_u64(request, "Content-Length")?;
        let range = request
            .header("Content-Range")
            .map(ContentRange::parse)
            .transpose()?;

        if let Some(range) = &range {
            if range.total() != session.content_length {
                return Err(UploadError::RangeTotalMismatch {
                    expected: session.content_length,
                    found: range.total(),
                });
            }
        }

        if session.is_completed() {
            return match range {
                Some(ContentRange::Status { .. }) if content_length == 0 => {
                    Ok(status(session.content_length, session.content_length))
                }
                Some(ContentRange::Status { .. }) => Err(status_with_body()),
                Some(ContentRange::Bytes { start, .. }) => Err(UploadError::RangeOffsetMismatch {
                    start,
                    uploaded: session.content_length,
                }),
                None => Err(UploadError::RangeOffsetMismatch {
                    start: 0,
                    uploaded: session.content_length,
                }),
            };
        }

        let target = self.target(&session)?;
        let filesystem = target.storage.filesystem().clone();

        let start = match range {
            Some(ContentRange::Status { total }) => {
                if content_length != 0 {
                    return Err(status_with_body());
                }
                let uploaded = uploaded_size(filesystem.as_ref(), &target.path).await?;
                debug!(uploaded, total, "upload status requested");
                return Ok(status(uploaded, total));
            }
            Some(ContentRange::Bytes { start, .. }) => {
                let uploaded = uploaded_size(filesystem.as_ref(), &target.path).await?;
                if start != uploaded {
                    warn!(start, uploaded, "chunk does not start at the uploaded offset");
                    return Err(UploadError::RangeOffsetMismatch { start, uploaded });
                }
                start
            }
            None => 0,
        };

        let options = WriteOptions::new().with_content_type(session.content_type.clone());
        let written = write_at(
            filesystem.as_ref(),
            &target.path,
            start,
            request.take_body(),
            &options,
        )
        .await?;

        if written.size < session.content_length {
            debug!(size = written.size, total = session.content_length, "chunk accepted");
            Ok(status(written.size, session.content_length))
        } else if written.size == session.content_length {
            self.complete(request.head().clone(), session, target, written).await
        } else {
            warn!(
                size = written.size,
                expected = session.content_length,
                "upload is longer than declared"
            );
            purge_session(&self.handler, self.sessions.as_ref(), &session).await?;
            Err(UploadError::OverLongUpload {
                expected: session.content_length,
                actual: written.size,
            })
        }
    }

    fn target(&self, session: &UploadSession) -> Result<Target> {
        let voter = self.handler.voter();
        if self.config.stages(session.content_length) {
            if let Some(temp) = voter.temp_storage() {
                return Ok(Target {
                    storage: temp.clone(),
                    path: session.staging_path(),
                    staged: true,
                });
            }
        }

        let storage = voter
            .storage(&session.storage_name)
            .cloned()
            .ok_or_else(|| UploadError::unknown_storage(session.storage_name.as_str()))?;
        Ok(Target {
            storage,
            path: session.file_path.clone(),
            staged: false,
        })
    }

    async fn complete(
        &self,
        head: RequestHead,
        mut session: UploadSession,
        target: Target,
        written: FileHandle,
    ) -> Result<UploadResult> {
        let mut ctx = UploadContext::new(head, self.config.clone())
            .with_storage_name(session.storage_name.clone())
            .with_content_type(session.content_type.clone())
            .unfinished(target.staged)
            .with_file(UploadedFile::new(target.storage.clone(), written));

        let file = match self.handler.finish_store(&mut ctx).await {
            Ok(file) => file,
            Err(e @ UploadError::MimeTypeRejected { .. }) => {
                purge_session(&self.handler, self.sessions.as_ref(), &session).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // The promoted copy replaces the placeholder allocated at session start
        if target.staged && file.path() != session.file_path {
            if let Some(storage) = self.handler.voter().storage(&session.storage_name) {
                if let Err(e) = storage.filesystem().delete(&session.file_path).await {
                    warn!(path = %session.file_path, error = %e, "failed to delete placeholder");
                }
            }
        }

        session.storage_name = file.storage.name().to_string();
        session.file_path = file.path().to_string();
        session.completed_at = Some(Utc::now());
        self.sessions.save(session.clone()).await?;

        info!(
            path = %file.path(),
            storage = %file.storage.name(),
            size = file.size(),
            "resumable upload completed"
        );

        Ok(UploadResult {
            file: Some(file),
            form_data: Some(session.form_data),
            ..UploadResult::default()
        })
    }
}

#[async_trait]
impl UploadProcessor for ResumableUploadProcessor {
    async fn handle_upload(
        &self,
        request: &mut UploadRequest,
        form: Option<&dyn FormBinder>,
    ) -> Result<UploadResult> {
        let Some(session_id) = request
            .query_param(&self.config.session_parameter)
            .map(str::to_string)
        else {
            return self.start_session(request, form).await;
        };

        check_headers(request, &["Content-Length"])?;
        let _guard = self.handler.session_locks().lock(&session_id).await;
        match self.sessions.find(&session_id).await? {
            Some(session) => self.resume(request, session).await,
            None => Err(UploadError::session_not_found(session_id)),
        }
    }
}

fn status_with_body() -> UploadError {
    UploadError::invalid_content_range("Content-Length must be 0 if asking upload status")
}

/// 201 when every byte arrived, 308 otherwise, with the received range
fn status(uploaded: u64, total: u64) -> UploadResult {
    let code = if uploaded == total { 201 } else { 308 };
    let last = uploaded.max(1) - 1;
    UploadResult::from_response(UploadResponse::new(code).with_header("Range", format!("0-{last}")))
}

async fn uploaded_size(filesystem: &dyn Filesystem, path: &str) -> Result<u64> {
    match filesystem.size(path).await {
        Ok(size) => Ok(size),
        Err(UploadError::ObjectNotFound { .. }) => Ok(0),
        Err(e) => Err(e),
    }
}

/// Write `body` into the object at `offset` through a local working copy
async fn write_at(
    filesystem: &dyn Filesystem,
    path: &str,
    offset: u64,
    mut body: ByteStream,
    options: &WriteOptions,
) -> Result<FileHandle> {
    let mut copy = tokio::fs::File::from_std(tempfile::tempfile()?);

    if filesystem.has(path).await? {
        let mut existing = filesystem.read_stream(path).await?;
        while let Some(chunk) = existing.next().await {
            copy.write_all(&chunk?).await?;
        }
    }

    copy.seek(SeekFrom::Start(offset))
        .await
        .map_err(|source| UploadError::Write { source })?;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| UploadError::Write { source })?;
        copy.write_all(&chunk)
            .await
            .map_err(|source| UploadError::Write { source })?;
    }
    copy.flush().await.map_err(|source| UploadError::Write { source })?;
    copy.rewind().await?;

    filesystem
        .put_stream(path, Box::pin(ReaderStream::new(copy)), options)
        .await
}
