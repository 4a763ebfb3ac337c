use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument};

use super::{bind_form, check_headers, is_json, UploadProcessor, JSON};
use crate::filesystem::WriteOptions;
use crate::{
    ByteStream, FormBinder, Result, StorageHandler, UploadConfig, UploadContext, UploadError,
    UploadRequest, UploadResult,
};

const MULTIPART_RELATED: &str = "multipart/related";

/// JSON metadata part followed by the file part, in one `multipart/related` request
pub struct MultipartUploadProcessor {
    handler: Arc<StorageHandler>,
    config: Arc<UploadConfig>,
}

impl MultipartUploadProcessor {
    pub fn new(handler: Arc<StorageHandler>, config: Arc<UploadConfig>) -> Self {
        Self { handler, config }
    }
}

#[async_trait]
impl UploadProcessor for MultipartUploadProcessor {
    #[instrument(skip_all, fields(upload_type = "multipart", path = %request.head().path))]
    async fn handle_upload(
        &self,
        request: &mut UploadRequest,
        form: Option<&dyn FormBinder>,
    ) -> Result<UploadResult> {
        check_headers(request, &["Content-Type", "Content-Length"])?;
        let boundary = parse_boundary(request.header("Content-Type").unwrap_or_default())?;

        let mut parts = PartScanner::new(request.take_body(), &boundary, self.config.max_part_bytes);

        let metadata = parts.next_part().await?.ok_or(UploadError::EmptyContent)?;
        if !is_json(metadata.content_type.as_deref()) {
            return Err(UploadError::unexpected_content_type(
                JSON,
                metadata.content_type.as_deref(),
            ));
        }
        let data = serde_json::from_slice(&metadata.body)
            .map_err(|e| UploadError::invalid_json(e.to_string()))?;

        let form_data = match bind_form(form, data) {
            Ok(data) => data,
            Err(errors) => return Ok(UploadResult::from_form_errors(errors)),
        };

        let content = parts
            .next_part()
            .await?
            .filter(|part| !part.body.is_empty())
            .ok_or(UploadError::EmptyContent)?;
        debug!(size = content.body.len(), content_type = ?content.content_type, "read file part");

        let mut ctx = UploadContext::new(request.head().clone(), self.config.clone()).unfinished(true);
        let mut options = WriteOptions::new();
        if let Some(content_type) = content.content_type {
            ctx.content_type = Some(content_type.clone());
            options = options.with_content_type(content_type);
        }

        ctx.file = Some(self.handler.store(&ctx, content.body, &options, false).await?);
        let file = self.handler.finish_store(&mut ctx).await?;

        info!(path = %file.path(), size = file.size(), "multipart upload stored");

        Ok(UploadResult {
            file: Some(file),
            form_data: Some(form_data),
            ..UploadResult::default()
        })
    }
}

/// Boundary of a `multipart/related; boundary=...` content type, unquoted
pub(crate) fn parse_boundary(content_type: &str) -> Result<String> {
    let mismatch = || {
        UploadError::unexpected_content_type(
            "multipart/related; boundary=<boundary>",
            Some(content_type),
        )
    };

    let mut params = content_type.split(';');
    let essence = params.next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case(MULTIPART_RELATED) {
        return Err(mismatch());
    }

    let boundary = params
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim())
        .ok_or_else(mismatch)?;

    let boundary = boundary
        .strip_prefix('"')
        .and_then(|b| b.strip_suffix('"'))
        .unwrap_or(boundary);

    if boundary.is_empty() {
        return Err(mismatch());
    }
    Ok(boundary.to_string())
}

/// One part of a multipart body
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Part {
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, PartialEq)]
enum Line {
    Delimiter,
    End,
    Data,
}

/// Reads parts one at a time off a multipart body.
///
/// Lines are read with a bound so that no part grows past `max_part_bytes`.
pub(crate) struct PartScanner {
    reader: StreamReader<ByteStream, Bytes>,
    delimiter: Vec<u8>,
    max_part_bytes: u64,
    started: bool,
    finished: bool,
}

impl PartScanner {
    pub fn new(body: ByteStream, boundary: &str, max_part_bytes: u64) -> Self {
        Self {
            reader: StreamReader::new(body),
            delimiter: format!("--{boundary}").into_bytes(),
            max_part_bytes,
            started: false,
            finished: false,
        }
    }

    fn classify(&self, line: &[u8]) -> Line {
        match strip_eol(line).strip_prefix(self.delimiter.as_slice()) {
            Some(b"") => Line::Delimiter,
            Some(b"--") => Line::End,
            _ => Line::Data,
        }
    }

    // Bounded so a delimiter line always fits after `used` bytes
    async fn read_line(&mut self, line: &mut Vec<u8>, used: usize) -> Result<usize> {
        line.clear();
        let budget = self.max_part_bytes.saturating_sub(used as u64) + self.delimiter.len() as u64 + 4;
        let read = (&mut self.reader).take(budget).read_until(b'\n', line).await?;
        Ok(read)
    }

    pub async fn next_part(&mut self) -> Result<Option<Part>> {
        if self.finished {
            return Ok(None);
        }

        let mut line = Vec::new();

        if !self.started {
            let mut preamble = 0usize;
            loop {
                if self.read_line(&mut line, preamble).await? == 0 {
                    self.finished = true;
                    return Ok(None);
                }
                match self.classify(&line) {
                    Line::Delimiter => break,
                    Line::End => {
                        self.finished = true;
                        return Ok(None);
                    }
                    Line::Data => {
                        preamble += line.len();
                        self.check_size(preamble)?;
                    }
                }
            }
            self.started = true;
        }

        let mut content_type = None;
        let mut in_body = false;
        let mut header_bytes = 0usize;
        let mut content = BytesMut::new();
        loop {
            if self.read_line(&mut line, header_bytes + content.len()).await? == 0 {
                self.finished = true;
                break;
            }
            match self.classify(&line) {
                Line::Delimiter => break,
                Line::End => {
                    self.finished = true;
                    break;
                }
                Line::Data if in_body => content.extend_from_slice(&line),
                Line::Data => {
                    // Headers end at the first blank line
                    if strip_eol(&line).is_empty() {
                        in_body = true;
                    } else if let Some(value) = content_type_header(&line) {
                        content_type = Some(value);
                    }
                    header_bytes += line.len();
                }
            }
            self.check_size(header_bytes + content.len())?;
        }

        Ok(Some(Part {
            content_type,
            body: trim(content.freeze()),
        }))
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size as u64 > self.max_part_bytes {
            return Err(UploadError::PartTooLarge {
                limit: self.max_part_bytes,
            });
        }
        Ok(())
    }
}

fn strip_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn content_type_header(line: &[u8]) -> Option<String> {
    let header = String::from_utf8_lossy(strip_eol(line));
    let (name, value) = header.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case("content-type")
        .then(|| value.trim().to_string())
}

fn trim(data: Bytes) -> Bytes {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    data.slice(start..end)
}
