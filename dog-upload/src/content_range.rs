use crate::{Result, UploadError};

/// Parsed `Content-Range` request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// `bytes */<total>`: asks for the upload status
    Status { total: u64 },

    /// `bytes <start>-<end>/<total>`
    Bytes { start: u64, end: u64, total: u64 },
}

impl ContentRange {
    /// Parse `bytes (*|<start>-<end>)/<total>`.
    ///
    /// `total` must be positive, `start <= end` and `end <= total`.
    pub fn parse(header: &str) -> Result<Self> {
        let rest = header.trim().strip_prefix("bytes ").ok_or_else(|| {
            UploadError::invalid_content_range(
                "must start with \"bytes \", range and total length",
            )
        })?;

        let (range, total) = rest.split_once('/').ok_or_else(|| {
            UploadError::invalid_content_range("must contain a range and a total length")
        })?;

        let total = number(total)?;
        if total == 0 {
            return Err(UploadError::invalid_content_range("total length not found"));
        }

        if range == "*" {
            return Ok(Self::Status { total });
        }

        let (start, end) = range.split_once('-').ok_or_else(|| {
            UploadError::invalid_content_range("end or start is empty")
        })?;
        let start = number(start)?;
        let end = number(end)?;

        if start > end {
            return Err(UploadError::invalid_content_range(
                "start must be lower than end",
            ));
        }
        if end > total {
            return Err(UploadError::invalid_content_range(
                "end must be lower or equal to total length",
            ));
        }

        Ok(Self::Bytes { start, end, total })
    }

    pub fn total(&self) -> u64 {
        match self {
            Self::Status { total } | Self::Bytes { total, .. } => *total,
        }
    }

    /// Offset the request body starts at, `None` for a status query
    pub fn start(&self) -> Option<u64> {
        match self {
            Self::Status { .. } => None,
            Self::Bytes { start, .. } => Some(*start),
        }
    }
}

fn number(s: &str) -> Result<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UploadError::invalid_content_range(format!(
            "{s:?} is not a byte position"
        )));
    }
    s.parse()
        .map_err(|_| UploadError::invalid_content_range(format!("{s} is out of range")))
}
