use std::time::Duration;

/// Configuration shared by every upload processor
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Query parameter carrying the upload type (`simple`, `multipart`, `resumable`)
    pub upload_type_parameter: String,

    /// Query parameter carrying the resumable session id
    pub session_parameter: String,

    /// Resumable sessions whose declared length is <= this are staged in the
    /// staging storage instead of being written into their placeholder object.
    /// 0 disables staging.
    pub temp_threshold_bytes: u64,

    /// Upper bound for a single part of a multipart/related body
    pub max_part_bytes: u64,

    /// Age after which an unfinished resumable session is considered abandoned
    pub session_ttl: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_type_parameter: "uploadType".to_string(),
            session_parameter: "uploadId".to_string(),
            temp_threshold_bytes: 0,
            max_part_bytes: 100 * 1024 * 1024, // 100MB
            session_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl UploadConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upload type query parameter name
    pub fn with_upload_type_parameter<S: Into<String>>(mut self, name: S) -> Self {
        self.upload_type_parameter = name.into();
        self
    }

    /// Set the resumable session query parameter name
    pub fn with_session_parameter<S: Into<String>>(mut self, name: S) -> Self {
        self.session_parameter = name.into();
        self
    }

    /// Stage sessions up to `bytes` long in the staging storage
    pub fn with_temp_threshold(mut self, bytes: u64) -> Self {
        self.temp_threshold_bytes = bytes;
        self
    }

    /// Set the multipart per-part size bound
    pub fn with_max_part_bytes(mut self, bytes: u64) -> Self {
        self.max_part_bytes = bytes;
        self
    }

    /// Set the abandoned-session expiry
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub(crate) fn stages(&self, content_length: u64) -> bool {
        self.temp_threshold_bytes > 0 && content_length <= self.temp_threshold_bytes
    }
}
