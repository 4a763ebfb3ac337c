use thiserror::Error;

/// Result type for upload operations
pub type Result<T, E = UploadError> = std::result::Result<T, E>;

/// Errors that can occur while processing an upload
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Missing required header: {header}")]
    MissingHeader { header: String },

    #[error("Invalid value {value:?} for header {header}")]
    InvalidHeader { header: String, value: String },

    #[error("Expected content type is {expected}. Found {}", .found.as_deref().unwrap_or("none"))]
    UnexpectedContentType {
        expected: String,
        found: Option<String>,
    },

    #[error("Unable to parse JSON: {reason}")]
    InvalidJson { reason: String },

    #[error("An empty content found")]
    EmptyContent,

    #[error("Multipart part is larger than {limit} bytes")]
    PartTooLarge { limit: u64 },

    #[error("Invalid Content-Range header: {reason}")]
    InvalidContentRange { reason: String },

    #[error("File size must be {expected}, range total length is {found}")]
    RangeTotalMismatch { expected: u64, found: u64 },

    #[error("Unable to start at {start} while uploaded is {uploaded}")]
    RangeOffsetMismatch { start: u64, uploaded: u64 },

    #[error("Uploaded {actual} bytes while {expected} were expected")]
    OverLongUpload { expected: u64, actual: u64 },

    #[error("Unable to write to file: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to find upload session {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Mime type {mime_type} is not accepted")]
    MimeTypeRejected { mime_type: String },

    #[error("No storage found")]
    NoStorageConfigured,

    #[error("Storage with name {name} does not exist")]
    UnknownStorage { name: String },

    #[error("Storage with name {name} already exists")]
    DuplicateStorage { name: String },

    #[error("Unknown upload processor for upload type {}", .upload_type.as_deref().unwrap_or("none"))]
    UnknownUploadType { upload_type: Option<String> },

    #[error("A processor is already registered for type {upload_type}")]
    DuplicateProcessor { upload_type: String },

    #[error("Object already exists: {path}")]
    ObjectAlreadyExists { path: String },

    #[error("Object not found: {path}")]
    ObjectNotFound { path: String },

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl UploadError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    pub fn missing_header<S: Into<String>>(header: S) -> Self {
        Self::MissingHeader {
            header: header.into(),
        }
    }

    pub fn invalid_header<H: Into<String>, V: Into<String>>(header: H, value: V) -> Self {
        Self::InvalidHeader {
            header: header.into(),
            value: value.into(),
        }
    }

    pub fn unexpected_content_type<S: Into<String>>(expected: S, found: Option<&str>) -> Self {
        Self::UnexpectedContentType {
            expected: expected.into(),
            found: found.map(str::to_string),
        }
    }

    pub fn invalid_content_range<S: Into<String>>(reason: S) -> Self {
        Self::InvalidContentRange {
            reason: reason.into(),
        }
    }

    pub fn invalid_json<S: Into<String>>(reason: S) -> Self {
        Self::InvalidJson {
            reason: reason.into(),
        }
    }

    pub fn session_not_found<S: Into<String>>(session_id: S) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    pub fn unknown_storage<S: Into<String>>(name: S) -> Self {
        Self::UnknownStorage { name: name.into() }
    }

    pub fn object_not_found<S: Into<String>>(path: S) -> Self {
        Self::ObjectNotFound { path: path.into() }
    }

    /// Errors that describe a broken setup rather than a bad request.
    ///
    /// These are expected to surface while wiring storages and processors at
    /// startup; hitting one while serving a request means the process is
    /// misconfigured.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoStorageConfigured | Self::DuplicateStorage { .. } | Self::DuplicateProcessor { .. }
        )
    }

    /// HTTP status the error maps to when rendered for a client
    pub fn status_code(&self) -> u16 {
        if self.is_configuration() {
            return 500;
        }
        match self {
            Self::Backend { .. } | Self::Io { .. } | Self::Serialization { .. } => 500,
            _ => 400,
        }
    }
}
