use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::{FormErrors, RequestHead, UploadConfig, UploadError, UploadedFile};

/// Per-request state threaded through a processor and the storage layer
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub request: RequestHead,
    pub config: Arc<UploadConfig>,

    /// Explicit target storage; the voter falls back to the default storage when unset
    pub storage_name: Option<String>,

    /// Content type the client declared for the file being written
    pub content_type: Option<String>,

    /// File already written for this upload; new writes reuse its path
    pub file: Option<UploadedFile>,

    /// True while the file still lives in temp storage
    pub unfinished: bool,
}

impl UploadContext {
    pub fn new(request: RequestHead, config: Arc<UploadConfig>) -> Self {
        Self {
            request,
            config,
            storage_name: None,
            content_type: None,
            file: None,
            unfinished: false,
        }
    }

    pub fn with_storage_name<S: Into<String>>(mut self, name: S) -> Self {
        self.storage_name = Some(name.into());
        self
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn unfinished(mut self, unfinished: bool) -> Self {
        self.unfinished = unfinished;
        self
    }
}

/// Response produced by the upload layer, independent of any HTTP framework
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl UploadResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(status)
        }
    }

    /// Set a header; invalid names or values are dropped
    pub fn with_header<V: AsRef<str>>(mut self, name: &str, value: V) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Outcome of an upload request
#[derive(Debug, Default)]
pub struct UploadResult {
    /// Response to emit as is (session start, progress, status query)
    pub response: Option<UploadResponse>,

    /// Stored file on completion
    pub file: Option<UploadedFile>,

    /// Bound form data, echoed with the file attributes
    pub form_data: Option<Value>,

    pub form_errors: Option<FormErrors>,

    pub error: Option<UploadError>,
}

impl UploadResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_response(response: UploadResponse) -> Self {
        Self {
            response: Some(response),
            ..Self::default()
        }
    }

    pub fn from_form_errors(errors: FormErrors) -> Self {
        Self {
            form_errors: Some(errors),
            ..Self::default()
        }
    }

    /// Capture an error, annotating the form errors with its message
    pub fn from_error(error: UploadError) -> Self {
        Self::default().with_error(error)
    }

    pub fn with_error(mut self, error: UploadError) -> Self {
        self.form_errors
            .get_or_insert_with(FormErrors::new)
            .push_schema(error.to_string());
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.form_errors.is_none()
    }

    /// Render the result.
    ///
    /// Errors and form errors win over an explicit response; a stored file is
    /// rendered as its attributes overlaid with the submitted form fields.
    pub fn into_response(self) -> UploadResponse {
        if let Some(error) = &self.error {
            let errors = self
                .form_errors
                .unwrap_or_else(|| FormErrors::schema(error.to_string()));
            return UploadResponse::json(error.status_code(), json!({ "errors": errors.into_value() }));
        }

        if let Some(errors) = self.form_errors {
            return UploadResponse::json(400, json!({ "errors": errors.into_value() }));
        }

        if let Some(response) = self.response {
            return response;
        }

        match self.file {
            Some(file) => {
                let mut body = match file.attributes() {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                if let Some(Value::Object(form)) = self.form_data {
                    body.extend(form);
                }
                UploadResponse::json(200, Value::Object(body))
            }
            None => UploadResponse::new(204),
        }
    }
}
