use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dog_upload::{FormErrors, UploadError};
use serde_json::{json, Value};

/// A failed upload rendered as a Feathers-style error body
#[derive(Debug)]
pub struct UploadHttpError {
    pub code: u16,
    pub message: String,
    pub errors: Option<Value>,
}

impl UploadHttpError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Rejected form data; the message is the first schema error when there is one
    pub fn from_form_errors(errors: FormErrors) -> Self {
        let value = errors.into_value();
        let message = value["_schema"][0]
            .as_str()
            .unwrap_or("Invalid form data")
            .to_string();
        Self::new(400, message).with_errors(value)
    }

    pub fn name(&self) -> &'static str {
        match self.code {
            400 => "BadRequest",
            404 => "NotFound",
            413 => "PayloadTooLarge",
            _ => "GeneralError",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self.code {
            400 => "bad-request",
            404 => "not-found",
            413 => "payload-too-large",
            _ => "general-error",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code,
            "className": self.class_name(),
        });
        if let Some(errors) = &self.errors {
            base["errors"] = errors.clone();
        }
        base
    }
}

impl From<UploadError> for UploadHttpError {
    fn from(error: UploadError) -> Self {
        let code = error.status_code();
        // Backend details stay in the logs
        let message = if code >= 500 {
            "Upload failed".to_string()
        } else {
            error.to_string()
        };
        Self::new(code, message)
    }
}

impl IntoResponse for UploadHttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
