use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use validator::Validate;

/// Validation messages keyed by field path, with `_schema` for form-level messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormErrors {
    map: Map<String, Value>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form-level error from a single message
    pub fn schema(msg: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push_schema(msg);
        errors
    }

    pub fn push_schema(&mut self, msg: impl Into<String>) {
        self.push_field("_schema", msg);
    }

    pub fn push_field(&mut self, field: &str, msg: impl Into<String>) {
        let msg = Value::String(msg.into());
        match self.map.get_mut(field) {
            Some(Value::Array(arr)) => arr.push(msg),
            _ => {
                self.map.insert(field.to_string(), Value::Array(vec![msg]));
            }
        }
    }

    /// Messages recorded for a field
    pub fn field(&self, field: &str) -> Vec<&str> {
        match self.map.get(field) {
            Some(Value::Array(arr)) => arr.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }
}

/// Binds client-supplied metadata to a form and validates it.
///
/// On success returns the normalized form data that is stored with the upload
/// and echoed in the final response.
pub trait FormBinder: Send + Sync {
    fn bind(&self, data: &Value) -> Result<Value, FormErrors>;
}

/// `FormBinder` over a `serde` + `validator` type
pub struct ValidatorForm<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValidatorForm<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ValidatorForm<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FormBinder for ValidatorForm<T>
where
    T: DeserializeOwned + Serialize + Validate,
{
    fn bind(&self, data: &Value) -> Result<Value, FormErrors> {
        let parsed: T =
            serde_json::from_value(data.clone()).map_err(|e| FormErrors::schema(e.to_string()))?;

        if let Err(errs) = parsed.validate() {
            let mut out = FormErrors::new();
            push_validation_errors(&mut out, "", &errs);
            return Err(out);
        }

        serde_json::to_value(&parsed).map_err(|e| FormErrors::schema(e.to_string()))
    }
}

fn friendly_message(code: &str) -> Option<&'static str> {
    match code {
        "required" => Some("is required"),
        "email" => Some("must be a valid email"),
        "length" => Some("has invalid length"),
        "range" => Some("is out of range"),
        "url" => Some("must be a valid URL"),
        _ => None,
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn push_validation_errors(out: &mut FormErrors, prefix: &str, errs: &validator::ValidationErrors) {
    for (field, kind) in errs.errors() {
        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                let key = join_path(prefix, field);
                for e in field_errors {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .or_else(|| friendly_message(&e.code).map(|m| m.to_string()))
                        .unwrap_or_else(|| e.code.to_string());
                    out.push_field(&key, msg);
                }
            }
            validator::ValidationErrorsKind::Struct(struct_errs) => {
                let next = join_path(prefix, field);
                push_validation_errors(out, &next, struct_errs.as_ref());
            }
            validator::ValidationErrorsKind::List(list_errs) => {
                let base = join_path(prefix, field);
                for (idx, nested) in list_errs {
                    push_validation_errors(out, &format!("{base}[{idx}]"), nested.as_ref());
                }
            }
        }
    }
}
