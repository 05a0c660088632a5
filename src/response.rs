//! Response classification for the Vak-SMS API.

use crate::errors::{Result, VakSmsError, VakSmsServiceError};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Classified Vak-SMS response body.
#[derive(Debug)]
pub enum VakSmsResponse {
    Success(Value),
    Error(VakSmsServiceError),
}

impl VakSmsResponse {
    /// Classify a parsed JSON body.
    ///
    /// An object with a truthy `error` field is a provider error. Any other
    /// object, a list (multi-service purchases answer with a bare list), or a
    /// scalar is a success payload.
    pub fn from_value(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if let Some(error) = map.get("error").filter(|e| is_truthy(e)) {
                return Self::Error(VakSmsServiceError::from_error_field(error));
            }
        }
        Self::Success(value)
    }

    /// Convert response into a Result for ergonomic error handling.
    pub fn into_result(self) -> std::result::Result<Value, VakSmsServiceError> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Error(e) => Err(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// JSON truthiness: null, false, zero and empty containers are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Map a success payload onto a typed model.
pub(crate) fn decode<T: DeserializeOwned>(operation: &'static str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|source| VakSmsError::UnexpectedPayload { operation, source })
}

/// Mapping error for a payload whose overall shape is wrong.
pub(crate) fn unexpected(operation: &'static str, reason: &str) -> VakSmsError {
    VakSmsError::UnexpectedPayload {
        operation,
        source: <serde_json::Error as serde::de::Error>::custom(reason),
    }
}
