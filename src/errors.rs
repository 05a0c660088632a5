//! Error types for Vak-SMS client operations.

use crate::types::NumberId;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[cfg(feature = "tracing")]
use tracing::warn;

/// Error reported by the Vak-SMS service itself.
///
/// The provider signals failures with a truthy `error` field in a JSON object
/// body. The message is kept exactly as the provider sent it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Vak-SMS service error: {message}")]
pub struct VakSmsServiceError {
    /// Error message as sent by the provider.
    pub message: String,
}

impl VakSmsServiceError {
    /// Create a new service error from a provider message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build a service error from the value of an `error` field.
    ///
    /// Strings are taken verbatim, any other JSON value is rendered as JSON.
    pub(crate) fn from_error_field(value: &Value) -> Self {
        let message = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        #[cfg(feature = "tracing")]
        warn!(message = %message, "Vak-SMS service returned error");

        Self { message }
    }
}

/// Broad classification of a [`VakSmsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input or configuration, detected before any request.
    Validation,
    /// The provider could not be reached or answered with something that is not JSON.
    Connectivity,
    /// The provider explicitly reported an error.
    Provider,
    /// A success payload did not fit the expected shape.
    Mapping,
    /// The caller cancelled the operation.
    Cancelled,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Connectivity => "connectivity",
            Self::Provider => "provider",
            Self::Mapping => "mapping",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Main error type for Vak-SMS client operations.
#[derive(Debug, Error)]
pub enum VakSmsError {
    /// Failed to build HTTP client.
    #[error("Failed to build HTTP client: {0}")]
    BuildHttpClient(#[source] reqwest::Error),

    /// Base URL could not be parsed or joined.
    #[error("Invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Error encoding query parameters.
    #[error("Error building Vak-SMS request URL: {0}")]
    BuildRequestUrl(#[source] serde_urlencoded::ser::Error),

    /// The operation requires an API key but none is configured.
    #[error("API key is required for {operation}")]
    MissingApiKey { operation: &'static str },

    /// Wait configuration is not usable.
    #[error("Invalid wait configuration: {reason}")]
    InvalidWaitConfig { reason: String },

    /// Failed to send HTTP request (timeout, DNS, connection refused).
    #[error("Failed to send HTTP request to {url}: {source}")]
    HttpRequest {
        url: Url,
        #[source]
        source: reqwest_middleware::Error,
    },

    /// Failed to read the response body.
    #[error("Failed to read response from {url}: {source}")]
    ReadBody {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    /// Response body is not JSON.
    #[error("Response from {url} is not valid JSON: {source}")]
    MalformedResponse {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    /// Every mirror failed during discovery.
    #[error("No reachable Vak-SMS mirror (tried: {})", format_urls(attempted))]
    NoReachableMirror { attempted: Vec<Url> },

    /// Vak-SMS service error.
    #[error(transparent)]
    Service(#[from] VakSmsServiceError),

    /// Success payload does not match the expected model.
    #[error("Unexpected payload for {operation}: {source}")]
    UnexpectedPayload {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Waiting for an SMS code was cancelled.
    #[error(
        "Waiting for SMS code cancelled after {:.1}s (polled {} times); Number id: {number}",
        elapsed.as_secs_f64(),
        poll_count
    )]
    Cancelled {
        number: NumberId,
        elapsed: Duration,
        poll_count: u32,
    },
}

pub type Result<T> = std::result::Result<T, VakSmsError>;

impl VakSmsError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VakSmsError::BuildHttpClient(_)
            | VakSmsError::InvalidBaseUrl { .. }
            | VakSmsError::BuildRequestUrl(_)
            | VakSmsError::MissingApiKey { .. }
            | VakSmsError::InvalidWaitConfig { .. } => ErrorKind::Validation,
            VakSmsError::HttpRequest { .. }
            | VakSmsError::ReadBody { .. }
            | VakSmsError::MalformedResponse { .. }
            | VakSmsError::NoReachableMirror { .. } => ErrorKind::Connectivity,
            VakSmsError::Service(_) => ErrorKind::Provider,
            VakSmsError::UnexpectedPayload { .. } => ErrorKind::Mapping,
            VakSmsError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the provider could not be reached.
    ///
    /// During mirror discovery this is what moves on to the next candidate.
    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    /// Returns true if the provider explicitly reported an error.
    pub fn is_provider(&self) -> bool {
        self.kind() == ErrorKind::Provider
    }

    /// Returns true if the error was detected locally before any request.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Provider error message, if this is a provider error.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            VakSmsError::Service(e) => Some(e.message.as_str()),
            _ => None,
        }
    }
}

fn format_urls(urls: &[Url]) -> String {
    urls.iter()
        .map(Url::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
