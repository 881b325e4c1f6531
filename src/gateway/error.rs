//! Error types for gateway HTTP calls.

use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur while talking to the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request never produced an HTTP response (connect, TLS, timeout).
    #[error("request failed: {message}")]
    Request { message: String },

    /// The gateway answered with a non-success status.
    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("invalid response body: {message}")]
    Decode { message: String },

    /// The client could not be built for the given gateway URL.
    #[error("invalid gateway configuration: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    /// Create a request error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request { message: message.into() }
    }

    /// Create an API error from a status code and raw response body.
    ///
    /// Structured `{"error": ...}` or `{"message": ...}` bodies are reduced to
    /// their message; anything else is kept verbatim.
    pub fn api(status: u16, body: &str) -> Self {
        Self::Api { status, message: extract_error_message(body) }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode { message: message.into() }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether the gateway reported the requested item as missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                *status == 404 || message.to_ascii_lowercase().contains("not found")
            }
            _ => false,
        }
    }

    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::decode(error.to_string())
        } else {
            Self::request(error.to_string())
        }
    }
}

fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed)
    {
        for key in ["error", "message"] {
            if let Some(serde_json::Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    if trimmed.is_empty() {
        "<empty body>".to_string()
    } else {
        trimmed.to_string()
    }
}
