//! # Error Types
//!
//! Error taxonomy for configuration, authentication and secret retrieval.

use std::fmt;

/// Custom result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Which piece of a mount request failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStage {
    /// The `attributes` JSON object
    Attributes,
    /// The node-publish `secrets` JSON object
    Secrets,
    /// The `objects` YAML document nested inside the attributes
    Objects,
    /// The file permission string
    Permission,
    /// The access type attribute or environment value
    AccessType,
}

impl ParseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStage::Attributes => "attributes",
            ParseStage::Secrets => "secrets",
            ParseStage::Objects => "objects",
            ParseStage::Permission => "permission",
            ParseStage::AccessType => "access_type",
        }
    }
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the provider
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// Malformed structured input in the mount request
    #[error("Failed to parse {stage}: {message}")]
    Parse { stage: ParseStage, message: String },

    /// Structurally valid but incomplete configuration
    #[error("Invalid configuration: {message}")]
    Validation { message: String },

    /// No credential mechanism succeeded
    #[error(
        "Failed to detect access type for '{access_id}' against {gateway_url}: {}",
        .attempts.join("; ")
    )]
    Detection { access_id: String, gateway_url: String, attempts: Vec<String> },

    /// A specific mechanism failed to prove identity
    #[error("Authentication with {access_type} failed against {gateway_url}: {message}")]
    Authentication { access_type: String, gateway_url: String, message: String },

    /// Universal Identity token rotation failed
    #[error("Failed to rotate UID token against {gateway_url}: {message}")]
    Rotation { gateway_url: String, message: String },

    /// Item metadata could not be retrieved
    #[error("Can't describe item '{item}': {detail}")]
    Describe { item: String, detail: String, not_found: bool },

    /// Item value could not be extracted from a gateway response
    #[error("Can't get value of '{item}': {message}")]
    Fetch { item: String, message: String },

    /// Item type has no retrieval strategy
    #[error("Unsupported item type {item_type} for secret {item}")]
    UnsupportedType { item_type: String, item: String },

    /// Transport or API failure talking to the gateway
    #[error("Gateway {operation} call to {gateway_url} failed: {message}")]
    Gateway { operation: String, gateway_url: String, message: String },

    /// gRPC or listener errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Create a parse error for the given stage
    pub fn parse<S: Into<String>>(stage: ParseStage, message: S) -> Self {
        Self::Parse { stage, message: message.into() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create an authentication error
    pub fn authentication<A, G, M>(access_type: A, gateway_url: G, message: M) -> Self
    where
        A: Into<String>,
        G: Into<String>,
        M: Into<String>,
    {
        Self::Authentication {
            access_type: access_type.into(),
            gateway_url: gateway_url.into(),
            message: message.into(),
        }
    }

    /// Create a rotation error
    pub fn rotation<G: Into<String>, M: Into<String>>(gateway_url: G, message: M) -> Self {
        Self::Rotation { gateway_url: gateway_url.into(), message: message.into() }
    }

    /// Create a describe error
    pub fn describe<I: Into<String>, D: Into<String>>(item: I, detail: D) -> Self {
        Self::Describe { item: item.into(), detail: detail.into(), not_found: false }
    }

    /// Create a describe error for an item the gateway reports as missing
    pub fn describe_not_found<I: Into<String>, D: Into<String>>(item: I, detail: D) -> Self {
        Self::Describe { item: item.into(), detail: detail.into(), not_found: true }
    }

    /// Create a fetch error
    pub fn fetch<I: Into<String>, M: Into<String>>(item: I, message: M) -> Self {
        Self::Fetch { item: item.into(), message: message.into() }
    }

    /// Create an unsupported type error
    pub fn unsupported_type<T: Into<String>, I: Into<String>>(item_type: T, item: I) -> Self {
        Self::UnsupportedType { item_type: item_type.into(), item: item.into() }
    }

    /// Create a gateway error
    pub fn gateway<O, G, M>(operation: O, gateway_url: G, message: M) -> Self
    where
        O: Into<String>,
        G: Into<String>,
        M: Into<String>,
    {
        Self::Gateway {
            operation: operation.into(),
            gateway_url: gateway_url.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error came from proving identity to the gateway
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ProviderError::Detection { .. }
                | ProviderError::Authentication { .. }
                | ProviderError::Rotation { .. }
        )
    }

    /// The gRPC status code a mount failure is reported with
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            ProviderError::Parse { .. } | ProviderError::Validation { .. } => {
                tonic::Code::InvalidArgument
            }
            ProviderError::Detection { .. }
            | ProviderError::Authentication { .. }
            | ProviderError::Rotation { .. } => tonic::Code::Unauthenticated,
            ProviderError::Describe { not_found: true, .. } => tonic::Code::NotFound,
            ProviderError::UnsupportedType { .. } => tonic::Code::FailedPrecondition,
            ProviderError::Gateway { .. } | ProviderError::Transport(_) => {
                tonic::Code::Unavailable
            }
            ProviderError::Describe { .. }
            | ProviderError::Fetch { .. }
            | ProviderError::Io { .. }
            | ProviderError::Internal(_) => tonic::Code::Internal,
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(error: ProviderError) -> Self {
        tonic::Status::new(error.grpc_code(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let error = ProviderError::parse(ParseStage::Permission, "invalid digit found in string");
        assert!(matches!(error, ProviderError::Parse { stage: ParseStage::Permission, .. }));
        assert_eq!(error.to_string(), "Failed to parse permission: invalid digit found in string");
    }

    #[test]
    fn test_detection_error_lists_attempts() {
        let error = ProviderError::Detection {
            access_id: "p-123".to_string(),
            gateway_url: "https://api.akeyless.io".to_string(),
            attempts: vec!["access_key: denied".to_string(), "aws_iam: no metadata".to_string()],
        };
        let message = error.to_string();
        assert!(message.contains("p-123"));
        assert!(message.contains("access_key: denied; aws_iam: no metadata"));
    }

    #[test]
    fn test_grpc_codes() {
        assert_eq!(ProviderError::validation("x").grpc_code(), tonic::Code::InvalidArgument);
        assert_eq!(
            ProviderError::authentication("access_key", "u", "x").grpc_code(),
            tonic::Code::Unauthenticated
        );
        assert_eq!(ProviderError::describe_not_found("/a", "x").grpc_code(), tonic::Code::NotFound);
        assert_eq!(ProviderError::describe("/a", "x").grpc_code(), tonic::Code::Internal);
        assert_eq!(
            ProviderError::unsupported_type("UNKNOWN", "/a").grpc_code(),
            tonic::Code::FailedPrecondition
        );
        assert_eq!(ProviderError::gateway("auth", "u", "x").grpc_code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_auth_failures() {
        assert!(ProviderError::rotation("u", "empty token").is_auth_failure());
        assert!(!ProviderError::fetch("/a", "missing").is_auth_failure());
    }

    #[test]
    fn test_status_conversion() {
        let status: tonic::Status = ProviderError::unsupported_type("UNKNOWN", "/foo").into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
        assert_eq!(status.message(), "Unsupported item type UNKNOWN for secret /foo");
    }

    #[test]
    fn test_io_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "socket missing");
        let error: ProviderError = io_error.into();
        assert!(matches!(error, ProviderError::Io { .. }));
    }
}
