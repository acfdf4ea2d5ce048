//! Error types for the valve switch
//!
//! One crate-wide error enum with string-message constructors, `#[from]`
//! conversions for the transport and parsing crates, and a few classification
//! helpers used by the dispatcher when deciding how loudly to log.

use thiserror::Error;

/// Result type alias for valve switch operations
pub type Result<T> = std::result::Result<T, ValveSwitchError>;

/// Error types for valve switch operations
#[derive(Error, Debug)]
pub enum ValveSwitchError {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication errors (rejected auth token / client auth)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration source errors (file / environment layering)
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// Actuator command errors
    #[error("Device control error: {0}")]
    DeviceControl(String),

    /// Push payload could not be decoded into a structured record
    #[error("Decode error: {0}")]
    Decode(String),

    /// Payload decoded, but a field had an unexpected shape
    #[error("Unexpected payload shape: {0}")]
    Extraction(String),

    /// The actuator label did not resolve to any known device
    #[error("Actuator '{label}' not found among {} known devices", .available.len())]
    ActuatorNotFound {
        label: String,
        available: Vec<String>,
    },

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// External service errors (non-success HTTP status from the cloud)
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Medium severity - warning condition
    Warning,
    /// High severity - error condition
    Error,
    /// Critical severity - immediate attention required
    Critical,
}

impl ValveSwitchError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a device control error
    pub fn device_control<S: Into<String>>(msg: S) -> Self {
        Self::DeviceControl(msg.into())
    }

    /// Create a decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an extraction error
    pub fn extraction<S: Into<String>>(msg: S) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a websocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Self::WebSocket(msg.into())
    }

    /// Create an external service error
    pub fn external_service_error<S: Into<String>>(msg: S) -> Self {
        Self::ExternalService(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Generic(anyhow::anyhow!(msg.into()))
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ValveSwitchError::Authentication(_) | ValveSwitchError::ActuatorNotFound { .. } => {
                ErrorSeverity::Critical
            }
            ValveSwitchError::Connection(_)
            | ValveSwitchError::Timeout(_)
            | ValveSwitchError::Http(_)
            | ValveSwitchError::WebSocket(_) => ErrorSeverity::Warning,
            ValveSwitchError::Decode(_) | ValveSwitchError::Extraction(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ValveSwitchError::Connection(_)
                | ValveSwitchError::Timeout(_)
                | ValveSwitchError::Http(_)
                | ValveSwitchError::WebSocket(_)
                | ValveSwitchError::ExternalService(_)
        )
    }

    /// Check if error indicates authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ValveSwitchError::Authentication(_))
    }

    /// Short machine-readable error type, used as a structured log field
    pub fn error_type(&self) -> &'static str {
        match self {
            ValveSwitchError::Connection(_) => "connection_error",
            ValveSwitchError::Authentication(_) => "authentication_error",
            ValveSwitchError::Http(_) => "http_error",
            ValveSwitchError::Json(_) => "json_error",
            ValveSwitchError::Config(_) | ValveSwitchError::ConfigSource(_) => "config_error",
            ValveSwitchError::DeviceControl(_) => "device_control_error",
            ValveSwitchError::Decode(_) => "decode_error",
            ValveSwitchError::Extraction(_) => "extraction_error",
            ValveSwitchError::ActuatorNotFound { .. } => "actuator_not_found",
            ValveSwitchError::WebSocket(_) => "websocket_error",
            ValveSwitchError::ExternalService(_) => "external_service_error",
            ValveSwitchError::Timeout(_) => "timeout_error",
            ValveSwitchError::Io(_) => "io_error",
            ValveSwitchError::Generic(_) => "generic_error",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ValveSwitchError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ValveSwitchError::WebSocket(err.to_string())
    }
}

impl From<url::ParseError> for ValveSwitchError {
    fn from(err: url::ParseError) -> Self {
        ValveSwitchError::Config(format!("Invalid URL: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actuator_not_found_message_counts_devices() {
        let err = ValveSwitchError::ActuatorNotFound {
            label: "Plug".to_string(),
            available: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Actuator 'Plug' not found among 2 known devices"
        );
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_classification() {
        assert!(ValveSwitchError::connection("reset").is_retryable());
        assert!(!ValveSwitchError::config("bad").is_retryable());
        assert!(ValveSwitchError::authentication("401").is_auth_error());
        assert_eq!(ValveSwitchError::decode("x").error_type(), "decode_error");
    }
}
