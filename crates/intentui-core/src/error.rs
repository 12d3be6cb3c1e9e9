//! Error types for the IntentUI core
//!
//! Internal fallible operations return `Result<T, Error>`.
//! The pipeline boundary never surfaces these to the renderer: every
//! failure there is converted into the error-card response instead.

/// IntentUI error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Generator text is not JSON, even after cleanup
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Value does not match the component schema and cannot be repaired
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Language model, retrieval or image collaborator failed
    #[error("Upstream error - {service}: {message}")]
    UpstreamError { service: String, message: String },

    /// An async call exceeded its time budget
    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Invalid or missing configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// User-state persistence failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Rendering failure for a whole tree
    #[error("Render error: {0}")]
    RenderError(String),
}

impl Error {
    /// Shorthand for an upstream failure of a named service
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::UpstreamError {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err.to_string())
    }
}

/// Result type alias for IntentUI operations
pub type Result<T> = std::result::Result<T, Error>;
