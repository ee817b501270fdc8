//! Error types for CFM-RS

use thiserror::Error;

/// Result type alias for CFM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CFM-RS
///
/// Frame-level rejections of received PDUs are not errors; they are reported
/// by the codec as a `Rejection` and only bump a counter.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (configuration files, frame sinks)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration value out of range or inconsistent
    #[error("Invalid configuration '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Frame injection or offload resources exhausted
    #[error("Out of resources: {0}")]
    OutOfResources(String),

    /// Frame injection scheduler failure
    #[error("Injection scheduler error: {0}")]
    Scheduler(String),

    /// Hardware offload failure
    #[error("Offload error: {0}")]
    Offload(String),

    /// The engine task is gone
    #[error("Engine shut down: {0}")]
    Shutdown(String),
}

impl Error {
    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Error::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Error::NotFound(what.into())
    }

    /// Create a scheduler error
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Error::Scheduler(msg.into())
    }

    /// Create an offload error
    pub fn offload<S: Into<String>>(msg: S) -> Self {
        Error::Offload(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = Error::invalid_config("alarm_level", "must be in range 1..=6");
        assert_eq!(
            err.to_string(),
            "Invalid configuration 'alarm_level': must be in range 1..=6"
        );
    }

    #[test]
    fn test_internal_display() {
        let err = Error::internal("length mismatch");
        assert_eq!(err.to_string(), "Internal error: length mismatch");
    }
}
