//! Error types and handling for Pricerelay
//!
//! Recoverable faults (upstream outages, bad payloads, publish failures) and
//! startup faults (configuration, site resolution) share one error type so the
//! relay can log them uniformly. "No data for this period" is not an error and
//! is represented with `Option` by the callers instead.

use thiserror::Error;

/// Result type alias for Pricerelay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for Pricerelay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Network or HTTP failure talking to the pricing API
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Pricing API answered with a payload we cannot use
    #[error("Upstream data error: {message}")]
    UpstreamData { message: String },

    /// No usable site could be resolved at startup
    #[error("Site resolution failed: {message}")]
    SiteResolution { message: String },

    /// Outbound message channel rejected or dropped a publish
    #[error("Publish error: {topic} - {message}")]
    Publish { topic: String, message: String },
}

impl RelayError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        RelayError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        RelayError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        RelayError::Io {
            message: message.into(),
        }
    }

    /// Create a new upstream availability error
    pub fn upstream_unavailable<S: Into<String>>(message: S) -> Self {
        RelayError::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Create a new upstream payload error
    pub fn upstream_data<S: Into<String>>(message: S) -> Self {
        RelayError::UpstreamData {
            message: message.into(),
        }
    }

    /// Create a new site resolution error
    pub fn site_resolution<S: Into<String>>(message: S) -> Self {
        RelayError::SiteResolution {
            message: message.into(),
        }
    }

    /// Create a new publish error
    pub fn publish<S: Into<String>>(topic: S, message: S) -> Self {
        RelayError::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Whether the relay loop may carry on after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelayError::UpstreamUnavailable { .. }
                | RelayError::UpstreamData { .. }
                | RelayError::Publish { .. }
        )
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for RelayError {
    fn from(err: serde_yaml::Error) -> Self {
        RelayError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::upstream_data(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RelayError::upstream_data(err.to_string())
        } else {
            RelayError::upstream_unavailable(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for RelayError {
    fn from(err: chrono::ParseError) -> Self {
        RelayError::upstream_data(format!("invalid timestamp: {}", err))
    }
}
