//! Gateway error types.

use thiserror::Error;

/// Errors returned by a back-office service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The request did not reach the service or the response was lost.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were missing or refused.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The addressed resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service's data changed since the caller's snapshot.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The service refused the request as invalid.
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The service failed.
    #[error("Service error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the service.
        message: String,
    },

    /// The response could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The client could not be set up.
    #[error("Client configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Returns the error code for logs and API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Rejected(_) => "REJECTED",
            Self::Server { .. } => "SERVER_ERROR",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
            Self::Configuration(_) => "CLIENT_CONFIGURATION_ERROR",
        }
    }

    /// Returns true if repeating the request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Returns true if the service reported that the caller's snapshot is
    /// out of date.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// The service's message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Network(m)
            | Self::Unauthorized(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Rejected(m)
            | Self::InvalidResponse(m)
            | Self::Configuration(m)
            | Self::Server { message: m, .. } => m,
        }
    }

    /// Maps an HTTP error status and message.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            400..=499 => Self::Rejected(message),
            _ => Self::Server { status, message },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
