//! Application-wide error types.
//!
//! These map one-to-one onto the ways a settlement can fail from an
//! operator's point of view. Crate-level errors convert into `AppError`
//! at the boundary where they are shown to a user.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Client-side validation failed; nothing was sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The service rejected the submission because its data changed since
    /// the form was opened.
    #[error("Stale data: {0}")]
    StaleState(String),

    /// A read or calculation request failed and may be retried.
    #[error("Service unavailable: {0}")]
    TransientService(String),

    /// The service failed the settlement submission unexpectedly.
    #[error("Settlement failed: {0}")]
    FatalSubmission(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication failed or credentials are missing.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error code for logs and API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::StaleState(_) => "STALE_STATE",
            Self::TransientService(_) => "TRANSIENT_SERVICE_ERROR",
            Self::FatalSubmission(_) => "FATAL_SUBMISSION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if repeating the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientService(_))
    }

    /// Returns true if the in-progress form must be kept for the user to
    /// correct and resubmit.
    #[must_use]
    pub const fn preserves_form(&self) -> bool {
        !matches!(self, Self::Configuration(_) | Self::Internal(_))
    }

    /// Returns the message to show an operator.
    ///
    /// Stale data gets a fixed instruction; server rejections are shown
    /// verbatim.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::StaleState(_) => {
                "Data changed since this settlement was opened, please refresh and try again."
                    .to_string()
            }
            Self::Validation(msg)
            | Self::TransientService(msg)
            | Self::FatalSubmission(msg)
            | Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Configuration(msg)
            | Self::Internal(msg) => msg.clone(),
        }
    }
}
