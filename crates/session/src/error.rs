//! Session error types.

use stockflow_core::settlement::SettlementError;
use stockflow_gateway::GatewayError;
use stockflow_shared::AppError;
use thiserror::Error;

/// Errors raised while driving a settlement session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The settlement itself refused the action.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// A read or valuation request failed.
    #[error("Service request failed: {0}")]
    Service(GatewayError),

    /// The settlement submission failed. Nothing was applied.
    #[error("Settlement submission failed: {0}")]
    Submission(GatewayError),
}

impl SessionError {
    /// Returns the error code for logs and API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Settlement(e) => e.error_code(),
            Self::Service(e) | Self::Submission(e) => e.error_code(),
        }
    }

    /// Returns true if repeating the same action may succeed.
    ///
    /// A submission lost in transit is retryable: the resubmission carries
    /// the same request ID and is not applied twice.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Settlement(_) => false,
            Self::Service(e) | Self::Submission(e) => e.is_transient(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Settlement(e) => match e {
                SettlementError::InvalidState { .. }
                | SettlementError::UnknownRow(_)
                | SettlementError::MismatchedCalculation { .. } => Self::Internal(e.to_string()),
                _ => Self::Validation(e.to_string()),
            },
            SessionError::Service(e) => match e {
                GatewayError::NotFound(m) => Self::NotFound(m),
                GatewayError::Unauthorized(m) => Self::Unauthorized(m),
                GatewayError::Conflict(m) => Self::StaleState(m),
                GatewayError::Rejected(m) => Self::Validation(m),
                GatewayError::Configuration(m) => Self::Configuration(m),
                GatewayError::InvalidResponse(m) => Self::Internal(m),
                GatewayError::Network(m) | GatewayError::Server { message: m, .. } => {
                    Self::TransientService(m)
                }
            },
            SessionError::Submission(e) => match e {
                GatewayError::Conflict(m) => Self::StaleState(m),
                GatewayError::Unauthorized(m) => Self::Unauthorized(m),
                GatewayError::Configuration(m) => Self::Configuration(m),
                e if e.is_transient() => Self::TransientService(e.message().to_string()),
                e => Self::FatalSubmission(e.message().to_string()),
            },
        }
    }
}
