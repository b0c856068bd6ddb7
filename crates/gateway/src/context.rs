//! Per-request caller context.

use std::fmt;

/// Credentials and identity passed explicitly into every service call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    access_token: Option<String>,
    operator: Option<String>,
}

impl RequestContext {
    /// A context without credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A context carrying a bearer token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            operator: None,
        }
    }

    /// Attaches the operator's name, used only in logs.
    #[must_use]
    pub fn for_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// The access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// The operator's name, if any.
    #[must_use]
    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.access_token.as_ref().map(|t| format!("Bearer {t}"))
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("operator", &self.operator)
            .finish()
    }
}
