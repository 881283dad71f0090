//! Error types for identity provider calls.

/// Errors returned by an [`IdentityProvider`](super::IdentityProvider).
#[derive(Debug, thiserror::Error)]
pub enum IdpError {
    /// The provider rejected the call with a typed error.
    #[error("{code}: {message}")]
    Service {
        /// Provider error code, e.g. `UsernameExistsException`.
        code: String,
        /// Human-readable message from the provider.
        message: String,
        /// HTTP status of the provider response.
        status: u16,
    },

    /// The request could not be sent or the response could not be read.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider answered with a body that could not be decoded.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The request body could not be encoded.
    #[error("Failed to encode request: {0}")]
    Encode(String),

    /// No signing credentials could be resolved.
    #[error("Failed to resolve AWS credentials: {0}")]
    Credentials(String),
}

impl IdpError {
    /// Creates a `Service` error.
    #[must_use]
    pub fn service(code: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    /// Returns the provider error code, if the provider sent one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if the username (or an alias) is already taken.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.code(),
            Some("UsernameExistsException" | "AliasExistsException")
        )
    }

    /// Returns `true` if the provider refused the credentials.
    #[must_use]
    pub fn is_not_authorized(&self) -> bool {
        matches!(self.code(), Some("NotAuthorizedException"))
    }

    /// Returns `true` if the provider throttled the call.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(
            self.code(),
            Some("TooManyRequestsException" | "LimitExceededException")
        )
    }

    /// Returns `true` if the provider rejected the input of the call.
    ///
    /// Throttling, conflicts and authorization failures are excluded; they
    /// have their own predicates.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Service { status, .. } => {
                (400..500).contains(status)
                    && !self.is_conflict()
                    && !self.is_not_authorized()
                    && !self.is_throttled()
            }
            _ => false,
        }
    }

    /// Returns `true` if the failure is on the provider or transport side.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        match self {
            Self::Service { status, .. } => *status >= 500,
            Self::Network(_) | Self::InvalidResponse(_) => true,
            Self::Encode(_) | Self::Credentials(_) => false,
        }
    }
}

impl From<reqwest::Error> for IdpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
