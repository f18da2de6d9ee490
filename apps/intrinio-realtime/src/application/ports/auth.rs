//! Token exchange port.

use async_trait::async_trait;

/// Errors from the token exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The server rejected the credentials (HTTP 401). Terminal.
    #[error("unauthorized: credentials were rejected")]
    Unauthorized,

    /// The server answered with a non-success status other than 401.
    #[error("token request failed with status {0}")]
    Status(u16),

    /// The request never got a response.
    #[error("token request failed: {0}")]
    Network(String),
}

impl AuthError {
    /// Whether this failure must stop all reconnection attempts.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Exchanges configured credentials for a short-lived socket token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a fresh token.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthorized`] for rejected credentials, any other
    /// variant for failures worth retrying.
    async fn fetch_token(&self) -> Result<String, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unauthorized_is_fatal() {
        assert!(AuthError::Unauthorized.is_fatal());
        assert!(!AuthError::Status(500).is_fatal());
        assert!(!AuthError::Status(403).is_fatal());
        assert!(!AuthError::Network("timeout".to_string()).is_fatal());
    }
}
