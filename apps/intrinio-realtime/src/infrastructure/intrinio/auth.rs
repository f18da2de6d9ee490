//! Intrinio Token Exchange
//!
//! Intrinio sockets are opened with a short-lived token obtained from the
//! provider's `/auth` endpoint.
//!
//! # Authentication Flow
//!
//! 1. `GET https://<host>/auth?api_key=<key>` (or HTTP Basic with
//!    username/password) with a `Client-Information` header
//! 2. `200` → the response body is the token
//! 3. `401` → credentials rejected; the client stops retrying
//! 4. Anything else → retried by the connection supervisor

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::application::ports::{AuthError, TokenProvider};

use super::CLIENT_INFORMATION;

/// Default timeout for the token request.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Credentials
// =============================================================================

/// Intrinio credentials.
///
/// The `Debug` implementation redacts secrets for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// API key, sent as the `api_key` query parameter.
    ApiKey(String),
    /// Username and password, sent as HTTP Basic auth.
    UserPass {
        /// Account username.
        username: String,
        /// Account password.
        password: String,
    },
}

impl Credentials {
    /// Credentials from an API key.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    /// Credentials from a username and password.
    #[must_use]
    pub fn user_pass(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UserPass {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether any required part is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::ApiKey(key) => key.trim().is_empty(),
            Self::UserPass { username, password } => username.is_empty() || password.is_empty(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(key) => f
                .debug_tuple("ApiKey")
                .field(&redact(key))
                .finish(),
            Self::UserPass { username, .. } => f
                .debug_struct("UserPass")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}***")
}

// =============================================================================
// HTTP Token Provider
// =============================================================================

/// Fetches socket tokens over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    client: Client,
    auth_url: String,
    credentials: Credentials,
}

impl HttpTokenProvider {
    /// Create a provider for the given auth endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the HTTP client cannot be built.
    pub fn new(
        auth_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        Ok(Self {
            client,
            auth_url: auth_url.into(),
            credentials,
        })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let request = self
            .client
            .get(&self.auth_url)
            .header("Client-Information", CLIENT_INFORMATION);

        let request = match &self.credentials {
            Credentials::ApiKey(key) => request.query(&[("api_key", key)]),
            Credentials::UserPass { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let token = response
                    .text()
                    .await
                    .map_err(|e| AuthError::Network(e.to_string()))?;
                tracing::debug!("Received socket token");
                Ok(token.trim().to_string())
            }
            StatusCode::UNAUTHORIZED => {
                tracing::error!("Token request rejected: unauthorized");
                Err(AuthError::Unauthorized)
            }
            status => {
                tracing::warn!(status = status.as_u16(), "Token request failed");
                Err(AuthError::Status(status.as_u16()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, credentials: Credentials) -> HttpTokenProvider {
        HttpTokenProvider::new(
            format!("{}/auth", server.uri()),
            credentials,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn debug_redacts_secrets() {
        let key = format!("{:?}", Credentials::api_key("abcdefgh"));
        assert_eq!(key, "ApiKey(\"abcd***\")");

        let pass = format!("{:?}", Credentials::user_pass("user", "hunter2"));
        assert!(pass.contains("user"));
        assert!(!pass.contains("hunter2"));
    }

    #[test]
    fn empty_credentials_detected() {
        assert!(Credentials::api_key(" ").is_empty());
        assert!(Credentials::user_pass("user", "").is_empty());
        assert!(!Credentials::api_key("key").is_empty());
    }

    #[tokio::test]
    async fn api_key_is_sent_as_query_parameter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth"))
            .and(query_param("api_key", "secret-key"))
            .and(header("Client-Information", CLIENT_INFORMATION))
            .respond_with(ResponseTemplate::new(200).set_body_string("token-123"))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider(&server, Credentials::api_key("secret-key"))
            .fetch_token()
            .await
            .unwrap();
        assert_eq!(token, "token-123");
    }

    #[tokio::test]
    async fn user_pass_is_sent_as_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string("token-456\n"))
            .mount(&server)
            .await;

        let token = provider(&server, Credentials::user_pass("user", "pass"))
            .fetch_token()
            .await
            .unwrap();
        assert_eq!(token, "token-456");
    }

    #[tokio::test]
    async fn unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = provider(&server, Credentials::api_key("bad"))
            .fetch_token()
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthorized);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn server_error_is_retriable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = provider(&server, Credentials::api_key("key"))
            .fetch_token()
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Status(503));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let provider = HttpTokenProvider::new(
            "http://127.0.0.1:1/auth",
            Credentials::api_key("key"),
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(matches!(
            provider.fetch_token().await,
            Err(AuthError::Network(_))
        ));
    }
}
