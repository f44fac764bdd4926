//! Session store transport
//!
//! `SessionStore` is the client's view of the platform session API.
//! `HttpSessionStore` is the production implementation: reqwest with a cookie
//! jar, so the HTTP-only session cookie set by signin/signup rides along on
//! every later request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use ensina_types::{ApiMessage, Credentials, SessionEnvelope, SignUpRequest, User};

use crate::config::SessionConfig;
use crate::error::AuthError;

/// Client-side view of the session API.
///
/// Outcomes are typed: `Ok(None)` from [`current_session`] is the clean
/// unauthenticated state, never an error. Callers decide breaker accounting
/// from the returned variant, not from message text.
///
/// [`current_session`]: SessionStore::current_session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the user bound to the current session cookie.
    async fn current_session(&self) -> Result<Option<User>, AuthError>;

    /// Exchange credentials for a session cookie.
    async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError>;

    /// Create an account and start a session.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<User, AuthError>;

    /// Terminate the server-side session and clear the cookie.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Lightweight connectivity check.
    ///
    /// Any HTTP response counts as connected, 401 included; only a
    /// transport-level failure is an error.
    async fn probe(&self) -> Result<(), AuthError>;
}

/// Production `SessionStore` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionStore {
    /// Build a store for the configured base URL.
    pub fn new(config: &SessionConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(2) // single API host
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .cookie_store(true)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(config, client))
    }

    /// Build a store around an existing HTTP client.
    ///
    /// Use this for custom proxy or TLS settings. The client must have its
    /// cookie store enabled, otherwise the session cookie is dropped between
    /// requests.
    pub fn with_client(config: &SessionConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Pull the server's message out of an error body, if there is one.
    async fn read_message(response: reqwest::Response, fallback: &str) -> String {
        response
            .json::<ApiMessage>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| fallback.to_string())
    }

    async fn read_user(response: reqwest::Response) -> Result<User, AuthError> {
        let status = response.status().as_u16();
        let envelope = response
            .json::<SessionEnvelope>()
            .await
            .map_err(|e| AuthError::server(status, format!("invalid response body: {e}")))?;
        Ok(envelope.user)
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    #[instrument(skip(self), level = "debug")]
    async fn current_session(&self) -> Result<Option<User>, AuthError> {
        let response = self.client.get(self.url("/api/auth/me")).send().await?;

        match response.status() {
            status if status.is_success() => Ok(Some(Self::read_user(response).await?)),
            StatusCode::UNAUTHORIZED => {
                debug!("no active session");
                Ok(None)
            }
            status => Err(AuthError::server(
                status.as_u16(),
                Self::read_message(response, "session check failed").await,
            )),
        }
    }

    #[instrument(skip(self, credentials), level = "debug")]
    async fn sign_in(&self, credentials: &Credentials) -> Result<User, AuthError> {
        let response = self
            .client
            .post(self.url("/api/auth/signin"))
            .json(credentials)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Self::read_user(response).await,
            StatusCode::UNAUTHORIZED => Err(AuthError::Credentials(
                Self::read_message(response, "invalid email or password").await,
            )),
            status => Err(AuthError::server(
                status.as_u16(),
                Self::read_message(response, "sign-in failed").await,
            )),
        }
    }

    #[instrument(skip(self, request), level = "debug")]
    async fn sign_up(&self, request: &SignUpRequest) -> Result<User, AuthError> {
        let response = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(request)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Self::read_user(response).await,
            // 409 is "email already registered", worded by the server for the end user
            StatusCode::CONFLICT => Err(AuthError::Credentials(
                Self::read_message(response, "email already registered").await,
            )),
            status => Err(AuthError::server(
                status.as_u16(),
                Self::read_message(response, "sign-up failed").await,
            )),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn sign_out(&self) -> Result<(), AuthError> {
        let response = self.client.post(self.url("/api/auth/signout")).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuthError::server(
                status.as_u16(),
                Self::read_message(response, "sign-out failed").await,
            ))
        }
    }

    async fn probe(&self) -> Result<(), AuthError> {
        // Status is irrelevant here; a 401 still proves the server answered.
        self.client
            .get(self.url("/api/auth/me"))
            .send()
            .await
            .map(|_| ())
            .map_err(AuthError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joining_strips_trailing_slash() {
        let config = SessionConfig::new("http://localhost:3000/");
        let store = HttpSessionStore::new(&config).unwrap();
        assert_eq!(store.url("/api/auth/me"), "http://localhost:3000/api/auth/me");
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let err = HttpSessionStore::new(&SessionConfig::new("not-a-url")).unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }
}
