//! Session client errors
//!
//! Typed error taxonomy for session operations. The transport assigns the
//! variant from the HTTP response (or its absence); callers never infer the
//! failure class from message text.

use thiserror::Error;

/// Errors surfaced by session operations.
///
/// `Clone` so the last error can ride along in auth state snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Credential rejection or invalid sign-in/sign-up input.
    ///
    /// The message is the server's own wording and is rendered to the end
    /// user verbatim.
    #[error("{0}")]
    Credentials(String),

    /// Transport-level failure: connect, DNS, timeout.
    #[error("network error: {0}")]
    Network(String),

    /// Request rejected before any response arrived (origin/proxy block).
    #[error("cross-origin request blocked: {0}")]
    Cors(String),

    /// Backend failure carrying the HTTP status.
    #[error("server error (status {status}): {message}")]
    Server {
        /// HTTP status code of the failed response
        status: u16,
        /// Message from the response body, or a generic description
        message: String,
    },

    /// Session expired or was invalidated server-side; treated as logged out.
    #[error("session expired")]
    SessionExpired,

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse error classification, used for policy decisions and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input or wrong password
    Credentials,
    /// Transport failure
    Network,
    /// Origin rejection
    Cors,
    /// Backend failure
    Server,
    /// Expired/invalid session
    Session,
    /// Construction-time validation
    Config,
}

impl ErrorKind {
    /// Stable label form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::Network => "network",
            Self::Cors => "cors",
            Self::Server => "server",
            Self::Session => "session",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AuthError {
    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Credentials(_) => ErrorKind::Credentials,
            Self::Network(_) => ErrorKind::Network,
            Self::Cors(_) => ErrorKind::Cors,
            Self::Server { .. } => ErrorKind::Server,
            Self::SessionExpired => ErrorKind::Session,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Only transient connectivity failures qualify; these are also the
    /// failures that force the circuit breaker open during session checks.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Cors(_) => true,
            Self::Credentials(_) => false, // needs different input
            Self::Server { .. } => false,
            Self::SessionExpired => false,
            Self::Config(_) => false,
        }
    }

    /// Stable machine-readable code for structured logs and API bindings.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "INVALID_CREDENTIALS",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Cors(_) => "CORS_BLOCKED",
            Self::Server { .. } => "SERVER_ERROR",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Create a server error from a status and message.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timeout: {err}"))
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_request() && err.status().is_none() {
            // Rejected before a response existed, the origin-block class.
            Self::Cors(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Server {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AuthError::Network("connection refused".to_string()).is_retryable());
        assert!(AuthError::Cors("blocked by origin policy".to_string()).is_retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!AuthError::Credentials("wrong password".to_string()).is_retryable());
        assert!(!AuthError::server(500, "boom").is_retryable());
        assert!(!AuthError::SessionExpired.is_retryable());
        assert!(!AuthError::Config("empty base url".to_string()).is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            AuthError::Credentials("no".to_string()).kind(),
            ErrorKind::Credentials
        );
        assert_eq!(AuthError::server(503, "down").kind(), ErrorKind::Server);
        assert_eq!(AuthError::SessionExpired.kind(), ErrorKind::Session);
        assert_eq!(ErrorKind::Cors.as_str(), "cors");
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            AuthError::Credentials("no".to_string()).error_code(),
            "INVALID_CREDENTIALS"
        );
        assert_eq!(
            AuthError::Network("refused".to_string()).error_code(),
            "NETWORK_ERROR"
        );
        assert_eq!(
            AuthError::Cors("blocked".to_string()).error_code(),
            "CORS_BLOCKED"
        );
        assert_eq!(AuthError::server(502, "bad gateway").error_code(), "SERVER_ERROR");
        assert_eq!(AuthError::SessionExpired.error_code(), "SESSION_EXPIRED");
    }

    #[test]
    fn test_credentials_message_is_verbatim() {
        let err = AuthError::Credentials("Email ou senha incorretos".to_string());
        assert_eq!(err.to_string(), "Email ou senha incorretos");
    }
}
