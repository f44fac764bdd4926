//! Session API request/response bodies

use serde::{Deserialize, Serialize};

use crate::user::User;

/// Sign-in request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Plaintext password, sent over TLS only
    pub password: String,
}

/// Sign-up request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpRequest {
    /// Display name for the new account
    pub name: String,
    /// Account email
    pub email: String,
    /// Plaintext password, sent over TLS only
    pub password: String,
}

/// Successful response envelope carrying the authenticated user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnvelope {
    /// The authenticated account
    pub user: User,
}

/// Error/notice body returned by the session endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    /// Human-readable message, shown to the end user for credential failures
    pub message: String,
}
