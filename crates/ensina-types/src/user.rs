//! User types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform role attached to every account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Student enrolled in courses
    Aluno,
    /// Instructor publishing courses
    Instrutor,
    /// Platform administrator
    Admin,
}

impl Role {
    /// String form used on the wire and in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aluno => "aluno",
            Self::Instrutor => "instrutor",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aluno" => Ok(Self::Aluno),
            "instrutor" => Ok(Self::Instrutor),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Error returned when a role string is not one of the recognized values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// An authenticated account as the session API returns it
///
/// The identifier is assigned by the server and immutable; the SDK never
/// writes individual fields, only replaces whole records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Server-assigned unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Email address (unique per account)
    pub email: String,
    /// Platform role
    pub role: Role,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last profile update timestamp
    pub updated_at: DateTime<Utc>,
    /// Object-storage path of the avatar image, if one was uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<String>,
    /// Contact phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Short profile bio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl User {
    /// Join the avatar path onto an object-storage base URL
    ///
    /// Returns `None` when no avatar was uploaded. URL generation only;
    /// fetching the object is the caller's concern.
    pub fn avatar_url(&self, base: &str) -> Option<String> {
        let path = self.avatar_path.as_deref()?;
        let base = base.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Some(format!("{base}/{path}"))
    }
}
