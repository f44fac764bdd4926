//! Ensina Types - Shared domain types
//!
//! This crate contains domain types used across the Ensina client SDK:
//! - User identity and roles
//! - Session API request/response bodies

pub mod api;
pub mod user;

pub use api::*;
pub use user::*;
