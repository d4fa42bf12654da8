//! Auth handlers and supporting modules.
//!
//! This module coordinates credential login, cookie sessions, remember-device
//! tokens, and the password reset/change flows.
//!
//! ## Rate Limiting
//!
//! Credential-bearing endpoints are limited in two layers: a coarse per-IP
//! window on login and a tight per-IP-plus-email window on every flow.
//! Counters live in Postgres so all instances share them.
//!
//! - **Login:** 30 attempts per IP and 5 per IP+email within the window.
//! - **Reset / change:** 3 attempts per IP+email within the window.
//!
//! ## Token Storage
//!
//! Session, remember-device, and reset tokens are random strings handed to
//! the client exactly once; only SHA-256 hashes reach the database.
//!
//! > **Warning:** A password change revokes every session and remembered
//! > device for the account, including the one making the request.

pub(crate) mod change_password;
pub(crate) mod guards;
pub(crate) mod login;
pub(crate) mod logout;
mod password;
mod rate_limit;
pub(crate) mod remember;
pub(crate) mod reset;
pub(crate) mod session;
mod state;
mod storage;
mod sweep;
mod turnstile;
pub(crate) mod types;
mod utils;

pub use rate_limit::NoopRateLimiter;
pub use state::{AuthConfig, AuthState};
pub(crate) use rate_limit::PgRateLimiter;
pub(crate) use remember::silent_reauth;
pub(crate) use storage::SessionRecord;
pub(crate) use sweep::spawn_sweeper;
