//! # Verki (Blog Authoring Service)
//!
//! `verki` is a small blog authoring service with a hardened authentication
//! and session core.
//!
//! ## Authentication & Sessions
//!
//! Accounts authenticate with email and password (Argon2id hashes). A
//! successful login creates a server-side session row and sets an opaque
//! session cookie; authenticated `POST`/`PUT`/`DELETE` requests must also
//! carry the session's CSRF token in the `x-csrf-token` header.
//!
//! - **Remember device:** An optional long-lived `remember_device` cookie
//!   re-authenticates a browser silently after the session expires. The
//!   cookie value is a one-way hash lookup; the database never stores the
//!   plaintext token.
//! - **Password reset:** Reset tokens are single-use, expire after a short
//!   window, and are stored hashed. The reset endpoints answer identically
//!   whether or not an account exists to prevent email enumeration.
//! - **Rate limiting:** Login, reset, and password-change attempts are
//!   throttled per client IP and per IP+email pair with fixed windows
//!   persisted in Postgres.
//!
//! ## Posts
//!
//! Authenticated users author posts (draft, published, or scheduled) with
//! unique URL slugs derived from the title. Featured images are normalized
//! to 1200x630 `WebP` covers before storage. All post access is scoped to
//! the owning user; foreign posts return `404 Not Found` rather than
//! `403 Forbidden` to prevent resource enumeration.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
