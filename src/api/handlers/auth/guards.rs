//! Request guards evaluated before handler bodies touch any payload.
//!
//! Routes sharing a guard set compose the same ordered list; the first
//! rejection wins. The session is resolved once per request and reused by
//! every guard in the list.

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use sqlx::PgPool;

use super::session::{authenticate_session, csrf_matches};
use super::storage::SessionRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Guard {
    /// Reject signed-in callers with a redirect home; login and the reset
    /// flows are for guests.
    GuestOnly,
    /// Require a live session; answer 401 otherwise.
    Authenticated,
    /// Require the session's CSRF token in `x-csrf-token`. Listed after
    /// `Authenticated` on mutating routes.
    Csrf,
}

/// Evaluate guards in order against the request headers.
///
/// Returns the resolved session so handlers do not look it up twice.
pub(crate) async fn run(
    guards: &[Guard],
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<SessionRecord>, Response> {
    let session = match authenticate_session(headers, pool).await {
        Ok(session) => session,
        Err(status) => return Err(status.into_response()),
    };

    for guard in guards {
        match guard {
            Guard::GuestOnly => {
                if session.is_some() {
                    return Err(Redirect::to("/").into_response());
                }
            }
            Guard::Authenticated => {
                if session.is_none() {
                    return Err(StatusCode::UNAUTHORIZED.into_response());
                }
            }
            Guard::Csrf => {
                let Some(record) = session.as_ref() else {
                    return Err(StatusCode::UNAUTHORIZED.into_response());
                };
                if !csrf_matches(headers, record) {
                    return Err(StatusCode::FORBIDDEN.into_response());
                }
            }
        }
    }

    Ok(session)
}

/// `Authenticated` guard that hands back the session record.
pub(crate) async fn require_session(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<SessionRecord, Response> {
    match run(&[Guard::Authenticated], headers, pool).await? {
        Some(record) => Ok(record),
        None => Err(StatusCode::UNAUTHORIZED.into_response()),
    }
}

/// `Authenticated` + `Csrf` guard for mutating routes.
pub(crate) async fn require_session_csrf(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<SessionRecord, Response> {
    match run(&[Guard::Authenticated, Guard::Csrf], headers, pool).await? {
        Some(record) => Ok(record),
        None => Err(StatusCode::UNAUTHORIZED.into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    fn unreachable_pool() -> Option<PgPool> {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://verki@127.0.0.1:1/verki")
            .ok()
    }

    #[tokio::test]
    async fn guest_only_allows_anonymous_requests() {
        let Some(pool) = unreachable_pool() else {
            return;
        };
        // No cookie means no database roundtrip is attempted.
        let result = run(&[Guard::GuestOnly], &HeaderMap::new(), &pool).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn authenticated_rejects_anonymous_requests() {
        let Some(pool) = unreachable_pool() else {
            return;
        };
        let result = run(&[Guard::Authenticated], &HeaderMap::new(), &pool).await;
        let Err(response) = result else {
            panic!("expected rejection");
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn csrf_guard_rejects_anonymous_requests() {
        let Some(pool) = unreachable_pool() else {
            return;
        };
        let result = require_session_csrf(&HeaderMap::new(), &pool).await;
        let Err(response) = result else {
            panic!("expected rejection");
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn require_session_rejects_anonymous_requests() {
        let Some(pool) = unreachable_pool() else {
            return;
        };
        let result = require_session(&HeaderMap::new(), &pool).await;
        let Err(response) = result else {
            panic!("expected rejection");
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
