//! Logout endpoints: single-device and all-devices revocation.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use super::guards::require_session_csrf;
use super::remember::{clear_remember_cookie, extract_remember_token};
use super::session::{clear_session_cookie, extract_session_token};
use super::state::{AuthConfig, AuthState};
use super::storage::{
    delete_all_remember_tokens_for_user, delete_all_sessions_for_user, delete_remember_token,
    delete_session,
};
use super::types::MessageResponse;
use super::utils::hash_token;

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Best-effort deletes; the response always clears both cookies so a
    // caller with no session gets the same outcome.
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_token(&token);
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    if let Some(token) = extract_remember_token(&headers) {
        let token_hash = hash_token(&token);
        if let Err(err) = delete_remember_token(&pool, &token_hash).await {
            error!("Failed to delete remember token: {err}");
        }
    }

    logged_out_response(auth_state.config())
}

#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "All devices logged out", body = MessageResponse),
        (status = 401, description = "No active session"),
        (status = 403, description = "CSRF token missing or wrong")
    ),
    tag = "auth"
)]
pub async fn logout_all(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let record = match require_session_csrf(&headers, &pool).await {
        Ok(record) => record,
        Err(response) => return response,
    };

    let sessions = match delete_all_sessions_for_user(&pool, record.user_id).await {
        Ok(count) => count,
        Err(err) => {
            error!("Failed to revoke sessions: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Logout failed".to_string())
                .into_response();
        }
    };

    let remembered = match delete_all_remember_tokens_for_user(&pool, record.user_id).await {
        Ok(count) => count,
        Err(err) => {
            error!("Failed to revoke remember tokens: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Logout failed".to_string())
                .into_response();
        }
    };

    info!(sessions, remembered, "Revoked all devices");

    logged_out_response(auth_state.config())
}

/// Shared terminal response: flash message plus both cookie clears.
fn logged_out_response(config: &AuthConfig) -> Response {
    let mut response = (
        StatusCode::OK,
        Json(MessageResponse::new("You are logged out.")),
    )
        .into_response();

    match clear_session_cookie(config) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    match clear_remember_cookie(config) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build remember cookie: {err}"),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{logout, logout_all};
    use crate::api::email::LogEmailSender;
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode, header::SET_COOKIE};
    use axum::response::IntoResponse;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://verki@127.0.0.1:1/verki")?)
    }

    fn auth_state() -> Arc<AuthState> {
        let config = AuthConfig::new("https://verki.dev".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(AuthState::new(
            config,
            limiter,
            Arc::new(LogEmailSender),
            reqwest::Client::new(),
        ))
    }

    #[tokio::test]
    async fn logout_without_cookies_still_succeeds() -> Result<()> {
        let response = logout(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        // Both cookies are cleared even for anonymous callers.
        let cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn logout_all_requires_session() -> Result<()> {
        let response = logout_all(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
