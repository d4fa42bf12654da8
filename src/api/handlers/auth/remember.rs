//! Remember-device cookies and the silent re-authentication middleware.

use axum::{
    extract::{Extension, Request},
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::session::{SESSION_COOKIE_NAME, authenticate_session, extract_cookie, session_cookie};
use super::state::{AuthConfig, AuthState};
use super::storage::{create_session, lookup_remember_token, touch_remember_token};
use super::utils::{extract_client_ip, hash_token};

pub(super) const REMEMBER_COOKIE_NAME: &str = "remember_device";

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Build the sliding `remember_device` cookie.
pub(super) fn remember_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.remember_ttl_days() * SECONDS_PER_DAY;
    let mut cookie = format!(
        "{REMEMBER_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_remember_cookie(
    config: &AuthConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{REMEMBER_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_remember_token(headers: &HeaderMap) -> Option<String> {
    extract_cookie(headers, REMEMBER_COOKIE_NAME)
}

/// Silent re-authentication, run before routing.
///
/// A request with no live session but a matching remember-device cookie
/// gets a fresh session before its route runs; the fresh token is merged
/// into the request's cookie set so guards see it like any signed-in
/// request. The matched record is touched and its cookie re-issued with a
/// fresh expiry whether or not a session had to be established. Unknown
/// tokens stay anonymous without an error.
pub async fn silent_reauth(
    Extension(pool): Extension<PgPool>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_remember_token(request.headers()) else {
        return next.run(request).await;
    };

    let token_hash = hash_token(&token);
    let record = match lookup_remember_token(
        &pool,
        &token_hash,
        auth_state.config().remember_ttl_days(),
    )
    .await
    {
        Ok(Some(record)) => record,
        Ok(None) => return next.run(request).await,
        Err(err) => {
            error!("Remember token lookup failed: {err}");
            return next.run(request).await;
        }
    };

    let authenticated = matches!(
        authenticate_session(request.headers(), &pool).await,
        Ok(Some(_))
    );

    let mut session_set_cookie = None;
    if !authenticated {
        match create_session(
            &pool,
            record.user_id,
            auth_state.config().session_ttl_seconds(),
            None,
        )
        .await
        {
            Ok(session) => match session_cookie(auth_state.config(), &session.token) {
                Ok(value) => {
                    if let Some(merged) =
                        merge_cookie_header(request.headers(), SESSION_COOKIE_NAME, &session.token)
                    {
                        request.headers_mut().insert(COOKIE, merged);
                    }
                    session_set_cookie = Some(value);
                }
                Err(err) => error!("Failed to build session cookie: {err}"),
            },
            Err(err) => error!("Silent re-authentication failed: {err}"),
        }
    }

    let client_ip = extract_client_ip(request.headers());
    if let Err(err) = touch_remember_token(&pool, record.id, client_ip.as_deref()).await {
        error!("Failed to refresh remember token: {err}");
    }

    let refreshed = remember_cookie(auth_state.config(), &token);

    let mut response = next.run(request).await;

    if let Some(value) = session_set_cookie {
        response.headers_mut().append(SET_COOKIE, value);
    }
    match refreshed {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build remember cookie: {err}"),
    }

    response
}

/// Merge `name=value` into a request cookie set, replacing any existing
/// pair with the same name.
fn merge_cookie_header(headers: &HeaderMap, name: &str, value: &str) -> Option<HeaderValue> {
    let mut pairs: Vec<String> = Vec::new();
    if let Some(existing) = headers.get(COOKIE).and_then(|header| header.to_str().ok()) {
        for pair in existing.split(';') {
            let trimmed = pair.trim();
            if trimmed.is_empty() {
                continue;
            }
            let key = trimmed.splitn(2, '=').next().unwrap_or_default().trim();
            if key != name {
                pairs.push(trimmed.to_string());
            }
        }
    }
    pairs.push(format!("{name}={value}"));
    HeaderValue::from_str(&pairs.join("; ")).ok()
}
