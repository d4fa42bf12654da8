//! Login endpoints: guest flow state and credential submission.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, StatusCode,
        header::{SET_COOKIE, USER_AGENT},
    },
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::guards::{self, Guard};
use super::password::{dummy_verify, verify_password};
use super::rate_limit::{RateLimitDecision, ip_email_key, ip_key, limited_message};
use super::remember::remember_cookie;
use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{UserRecord, create_remember_token, create_session, find_user_by_email};
use super::turnstile::verify_human;
use super::types::{GuestFlowState, LoginRequest, MessageResponse};
use super::utils::{extract_client_ip, normalize_email, valid_email};

const LOGIN_PURPOSE: &str = "login";

#[utoipa::path(
    get,
    path = "/auth/login",
    responses(
        (status = 200, description = "Login flow state", body = GuestFlowState),
        (status = 303, description = "Already signed in")
    ),
    tag = "auth"
)]
pub async fn login_state(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match guards::run(&[Guard::GuestOnly], &headers, &pool).await {
        Ok(_) => {}
        Err(response) => return response,
    }

    let state = GuestFlowState {
        human_verification_required: auth_state.config().turnstile_secret().is_some(),
    };
    (StatusCode::OK, Json(state)).into_response()
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = MessageResponse),
        (status = 303, description = "Already signed in"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = MessageResponse),
        (status = 403, description = "Human verification failed", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    match guards::run(&[Guard::GuestOnly], &headers, &pool).await {
        Ok(_) => {}
        Err(response) => return response,
    }

    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let client_ip = extract_client_ip(&headers);
    // Unknown peers share one coarse bucket, which only tightens the limit.
    let ip = client_ip.as_deref().unwrap_or("unknown");

    let coarse_key = ip_key(LOGIN_PURPOSE, ip);
    if let RateLimitDecision::Limited { retry_after_seconds } = auth_state
        .rate_limiter()
        .too_many_attempts(&coarse_key, auth_state.config().login_ip_max_attempts())
        .await
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(MessageResponse::new(limited_message(retry_after_seconds))),
        )
            .into_response();
    }

    let email = request.email.trim().to_string();
    if email.is_empty() {
        return (StatusCode::BAD_REQUEST, "Email is required".to_string()).into_response();
    }
    let email_normalized = normalize_email(&email);
    if email_normalized.chars().count() > 50 || !valid_email(&email_normalized) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Password is required".to_string()).into_response();
    }
    if request.password.chars().count() > 50 {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }
    let Some(remember) = request.remember else {
        return (StatusCode::BAD_REQUEST, "Missing remember flag".to_string()).into_response();
    };

    if !verify_human(&auth_state, request.turnstile_token.as_deref(), client_ip.as_deref()).await {
        return (
            StatusCode::FORBIDDEN,
            Json(MessageResponse::new("Human verification failed. try again.")),
        )
            .into_response();
    }

    let tight_key = ip_email_key(LOGIN_PURPOSE, ip, &email_normalized);
    if let RateLimitDecision::Limited { retry_after_seconds } = auth_state
        .rate_limiter()
        .too_many_attempts(&tight_key, auth_state.config().login_email_max_attempts())
        .await
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(MessageResponse::new(limited_message(retry_after_seconds))),
        )
            .into_response();
    }

    let user = match find_user_by_email(&pool, &email_normalized).await {
        Ok(user) => user,
        Err(err) => {
            error!("Login lookup failed: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string())
                .into_response();
        }
    };

    let Some(user) = user else {
        // Spend the hash work either way so timing does not reveal whether
        // the email exists.
        dummy_verify(&request.password);
        return (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse::new("Invalid email or password.")),
        )
            .into_response();
    };

    if !verify_password(&request.password, &user.password_hash) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse::new("Invalid email or password.")),
        )
            .into_response();
    }

    finish_login(
        &pool,
        &auth_state,
        &headers,
        &user,
        remember,
        client_ip.as_deref(),
        &tight_key,
    )
    .await
}

/// Establish the session and optional remember-device token, then clear the
/// identity-scoped counter. The coarse per-IP window keeps counting.
async fn finish_login(
    pool: &PgPool,
    auth_state: &AuthState,
    headers: &HeaderMap,
    user: &UserRecord,
    remember: bool,
    client_ip: Option<&str>,
    tight_key: &str,
) -> Response {
    let session = match create_session(
        pool,
        user.id,
        auth_state.config().session_ttl_seconds(),
        None,
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to create session: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string())
                .into_response();
        }
    };

    let cookie = match session_cookie(auth_state.config(), &session.token) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string())
                .into_response();
        }
    };

    let remember_value = if remember {
        let user_agent = headers.get(USER_AGENT).and_then(|value| value.to_str().ok());
        match create_remember_token(pool, user.id, client_ip, user_agent).await {
            Ok(token) => match remember_cookie(auth_state.config(), &token) {
                Ok(value) => Some(value),
                Err(err) => {
                    error!("Failed to build remember cookie: {err}");
                    None
                }
            },
            Err(err) => {
                // Login still succeeds; the device just is not remembered.
                error!("Failed to create remember token: {err}");
                None
            }
        }
    } else {
        None
    };

    auth_state.rate_limiter().clear(tight_key).await;

    let mut response = (
        StatusCode::OK,
        Json(MessageResponse::new("You are logged in.")),
    )
        .into_response();
    response.headers_mut().append(SET_COOKIE, cookie);
    if let Some(value) = remember_value {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}
