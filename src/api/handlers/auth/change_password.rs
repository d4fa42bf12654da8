//! Password change flow, driven by an emailed reset token.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::error;

use super::guards::{self, Guard};
use super::password::{hash_password, verify_password};
use super::rate_limit::{RateLimitDecision, ip_email_key, limited_message};
use super::remember::clear_remember_cookie;
use super::session::clear_session_cookie;
use super::state::AuthState;
use super::storage::{find_user_by_email, lookup_reset_record, rotate_password_and_clear_devices};
use super::turnstile::verify_human;
use super::types::{ChangePasswordRequest, GuestFlowState, MessageResponse};
use super::utils::{extract_client_ip, hash_token, normalize_email, valid_email};

const CHANGE_PURPOSE: &str = "change-password";

/// Human-readable stamp used in the confirmation email.
const CHANGED_AT_FORMAT: &str = "%B %-d, %Y at %-I:%M %p";

#[utoipa::path(
    get,
    path = "/auth/change-password",
    responses(
        (status = 200, description = "Change-password flow state", body = GuestFlowState),
        (status = 303, description = "Already signed in")
    ),
    tag = "auth"
)]
pub async fn change_password_state(
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
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 303, description = "Already signed in"),
        (status = 400, description = "Validation error", body = String),
        (status = 403, description = "Human verification failed", body = MessageResponse),
        (status = 422, description = "Token rejected", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    match guards::run(&[Guard::GuestOnly], &headers, &pool).await {
        Ok(_) => {}
        Err(response) => return response,
    }

    let request: ChangePasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = request.email.trim().to_string();
    if email.is_empty() {
        return (StatusCode::BAD_REQUEST, "Email is required".to_string()).into_response();
    }
    let email_normalized = normalize_email(&email);
    if email_normalized.chars().count() > 50 || !valid_email(&email_normalized) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Token is required".to_string()).into_response();
    }
    if request.token.chars().count() > 50 {
        return (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response();
    }
    let password_len = request.password.chars().count();
    if request.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Password is required".to_string()).into_response();
    }
    if !(10..=50).contains(&password_len) {
        return (StatusCode::BAD_REQUEST, "Invalid password".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    let ip = client_ip.as_deref().unwrap_or("unknown");

    if !verify_human(&auth_state, request.turnstile_token.as_deref(), client_ip.as_deref()).await {
        return (
            StatusCode::FORBIDDEN,
            Json(MessageResponse::new("Human verification failed. try again.")),
        )
            .into_response();
    }

    let key = ip_email_key(CHANGE_PURPOSE, ip, &email_normalized);
    if let RateLimitDecision::Limited { retry_after_seconds } = auth_state
        .rate_limiter()
        .too_many_attempts(&key, auth_state.config().change_password_max_attempts())
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
            error!("Change-password lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password change failed".to_string(),
            )
                .into_response();
        }
    };

    // Every rejected branch answers the same so callers cannot probe which
    // check failed.
    let Some(user) = user else {
        return rejected_token();
    };

    let record = match lookup_reset_record(&pool, user.id).await {
        Ok(record) => record,
        Err(err) => {
            error!("Reset record lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password change failed".to_string(),
            )
                .into_response();
        }
    };
    let Some(record) = record else {
        return rejected_token();
    };

    let presented = hash_token(&request.token);
    if !bool::from(presented.ct_eq(&record.token_hash)) {
        return rejected_token();
    }
    if record.expires_at <= Utc::now() {
        return rejected_token();
    }
    // The new password must differ from the one being replaced.
    if verify_password(&request.password, &user.password_hash) {
        return rejected_token();
    }

    let new_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password change failed".to_string(),
            )
                .into_response();
        }
    };

    let now = Utc::now();
    let timezone = auth_state.config().timezone();
    let changed_at_utc = now.format(CHANGED_AT_FORMAT).to_string();
    let changed_at_local = now.with_timezone(&timezone).format(CHANGED_AT_FORMAT).to_string();

    if let Err(err) = rotate_password_and_clear_devices(
        &pool,
        user.id,
        &user.email,
        &new_hash,
        &changed_at_utc,
        &changed_at_local,
        timezone.name(),
    )
    .await
    {
        error!("Failed to rotate password: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Password change failed".to_string(),
        )
            .into_response();
    }

    auth_state.rate_limiter().clear(&key).await;

    changed_response(&auth_state)
}

fn rejected_token() -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(MessageResponse::new("Token is invalid or expired. try again.")),
    )
        .into_response()
}

/// Rotation revoked every device, so the caller's own cookies are cleared too.
fn changed_response(auth_state: &AuthState) -> Response {
    let mut response = (
        StatusCode::OK,
        Json(MessageResponse::new(
            "Your password has been changed. login with new password.",
        )),
    )
        .into_response();
    match clear_session_cookie(auth_state.config()) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    match clear_remember_cookie(auth_state.config()) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(err) => error!("Failed to build remember cookie: {err}"),
    }
    response
}
