//! Password reset request flow.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::guards::{self, Guard};
use super::rate_limit::{RateLimitDecision, ip_email_key, limited_message};
use super::state::AuthState;
use super::storage::{create_reset_token, find_user_by_email};
use super::turnstile::verify_human;
use super::types::{GuestFlowState, MessageResponse, ResetPasswordRequest};
use super::utils::{build_reset_url, extract_client_ip, normalize_email, valid_email};
use crate::api::email::EmailMessage;

const RESET_PURPOSE: &str = "reset-request";

/// The response never reveals whether the address exists.
const RESET_REQUESTED: &str =
    "If your email address exists in our system, we will send you a token to reset your password.";

#[utoipa::path(
    get,
    path = "/auth/reset-password",
    responses(
        (status = 200, description = "Reset flow state", body = GuestFlowState),
        (status = 303, description = "Already signed in")
    ),
    tag = "auth"
)]
pub async fn reset_password_state(
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
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Reset requested", body = MessageResponse),
        (status = 303, description = "Already signed in"),
        (status = 400, description = "Validation error", body = String),
        (status = 403, description = "Human verification failed", body = MessageResponse),
        (status = 429, description = "Rate limited", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    match guards::run(&[Guard::GuestOnly], &headers, &pool).await {
        Ok(_) => {}
        Err(response) => return response,
    }

    let request: ResetPasswordRequest = match payload {
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

    let client_ip = extract_client_ip(&headers);
    let ip = client_ip.as_deref().unwrap_or("unknown");

    if !verify_human(&auth_state, request.turnstile_token.as_deref(), client_ip.as_deref()).await {
        return (
            StatusCode::FORBIDDEN,
            Json(MessageResponse::new("Human verification failed. try again.")),
        )
            .into_response();
    }

    let key = ip_email_key(RESET_PURPOSE, ip, &email_normalized);
    if let RateLimitDecision::Limited { retry_after_seconds } = auth_state
        .rate_limiter()
        .too_many_attempts(&key, auth_state.config().reset_request_max_attempts())
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
            error!("Reset lookup failed: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Reset failed".to_string())
                .into_response();
        }
    };

    if let Some(user) = user {
        let ttl_seconds = auth_state.config().reset_token_ttl_seconds();
        let token = match create_reset_token(&pool, user.id, ttl_seconds).await {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to store reset token: {err}");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Reset failed".to_string())
                    .into_response();
            }
        };

        // The plaintext token exists only in this message; storage holds
        // its hash and the outbox is never involved.
        let reset_url = build_reset_url(auth_state.config().frontend_base_url(), &token);
        let message =
            EmailMessage::reset_password(&user.email, &reset_url, ttl_seconds / 60);
        if let Err(err) = auth_state.email_sender().send(&message) {
            error!("Failed to send reset email: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Reset failed".to_string())
                .into_response();
        }
    }

    (StatusCode::OK, Json(MessageResponse::new(RESET_REQUESTED))).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::super::state::{AuthConfig, AuthState};
    use super::{reset_password, reset_password_state};
    use crate::api::email::LogEmailSender;
    use crate::api::handlers::auth::types::ResetPasswordRequest;
    use anyhow::Result;
    use axum::Json;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::PgPool;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://verki@127.0.0.1:1/verki")?)
    }

    fn auth_state(turnstile: bool) -> Arc<AuthState> {
        let mut config = AuthConfig::new("https://verki.dev".to_string());
        if turnstile {
            config = config.with_turnstile_secret(SecretString::from("sk-secret"));
        }
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Arc::new(AuthState::new(
            config,
            limiter,
            Arc::new(LogEmailSender),
            reqwest::Client::new(),
        ))
    }

    #[tokio::test]
    async fn reset_state_answers_guests() -> Result<()> {
        let response = reset_password_state(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(false)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn reset_missing_payload() -> Result<()> {
        let response = reset_password(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(false)),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_rejects_invalid_email() -> Result<()> {
        let request = ResetPasswordRequest {
            email: "not-an-email".to_string(),
            turnstile_token: None,
        };
        let response = reset_password(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(false)),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_requires_turnstile_token_when_configured() -> Result<()> {
        let request = ResetPasswordRequest {
            email: "alice@example.com".to_string(),
            turnstile_token: None,
        };
        let response = reset_password(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(auth_state(true)),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        Ok(())
    }
}
