//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Issue a long-lived remember-device cookie alongside the session.
    pub remember: Option<bool>,
    /// Turnstile response token; required when human verification is enabled.
    pub turnstile_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub turnstile_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub token: String,
    pub password: String,
    pub turnstile_token: Option<String>,
}

/// Flash-style response carried by every auth flow endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// State returned by the guest-only GET flow endpoints.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GuestFlowState {
    pub human_verification_required: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
    pub csrf_token: String,
    pub expires_at: String,
}
