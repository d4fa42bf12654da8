//! Cloudflare Turnstile verification for guest-facing flows.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::error;

use super::state::AuthState;

const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Check a Turnstile token against the siteverify endpoint.
///
/// Verification is skipped (treated as passed) when no secret is
/// configured. With a secret present the gate fails closed: a missing
/// token, a transport error, or an undecodable response all count as a
/// failed verification.
pub(super) async fn verify_human(
    state: &AuthState,
    token: Option<&str>,
    remote_ip: Option<&str>,
) -> bool {
    let Some(secret) = state.config().turnstile_secret() else {
        return true;
    };
    let Some(token) = token.filter(|token| !token.is_empty()) else {
        return false;
    };
    verify_at(state.http(), secret, token, remote_ip, SITEVERIFY_URL).await
}

async fn verify_at(
    http: &reqwest::Client,
    secret: &SecretString,
    token: &str,
    remote_ip: Option<&str>,
    url: &str,
) -> bool {
    let mut form = HashMap::new();
    form.insert("secret", secret.expose_secret().to_string());
    form.insert("response", token.to_string());
    if let Some(ip) = remote_ip {
        form.insert("remoteip", ip.to_string());
    }

    let response = match http.post(url).form(&form).send().await {
        Ok(response) => response,
        Err(err) => {
            // Fail closed
            error!("Human verification request failed: {err}");
            return false;
        }
    };

    if !response.status().is_success() {
        error!(
            "Human verification endpoint returned {}",
            response.status()
        );
        return false;
    }

    match response.json::<SiteVerifyResponse>().await {
        Ok(body) => {
            if !body.success {
                error!("Human verification rejected: {:?}", body.error_codes);
            }
            body.success
        }
        Err(err) => {
            error!("Failed to decode human verification response: {err}");
            false
        }
    }
}
