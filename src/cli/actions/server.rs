use crate::api;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use secrecy::SecretString;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub remember_ttl_days: i64,
    pub rate_limit_window_seconds: i64,
    pub login_ip_max_attempts: i64,
    pub login_email_max_attempts: i64,
    pub reset_request_max_attempts: i64,
    pub change_password_max_attempts: i64,
    pub turnstile_secret: Option<SecretString>,
    pub timezone: String,
    pub sweep_interval_seconds: u64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
    pub media_root: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Fail early on malformed DSNs instead of at pool connect time
    Url::parse(&args.dsn).context("invalid VERKI_DSN")?;

    let timezone: Tz = args
        .timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid VERKI_TIMEZONE '{}': {e}", args.timezone))?;

    let mut auth_config = api::handlers::auth::AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_remember_ttl_days(args.remember_ttl_days)
        .with_rate_limit_window_seconds(args.rate_limit_window_seconds)
        .with_login_ip_max_attempts(args.login_ip_max_attempts)
        .with_login_email_max_attempts(args.login_email_max_attempts)
        .with_reset_request_max_attempts(args.reset_request_max_attempts)
        .with_change_password_max_attempts(args.change_password_max_attempts)
        .with_timezone(timezone)
        .with_sweep_interval_seconds(args.sweep_interval_seconds);

    if let Some(secret) = args.turnstile_secret {
        auth_config = auth_config.with_turnstile_secret(secret);
    }

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, auth_config, email_config, args.media_root).await
}
