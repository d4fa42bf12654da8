//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, email, media};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches);
    let media_opts = media::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        remember_ttl_days: auth_opts.remember_ttl_days,
        rate_limit_window_seconds: auth_opts.rate_limit_window_seconds,
        login_ip_max_attempts: auth_opts.login_ip_max_attempts,
        login_email_max_attempts: auth_opts.login_email_max_attempts,
        reset_request_max_attempts: auth_opts.reset_request_max_attempts,
        change_password_max_attempts: auth_opts.change_password_max_attempts,
        turnstile_secret: auth_opts.turnstile_secret,
        timezone: auth_opts.timezone,
        sweep_interval_seconds: auth_opts.sweep_interval_seconds,
        email_outbox_poll_seconds: email_opts.poll_seconds,
        email_outbox_batch_size: email_opts.batch_size,
        email_outbox_max_attempts: email_opts.max_attempts,
        email_outbox_backoff_base_seconds: email_opts.backoff_base_seconds,
        email_outbox_backoff_max_seconds: email_opts.backoff_max_seconds,
        media_root: media_opts.root,
    }))
}
