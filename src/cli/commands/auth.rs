use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_REMEMBER_TTL_DAYS: &str = "remember-ttl-days";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";
pub const ARG_LOGIN_IP_MAX_ATTEMPTS: &str = "login-ip-max-attempts";
pub const ARG_LOGIN_EMAIL_MAX_ATTEMPTS: &str = "login-email-max-attempts";
pub const ARG_RESET_REQUEST_MAX_ATTEMPTS: &str = "reset-request-max-attempts";
pub const ARG_CHANGE_PASSWORD_MAX_ATTEMPTS: &str = "change-password-max-attempts";
pub const ARG_TURNSTILE_SECRET: &str = "turnstile-secret";
pub const ARG_TIMEZONE: &str = "timezone";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";

#[derive(Debug)]
pub struct Options {
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
}

impl Options {
    /// Parse auth/session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned();
        let frontend_base_url = match frontend_base_url {
            Some(value) if !value.trim().is_empty() => value,
            _ => anyhow::bail!("missing required argument: --{ARG_FRONTEND_BASE_URL}"),
        };

        // Helper to filter empty strings which clap might pass through if env vars are set to ""
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        Ok(Self {
            frontend_base_url,
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(43200),
            reset_token_ttl_seconds: matches
                .get_one::<i64>(ARG_RESET_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(1800),
            remember_ttl_days: matches
                .get_one::<i64>(ARG_REMEMBER_TTL_DAYS)
                .copied()
                .unwrap_or(30),
            rate_limit_window_seconds: matches
                .get_one::<i64>(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .copied()
                .unwrap_or(60),
            login_ip_max_attempts: matches
                .get_one::<i64>(ARG_LOGIN_IP_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(30),
            login_email_max_attempts: matches
                .get_one::<i64>(ARG_LOGIN_EMAIL_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(5),
            reset_request_max_attempts: matches
                .get_one::<i64>(ARG_RESET_REQUEST_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(3),
            change_password_max_attempts: matches
                .get_one::<i64>(ARG_CHANGE_PASSWORD_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(3),
            turnstile_secret: get_non_empty(ARG_TURNSTILE_SECRET).map(SecretString::from),
            timezone: get_non_empty(ARG_TIMEZONE).unwrap_or_else(|| "Asia/Tehran".to_string()),
            sweep_interval_seconds: matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(86400),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_rate_limit_args(command);
    with_verification_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for reset links and cookie security")
                .env("VERKI_FRONTEND_BASE_URL")
                .default_value("https://verki.dev"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("VERKI_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token TTL in seconds")
                .env("VERKI_RESET_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REMEMBER_TTL_DAYS)
                .long(ARG_REMEMBER_TTL_DAYS)
                .help("Remember-device token TTL in days (sliding)")
                .env("VERKI_REMEMBER_TTL_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .help("Fixed window length for auth rate limiting")
                .env("VERKI_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_LOGIN_IP_MAX_ATTEMPTS)
                .long(ARG_LOGIN_IP_MAX_ATTEMPTS)
                .help("Max login attempts per client IP per window")
                .env("VERKI_LOGIN_IP_MAX_ATTEMPTS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_LOGIN_EMAIL_MAX_ATTEMPTS)
                .long(ARG_LOGIN_EMAIL_MAX_ATTEMPTS)
                .help("Max login attempts per IP and email pair per window")
                .env("VERKI_LOGIN_EMAIL_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_REQUEST_MAX_ATTEMPTS)
                .long(ARG_RESET_REQUEST_MAX_ATTEMPTS)
                .help("Max password reset requests per client IP per window")
                .env("VERKI_RESET_REQUEST_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CHANGE_PASSWORD_MAX_ATTEMPTS)
                .long(ARG_CHANGE_PASSWORD_MAX_ATTEMPTS)
                .help("Max password change attempts per client IP per window")
                .env("VERKI_CHANGE_PASSWORD_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_verification_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TURNSTILE_SECRET)
                .long(ARG_TURNSTILE_SECRET)
                .help("Cloudflare Turnstile secret key; human verification is skipped when unset")
                .env("VERKI_TURNSTILE_SECRET"),
        )
        .arg(
            Arg::new(ARG_TIMEZONE)
                .long(ARG_TIMEZONE)
                .help("IANA timezone for the secondary timestamp in notification mail")
                .env("VERKI_TIMEZONE")
                .default_value("Asia/Tehran"),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Interval between expired credential sweeps in seconds")
                .env("VERKI_SWEEP_INTERVAL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
}
