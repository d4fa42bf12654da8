//! Auth state and configuration.

use chrono_tz::Tz;
use secrecy::SecretString;
use std::sync::Arc;

use super::rate_limit::RateLimiter;
use crate::api::email::EmailSender;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_REMEMBER_TTL_DAYS: i64 = 30;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: i64 = 60;
const DEFAULT_LOGIN_IP_MAX_ATTEMPTS: i64 = 30;
const DEFAULT_LOGIN_EMAIL_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_RESET_REQUEST_MAX_ATTEMPTS: i64 = 3;
const DEFAULT_CHANGE_PASSWORD_MAX_ATTEMPTS: i64 = 3;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    remember_ttl_days: i64,
    rate_limit_window_seconds: i64,
    login_ip_max_attempts: i64,
    login_email_max_attempts: i64,
    reset_request_max_attempts: i64,
    change_password_max_attempts: i64,
    turnstile_secret: Option<SecretString>,
    timezone: Tz,
    sweep_interval_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            remember_ttl_days: DEFAULT_REMEMBER_TTL_DAYS,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            login_ip_max_attempts: DEFAULT_LOGIN_IP_MAX_ATTEMPTS,
            login_email_max_attempts: DEFAULT_LOGIN_EMAIL_MAX_ATTEMPTS,
            reset_request_max_attempts: DEFAULT_RESET_REQUEST_MAX_ATTEMPTS,
            change_password_max_attempts: DEFAULT_CHANGE_PASSWORD_MAX_ATTEMPTS,
            turnstile_secret: None,
            timezone: chrono_tz::Asia::Tehran,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_remember_ttl_days(mut self, days: i64) -> Self {
        self.remember_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window_seconds(mut self, seconds: i64) -> Self {
        self.rate_limit_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_ip_max_attempts(mut self, attempts: i64) -> Self {
        self.login_ip_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_login_email_max_attempts(mut self, attempts: i64) -> Self {
        self.login_email_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_reset_request_max_attempts(mut self, attempts: i64) -> Self {
        self.reset_request_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_change_password_max_attempts(mut self, attempts: i64) -> Self {
        self.change_password_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_turnstile_secret(mut self, secret: SecretString) -> Self {
        self.turnstile_secret = Some(secret);
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn remember_ttl_days(&self) -> i64 {
        self.remember_ttl_days
    }

    pub(crate) fn rate_limit_window_seconds(&self) -> i64 {
        self.rate_limit_window_seconds
    }

    pub(super) fn login_ip_max_attempts(&self) -> i64 {
        self.login_ip_max_attempts
    }

    pub(super) fn login_email_max_attempts(&self) -> i64 {
        self.login_email_max_attempts
    }

    pub(super) fn reset_request_max_attempts(&self) -> i64 {
        self.reset_request_max_attempts
    }

    pub(super) fn change_password_max_attempts(&self) -> i64 {
        self.change_password_max_attempts
    }

    pub(super) fn turnstile_secret(&self) -> Option<&SecretString> {
        self.turnstile_secret.as_ref()
    }

    pub(super) fn timezone(&self) -> Tz {
        self.timezone
    }

    pub(crate) fn sweep_interval_seconds(&self) -> u64 {
        self.sweep_interval_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    email: Arc<dyn EmailSender>,
    http: reqwest::Client,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        rate_limiter: Arc<dyn RateLimiter>,
        email: Arc<dyn EmailSender>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            email,
            http,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn email_sender(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::{AuthConfig, AuthState};
    use crate::api::email::LogEmailSender;
    use secrecy::SecretString;
    use std::sync::Arc;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://verki.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://verki.dev");
        assert_eq!(
            config.session_ttl_seconds(),
            super::DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(
            config.reset_token_ttl_seconds(),
            super::DEFAULT_RESET_TOKEN_TTL_SECONDS
        );
        assert_eq!(config.remember_ttl_days(), super::DEFAULT_REMEMBER_TTL_DAYS);
        assert_eq!(
            config.rate_limit_window_seconds(),
            super::DEFAULT_RATE_LIMIT_WINDOW_SECONDS
        );
        assert_eq!(
            config.login_ip_max_attempts(),
            super::DEFAULT_LOGIN_IP_MAX_ATTEMPTS
        );
        assert_eq!(
            config.login_email_max_attempts(),
            super::DEFAULT_LOGIN_EMAIL_MAX_ATTEMPTS
        );
        assert!(config.turnstile_secret().is_none());
        assert_eq!(config.timezone(), chrono_tz::Asia::Tehran);

        let config = config
            .with_session_ttl_seconds(120)
            .with_reset_token_ttl_seconds(300)
            .with_remember_ttl_days(7)
            .with_rate_limit_window_seconds(30)
            .with_login_ip_max_attempts(10)
            .with_login_email_max_attempts(2)
            .with_reset_request_max_attempts(1)
            .with_change_password_max_attempts(1)
            .with_turnstile_secret(SecretString::from("secret"))
            .with_timezone(chrono_tz::Europe::Amsterdam)
            .with_sweep_interval_seconds(3600);

        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.reset_token_ttl_seconds(), 300);
        assert_eq!(config.remember_ttl_days(), 7);
        assert_eq!(config.rate_limit_window_seconds(), 30);
        assert_eq!(config.login_ip_max_attempts(), 10);
        assert_eq!(config.login_email_max_attempts(), 2);
        assert_eq!(config.reset_request_max_attempts(), 1);
        assert_eq!(config.change_password_max_attempts(), 1);
        assert!(config.turnstile_secret().is_some());
        assert_eq!(config.timezone(), chrono_tz::Europe::Amsterdam);
        assert_eq!(config.sweep_interval_seconds(), 3600);
    }

    #[test]
    fn session_cookie_secure_follows_frontend_scheme() {
        let https = AuthConfig::new("https://verki.dev".to_string());
        assert!(https.session_cookie_secure());

        let http = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!http.session_cookie_secure());
    }

    #[test]
    fn auth_state_constructs_with_noop_rate_limiter() {
        let config = AuthConfig::new("https://verki.dev".to_string());
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        let state = AuthState::new(
            config,
            limiter,
            Arc::new(LogEmailSender),
            reqwest::Client::new(),
        );
        assert_eq!(state.config().frontend_base_url(), "https://verki.dev");
    }
}
