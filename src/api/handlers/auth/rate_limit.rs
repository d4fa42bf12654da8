//! Rate limiting primitives for auth flows.
//!
//! Counters are fixed windows persisted in the `rate_limits` table so limits
//! hold across service instances. A counter that cannot be reached counts as
//! limited (fail closed).

use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use tracing::{Instrument, error};

/// Boxed future so `RateLimiter` stays usable as a trait object.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: i64 },
}

pub trait RateLimiter: Send + Sync {
    /// Record an attempt under `key` and decide whether the current window
    /// now exceeds `max_attempts`.
    fn too_many_attempts<'a>(
        &'a self,
        key: &'a str,
        max_attempts: i64,
    ) -> BoxFuture<'a, RateLimitDecision>;

    /// Forget all attempts recorded under `key`.
    fn clear<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;

    /// Seconds until the window for `key` resets. Zero when no live window exists.
    fn available_in<'a>(&'a self, key: &'a str) -> BoxFuture<'a, i64>;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn too_many_attempts<'a>(
        &'a self,
        _key: &'a str,
        _max_attempts: i64,
    ) -> BoxFuture<'a, RateLimitDecision> {
        Box::pin(async { RateLimitDecision::Allowed })
    }

    fn clear<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn available_in<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, i64> {
        Box::pin(async { 0 })
    }
}

/// Postgres-backed fixed-window limiter shared by all auth flows.
#[derive(Clone, Debug)]
pub struct PgRateLimiter {
    pool: PgPool,
    window_seconds: i64,
}

impl PgRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool, window_seconds: i64) -> Self {
        Self {
            pool,
            window_seconds,
        }
    }

    /// Record one attempt and return `(attempts, retry_after_seconds)` for
    /// the window the attempt landed in. A single round trip: expired windows
    /// restart at one attempt, live windows increment.
    async fn record_attempt(&self, key: &str) -> Result<(i64, i64), sqlx::Error> {
        let query = r"
            INSERT INTO rate_limits (key, attempts, window_ends_at)
            VALUES ($1, 1, NOW() + ($2::DOUBLE PRECISION * INTERVAL '1 second'))
            ON CONFLICT (key) DO UPDATE
            SET attempts = CASE
                    WHEN rate_limits.window_ends_at <= NOW() THEN 1
                    ELSE rate_limits.attempts + 1
                END,
                window_ends_at = CASE
                    WHEN rate_limits.window_ends_at <= NOW()
                        THEN NOW() + ($2::DOUBLE PRECISION * INTERVAL '1 second')
                    ELSE rate_limits.window_ends_at
                END
            RETURNING attempts,
                GREATEST(CEIL(EXTRACT(EPOCH FROM (window_ends_at - NOW())))::BIGINT, 0)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(self.window_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok((row.get(0), row.get(1)))
    }
}

impl RateLimiter for PgRateLimiter {
    fn too_many_attempts<'a>(
        &'a self,
        key: &'a str,
        max_attempts: i64,
    ) -> BoxFuture<'a, RateLimitDecision> {
        Box::pin(async move {
            match self.record_attempt(key).await {
                Ok((attempts, retry_after_seconds)) => {
                    if attempts > max_attempts {
                        RateLimitDecision::Limited {
                            retry_after_seconds,
                        }
                    } else {
                        RateLimitDecision::Allowed
                    }
                }
                Err(err) => {
                    error!("Rate limit check failed: {err}");
                    // Fail closed
                    RateLimitDecision::Limited {
                        retry_after_seconds: self.window_seconds,
                    }
                }
            }
        })
    }

    fn clear<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let query = "DELETE FROM rate_limits WHERE key = $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            if let Err(err) = sqlx::query(query)
                .bind(key)
                .execute(&self.pool)
                .instrument(span)
                .await
            {
                error!("Failed to clear rate limit counter: {err}");
            }
        })
    }

    fn available_in<'a>(&'a self, key: &'a str) -> BoxFuture<'a, i64> {
        Box::pin(async move {
            let query = r"
                SELECT GREATEST(CEIL(EXTRACT(EPOCH FROM (window_ends_at - NOW())))::BIGINT, 0)
                FROM rate_limits
                WHERE key = $1 AND window_ends_at > NOW()
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            match sqlx::query(query)
                .bind(key)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
            {
                Ok(row) => row.map_or(0, |row| row.get(0)),
                Err(err) => {
                    error!("Rate limit lookup failed: {err}");
                    self.window_seconds
                }
            }
        })
    }
}

/// Key for the coarse per-IP window.
pub(super) fn ip_key(purpose: &str, ip: &str) -> String {
    format!("{purpose}.ip.{ip}")
}

/// Key for the tight per-IP-and-email window. The email is hashed so
/// addresses never appear in the counters table.
pub(super) fn ip_email_key(purpose: &str, ip: &str, email_normalized: &str) -> String {
    let digest = Sha256::digest(format!("{purpose}:{email_normalized}").as_bytes());
    let hex = digest.iter().fold(String::new(), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    });
    format!("{purpose}.{ip}.{hex}")
}

/// User-facing message for throttled requests.
pub(super) fn limited_message(retry_after_seconds: i64) -> String {
    format!("Too many requests have been sent. try again in {retry_after_seconds} seconds.")
}
