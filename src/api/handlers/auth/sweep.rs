//! Periodic deletion of expired credential rows.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{Instrument, error, info};

use super::state::AuthConfig;

/// Run one sweep per configured interval until the process exits.
pub(crate) fn spawn_sweeper(pool: PgPool, config: &AuthConfig) {
    let interval = Duration::from_secs(config.sweep_interval_seconds().max(60));
    let remember_ttl_days = config.remember_ttl_days();
    tokio::spawn(async move {
        loop {
            match sweep_once(&pool, remember_ttl_days).await {
                Ok(counts) => info!(
                    reset_tokens = counts.reset_tokens,
                    sessions = counts.sessions,
                    rate_windows = counts.rate_windows,
                    remember_tokens = counts.remember_tokens,
                    "Maintenance sweep complete"
                ),
                Err(err) => error!("Maintenance sweep failed: {err}"),
            }
            tokio::time::sleep(interval).await;
        }
    });
}

#[derive(Debug, Default)]
struct SweepCounts {
    reset_tokens: u64,
    sessions: u64,
    rate_windows: u64,
    remember_tokens: u64,
}

/// Deleting a row another request is consuming is safe: consumption runs in
/// its own transaction and simply finds no row.
async fn sweep_once(pool: &PgPool, remember_ttl_days: i64) -> Result<SweepCounts> {
    let counts = SweepCounts {
        reset_tokens: delete_where(pool, "DELETE FROM reset_passwords WHERE expires_at <= NOW()")
            .await?,
        sessions: delete_where(pool, "DELETE FROM sessions WHERE expires_at <= NOW()").await?,
        rate_windows: delete_where(pool, "DELETE FROM rate_limits WHERE window_ends_at <= NOW()")
            .await?,
        remember_tokens: delete_idle_remember_tokens(pool, remember_ttl_days).await?,
    };
    Ok(counts)
}

async fn delete_where(pool: &PgPool, query: &str) -> Result<u64> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired rows")?;

    Ok(result.rows_affected())
}

/// Mirrors the sliding window the lookup enforces, so a swept row is one
/// the lookup would already have refused.
async fn delete_idle_remember_tokens(pool: &PgPool, ttl_days: i64) -> Result<u64> {
    let query = r"
        DELETE FROM remember_tokens
        WHERE last_used_at <= NOW() - ($1 * INTERVAL '1 day')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(ttl_days)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete idle remember tokens")?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::sweep_once;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    #[tokio::test]
    async fn sweep_errors_on_unreachable_database() -> Result<()> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://verki@127.0.0.1:1/verki")?;
        assert!(sweep_once(&pool, 30).await.is_err());
        Ok(())
    }
}
