//! Database helpers for users, sessions, and credential tokens.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{
    generate_csrf_token, generate_remember_token, generate_reset_token, generate_session_token,
    hash_token, is_unique_violation,
};

/// Minimal fields needed to verify a login attempt.
pub(super) struct UserRecord {
    pub(super) id: Uuid,
    pub(super) email: String,
    pub(super) password_hash: String,
}

/// Minimal data returned for a valid session cookie.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) csrf_token: String,
    pub(crate) expires_at: DateTime<Utc>,
}

/// Raw values for a freshly created session. Only hashes reach the database.
pub(super) struct NewSession {
    pub(super) token: String,
    pub(super) csrf_token: String,
}

/// Outstanding password reset request for a user.
pub(super) struct ResetRecord {
    pub(super) token_hash: Vec<u8>,
    pub(super) expires_at: DateTime<Utc>,
}

/// Remember-device row joined with its owner.
pub(super) struct RememberRecord {
    pub(super) id: Uuid,
    pub(super) user_id: Uuid,
    pub(super) email: String,
}

/// Look up login data by normalized email.
pub(super) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, password_hash FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
    }))
}

/// Create a session row, optionally replacing a stale one in the same
/// transaction so a presented cookie can never keep its old identifier.
/// Returns the raw token pair for the caller to hand to the client.
pub(super) async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
    replace_hash: Option<&[u8]>,
) -> Result<NewSession> {
    let insert = r"
        INSERT INTO sessions (user_id, token_hash, csrf_token, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";

    for _ in 0..3 {
        let token = generate_session_token()?;
        let csrf_token = generate_csrf_token()?;
        let token_hash = hash_token(&token);

        let mut tx = pool.begin().await.context("begin session transaction")?;

        if let Some(stale) = replace_hash {
            let query = "DELETE FROM sessions WHERE token_hash = $1";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(stale)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to delete stale session")?;
        }

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = insert
        );
        let result = sqlx::query(insert)
            .bind(user_id)
            .bind(&token_hash)
            .bind(&csrf_token)
            .bind(ttl_seconds)
            .execute(&mut *tx)
            .instrument(span)
            .await;

        match result {
            Ok(_) => {
                tx.commit().await.context("commit session transaction")?;
                return Ok(NewSession { token, csrf_token });
            }
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
            }
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(super) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Only unexpired sessions count; expiry rows are swept separately.
    let query = r"
        SELECT users.id, users.email, sessions.csrf_token, sessions.expires_at
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        WHERE sessions.token_hash = $1
          AND sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    if row.is_none() {
        return Ok(None);
    }

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE sessions
        SET last_seen_at = NOW()
        WHERE token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        csrf_token: row.get("csrf_token"),
        expires_at: row.get("expires_at"),
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM sessions WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(super) async fn delete_all_sessions_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    let query = "DELETE FROM sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user sessions")?;
    Ok(result.rows_affected())
}

/// Create (or replace) the outstanding reset request for a user and return
/// the raw token for email delivery. Only the hash is stored.
pub(super) async fn create_reset_token(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let token = generate_reset_token()?;
    let token_hash = hash_token(&token);

    // A new request replaces any previous one; old tokens stop working.
    let query = r"
        INSERT INTO reset_passwords (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        ON CONFLICT (user_id) DO UPDATE
        SET token_hash = EXCLUDED.token_hash,
            expires_at = EXCLUDED.expires_at,
            created_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store reset token")?;

    Ok(token)
}

pub(super) async fn lookup_reset_record(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<ResetRecord>> {
    let query = "SELECT token_hash, expires_at FROM reset_passwords WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup reset record")?;

    Ok(row.map(|row| ResetRecord {
        token_hash: row.get("token_hash"),
        expires_at: row.get("expires_at"),
    }))
}

/// Apply a password change and revoke every device in one transaction:
/// the reset record, all sessions, and all remember tokens go together,
/// and the notification mail is queued atomically with the change.
pub(super) async fn rotate_password_and_clear_devices(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
    new_password_hash: &str,
    changed_at_utc: &str,
    changed_at_local: &str,
    timezone: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin password rotation")?;

    let query = r"
        UPDATE users
        SET password_hash = $2,
            password_changed_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    for query in [
        "DELETE FROM reset_passwords WHERE user_id = $1",
        "DELETE FROM sessions WHERE user_id = $1",
        "DELETE FROM remember_tokens WHERE user_id = $1",
    ] {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to revoke credentials")?;
    }

    // Notification only; the payload never carries tokens or passwords.
    let payload_json = json!({
        "email": email,
        "changed_at_utc": changed_at_utc,
        "changed_at_local": changed_at_local,
        "timezone": timezone,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind("password_changed")
        .bind(payload_text)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    tx.commit().await.context("commit password rotation")?;

    Ok(())
}

/// Create a remember-device row and return the raw token for the cookie.
pub(super) async fn create_remember_token(
    pool: &PgPool,
    user_id: Uuid,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<String> {
    let query = r"
        INSERT INTO remember_tokens (user_id, token_hash, ip_address, user_agent)
        VALUES ($1, $2, $3::inet, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_remember_token()?;
        let token_hash = hash_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ip)
            .bind(user_agent)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert remember token"),
        }
    }

    Err(anyhow!("failed to generate unique remember token"))
}

/// Find a live remember-device row. Validity slides: a token counts as live
/// while its last use is within the TTL.
pub(super) async fn lookup_remember_token(
    pool: &PgPool,
    token_hash: &[u8],
    ttl_days: i64,
) -> Result<Option<RememberRecord>> {
    let query = r"
        SELECT remember_tokens.id, users.id AS user_id, users.email
        FROM remember_tokens
        JOIN users ON users.id = remember_tokens.user_id
        WHERE remember_tokens.token_hash = $1
          AND remember_tokens.last_used_at > NOW() - ($2 * INTERVAL '1 day')
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(ttl_days)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup remember token")?;

    Ok(row.map(|row| RememberRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        email: row.get("email"),
    }))
}

/// Slide the remember window and record the latest client address.
pub(super) async fn touch_remember_token(
    pool: &PgPool,
    id: Uuid,
    ip: Option<&str>,
) -> Result<()> {
    let query = r"
        UPDATE remember_tokens
        SET last_used_at = NOW(),
            ip_address = COALESCE($2::inet, ip_address)
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(ip)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to refresh remember token")?;
    Ok(())
}

pub(super) async fn delete_remember_token(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "DELETE FROM remember_tokens WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete remember token")?;
    Ok(())
}

pub(super) async fn delete_all_remember_tokens_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<u64> {
    let query = "DELETE FROM remember_tokens WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user remember tokens")?;
    Ok(result.rows_affected())
}
