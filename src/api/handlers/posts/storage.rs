//! SQL storage for posts.
//!
//! Every statement filters by `user_id` as well as post id, so a caller can
//! never observe another user's rows. Slug collisions surface as unique
//! violations and are retried with numeric suffixes.

use axum::{http::StatusCode, response::IntoResponse};
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Instrument, error};
use ulid::Ulid;
use uuid::Uuid;

use super::{
    slug::with_suffix,
    types::{PostResponse, PostStatus},
};

/// One owned post as stored, typed for the merge logic in handlers.
#[derive(Debug)]
pub(super) struct PostRow {
    pub(super) id: String,
    pub(super) title: String,
    pub(super) slug: String,
    pub(super) excerpt: Option<String>,
    pub(super) body: Option<String>,
    pub(super) status: PostStatus,
    pub(super) publish_date: Option<NaiveDate>,
    pub(super) featured_image_path: Option<String>,
    pub(super) created_at: String,
    pub(super) updated_at: String,
}

impl PostRow {
    pub(super) fn to_response(&self) -> PostResponse {
        PostResponse {
            id: self.id.clone(),
            title: self.title.clone(),
            slug: self.slug.clone(),
            excerpt: self.excerpt.clone(),
            body: self.body.clone(),
            status: self.status.as_str().to_string(),
            publish_date: self
                .publish_date
                .map(|date| date.format("%Y-%m-%d").to_string()),
            featured_image_path: self.featured_image_path.clone(),
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Full effective state applied by an update; the handler merges the
/// request into the stored row before calling storage.
#[derive(Debug)]
pub(super) struct PostUpdate {
    pub(super) title: String,
    pub(super) slug: String,
    pub(super) excerpt: Option<String>,
    pub(super) body: Option<String>,
    pub(super) status: PostStatus,
    pub(super) publish_date: Option<NaiveDate>,
}

#[derive(Debug, thiserror::Error)]
pub(super) enum PostError {
    #[error("{0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for PostError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Conflict(message) => (StatusCode::CONFLICT, message).into_response(),
            Self::Database(err) => {
                error!("Database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Insert a fresh draft owned by `user_id`, suffixing the slug until it is
/// unique.
pub(super) async fn create_post_record(
    pool: &PgPool,
    user_id: Uuid,
    title: &str,
    base_slug: &str,
) -> Result<PostResponse, PostError> {
    let id = Ulid::new().to_string();
    let query = r#"
        INSERT INTO posts (id, user_id, title, slug)
        VALUES ($1, $2, $3, $4)
        RETURNING id, title, slug, excerpt, body, status, publish_date,
            featured_image_path,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;

    let mut attempt = 0;
    loop {
        let slug = if attempt == 0 {
            base_slug.to_string()
        } else {
            let Some(slug) = with_suffix(base_slug, attempt + 1) else {
                return Err(PostError::Conflict("Post slug is unavailable"));
            };
            slug
        };

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let inserted = sqlx::query(query)
            .bind(&id)
            .bind(user_id)
            .bind(title)
            .bind(&slug)
            .fetch_one(pool)
            .instrument(span)
            .await;

        match inserted {
            Ok(row) => return Ok(post_from_row(&row).to_response()),
            Err(err) if is_slug_unique_violation(&err) => attempt += 1,
            Err(err) => return Err(PostError::Database(err)),
        }
    }
}

pub(super) async fn fetch_posts_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<PostResponse>, sqlx::Error> {
    let query = r#"
        SELECT id, title, slug, excerpt, body, status, publish_date,
            featured_image_path,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM posts
        WHERE user_id = $1
        ORDER BY created_at DESC
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await?;

    Ok(rows
        .iter()
        .map(|row| post_from_row(row).to_response())
        .collect())
}

pub(super) async fn fetch_post(
    pool: &PgPool,
    user_id: Uuid,
    post_id: &str,
) -> Result<Option<PostRow>, sqlx::Error> {
    let query = r#"
        SELECT id, title, slug, excerpt, body, status, publish_date,
            featured_image_path,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
        FROM posts
        WHERE id = $1 AND user_id = $2
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    Ok(row.map(|row| post_from_row(&row)))
}

/// Apply the merged state. Returns `None` when the row is gone (treated as
/// 404 by the caller); slug collisions are suffixed and retried.
pub(super) async fn update_post_record(
    pool: &PgPool,
    user_id: Uuid,
    post_id: &str,
    update: &PostUpdate,
) -> Result<Option<PostResponse>, PostError> {
    let query = r#"
        UPDATE posts
        SET title = $3, slug = $4, excerpt = $5, body = $6, status = $7,
            publish_date = $8, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING id, title, slug, excerpt, body, status, publish_date,
            featured_image_path,
            to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
            to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
    "#;

    let mut attempt = 0;
    loop {
        let slug = if attempt == 0 {
            update.slug.clone()
        } else {
            let Some(slug) = with_suffix(&update.slug, attempt + 1) else {
                return Err(PostError::Conflict("Post slug is unavailable"));
            };
            slug
        };

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let updated = sqlx::query(query)
            .bind(post_id)
            .bind(user_id)
            .bind(&update.title)
            .bind(&slug)
            .bind(update.excerpt.as_deref())
            .bind(update.body.as_deref())
            .bind(update.status.as_str())
            .bind(update.publish_date)
            .fetch_optional(pool)
            .instrument(span)
            .await;

        match updated {
            Ok(Some(row)) => return Ok(Some(post_from_row(&row).to_response())),
            Ok(None) => return Ok(None),
            Err(err) if is_slug_unique_violation(&err) => attempt += 1,
            Err(err) => return Err(PostError::Database(err)),
        }
    }
}

/// Point the post at a new stored object (or none). Returns `false` when
/// the row is gone.
pub(super) async fn set_featured_image(
    pool: &PgPool,
    user_id: Uuid,
    post_id: &str,
    path: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let query = r"
        UPDATE posts
        SET featured_image_path = $3, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(post_id)
        .bind(user_id)
        .bind(path)
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(result.rows_affected() > 0)
}

fn post_from_row(row: &PgRow) -> PostRow {
    let status: String = row.get("status");
    PostRow {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        excerpt: row.get("excerpt"),
        body: row.get("body"),
        // The CHECK constraint on `posts.status` keeps this total.
        status: PostStatus::parse(&status).unwrap_or(PostStatus::Draft),
        publish_date: row.get("publish_date"),
        featured_image_path: row.get("featured_image_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// SQLSTATE `23505` on the post slug constraint specifically; id collisions
/// are not retried.
fn is_slug_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                && db_err.constraint().is_some_and(|c| c == "posts_slug_key")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{PostRow, fetch_post};
    use crate::api::handlers::posts::types::PostStatus;
    use anyhow::Result;
    use chrono::NaiveDate;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn post_row_renders_response_fields() -> Result<()> {
        let row = PostRow {
            id: "01JAR0S9V5X2B7M4N8PQ3T0ZDE".to_string(),
            title: "A title long enough".to_string(),
            slug: "a-title-long-enough".to_string(),
            excerpt: None,
            body: Some("b".repeat(100)),
            status: PostStatus::Scheduled,
            publish_date: NaiveDate::from_ymd_opt(2026, 1, 7),
            featured_image_path: Some("post/featured_image/x.webp".to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-02T00:00:00Z".to_string(),
        };

        let response = row.to_response();
        assert_eq!(response.status, "scheduled");
        assert_eq!(response.publish_date.as_deref(), Some("2026-01-07"));
        assert_eq!(response.excerpt, None);
        assert_eq!(response.created_at, "2026-01-01T00:00:00Z");
        Ok(())
    }

    #[tokio::test]
    async fn fetch_post_errors_on_unreachable_database() -> Result<()> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://verki@127.0.0.1:1/verki")?;
        assert!(
            fetch_post(&pool, Uuid::new_v4(), "01JAR0S9V5X2B7M4N8PQ3T0ZDE")
                .await
                .is_err()
        );
        Ok(())
    }
}
