//! Post CRUD and featured image endpoints.
//!
//! Mutating routes require the session CSRF header on top of the session
//! cookie. Reads require only the session. Every storage call is scoped by
//! the caller's user id, so a foreign post id returns 404.

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::super::auth::guards::{require_session, require_session_csrf};
use super::super::auth::types::MessageResponse;
use super::{
    BODY_MAX, BODY_MIN, DEFAULT_TITLE, EXCERPT_MAX, IMAGE_MAX_BYTES, IMAGE_MIN_BYTES, TITLE_MAX,
    TITLE_MIN,
    media::{MediaState, featured_image_path},
    slug::slug_from_title,
    storage::{
        PostRow, PostUpdate, create_post_record, fetch_post, fetch_posts_for_user,
        set_featured_image, update_post_record,
    },
    types::{FeaturedImageResponse, PostResponse, PostStatus, UpdatePostRequest},
};

#[utoipa::path(
    get,
    path = "/post",
    responses(
        (status = 200, description = "The caller's posts, newest first.", body = [PostResponse]),
        (status = 401, description = "Missing or invalid session cookie."),
    ),
    tag = "posts"
)]
/// Lists every post owned by the caller.
pub async fn list_posts(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let session = match require_session(&headers, &pool).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match fetch_posts_for_user(&pool, session.user_id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => {
            error!("Failed to list posts: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/post",
    responses(
        (status = 201, description = "Draft created.", body = PostResponse),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Missing or invalid CSRF token."),
        (status = 409, description = "No free slug for the draft title.", body = String),
    ),
    tag = "posts"
)]
/// Creates an untitled draft owned by the caller. The payload-free POST
/// mirrors an editor's "new post" button; content arrives via update.
pub async fn create_post(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    let session = match require_session_csrf(&headers, &pool).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let Some(base_slug) = slug_from_title(DEFAULT_TITLE) else {
        error!("Draft title produced no slug");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    match create_post_record(&pool, session.user_id, DEFAULT_TITLE, &base_slug).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/post/{id}",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post detail.", body = PostResponse),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 404, description = "Post not found."),
    ),
    tag = "posts"
)]
/// Fetches one of the caller's posts by id.
pub async fn get_post(
    Path(post_id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let session = match require_session(&headers, &pool).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match fetch_post(&pool, session.user_id, &post_id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(row.to_response())).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to get post: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/post/{id}",
    request_body = UpdatePostRequest,
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated.", body = PostResponse),
        (status = 400, description = "Validation error.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Missing or invalid CSRF token."),
        (status = 404, description = "Post not found."),
        (status = 409, description = "No free slug for the new title.", body = String),
    ),
    tag = "posts"
)]
/// Applies a partial update to one of the caller's posts. Absent fields
/// keep their stored value; the slug is re-derived when the title changes.
pub async fn update_post(
    Path(post_id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<UpdatePostRequest>>,
) -> impl IntoResponse {
    let session = match require_session_csrf(&headers, &pool).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let request: UpdatePostRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let existing = match fetch_post(&pool, session.user_id, &post_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to resolve post for update: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let update = match merge_update(&existing, &request) {
        Ok(update) => update,
        Err(rejection) => return rejection.into_response(),
    };

    match update_post_record(&pool, session.user_id, &post_id, &update).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/post/{id}/featured-image",
    request_body(content = Vec<u8>, description = "Raw image bytes.", content_type = "image/*"),
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Image stored.", body = FeaturedImageResponse),
        (status = 400, description = "Unsupported type or size.", body = String),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Missing or invalid CSRF token."),
        (status = 404, description = "Post not found."),
        (status = 422, description = "Image could not be processed.", body = MessageResponse),
    ),
    tag = "posts"
)]
/// Replaces the post's cover image. Uploaded bytes are re-encoded to a
/// fixed-size `WebP` cover before storage; the previous object is deleted
/// only after the database points at the new one.
pub async fn upload_featured_image(
    Path(post_id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    media: Extension<Arc<MediaState>>,
    body: Bytes,
) -> impl IntoResponse {
    let session = match require_session_csrf(&headers, &pool).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    if !is_supported_image(&headers) {
        return (StatusCode::BAD_REQUEST, "Unsupported image type".to_string()).into_response();
    }
    if body.len() < IMAGE_MIN_BYTES {
        return (StatusCode::BAD_REQUEST, "Image is too small".to_string()).into_response();
    }
    if body.len() > IMAGE_MAX_BYTES {
        return (StatusCode::BAD_REQUEST, "Image is too large".to_string()).into_response();
    }

    let existing = match fetch_post(&pool, session.user_id, &post_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to resolve post for image upload: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Decoding and re-encoding megabytes of pixels would stall the
    // runtime; hand it to a blocking thread.
    let transformer = media.transformer();
    let encoded = match tokio::task::spawn_blocking(move || transformer.transform(&body)).await {
        Ok(Ok(encoded)) => encoded,
        Ok(Err(err)) => {
            error!("Failed to transform featured image: {err}");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(MessageResponse::new(
                    "Failed to process image. try a different file.",
                )),
            )
                .into_response();
        }
        Err(err) => {
            error!("Image transform task failed: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let path = featured_image_path(session.user_id);
    if let Err(err) = media.store().put(&path, &encoded).await {
        error!("Failed to store featured image: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match set_featured_image(&pool, session.user_id, &post_id, Some(&path)).await {
        Ok(true) => {}
        Ok(false) => {
            // Row vanished between fetch and update; drop the orphan object.
            if let Err(err) = media.store().delete(&path).await {
                error!("Failed to remove orphaned featured image: {err}");
            }
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(err) => {
            error!("Failed to record featured image: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if let Some(previous) = existing.featured_image_path.as_deref() {
        // The database already points at the new object; a stale file is
        // only a cleanup concern.
        if let Err(err) = media.store().delete(previous).await {
            error!("Failed to delete replaced featured image: {err}");
        }
    }

    (
        StatusCode::OK,
        Json(FeaturedImageResponse {
            featured_image_path: path,
        }),
    )
        .into_response()
}

#[utoipa::path(
    delete,
    path = "/post/{id}/featured-image",
    params(("id" = String, Path, description = "Post id")),
    responses(
        (status = 200, description = "Image removed (or none was set).", body = MessageResponse),
        (status = 401, description = "Missing or invalid session cookie."),
        (status = 403, description = "Missing or invalid CSRF token."),
        (status = 404, description = "Post not found."),
    ),
    tag = "posts"
)]
pub async fn remove_featured_image(
    Path(post_id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    media: Extension<Arc<MediaState>>,
) -> impl IntoResponse {
    let session = match require_session_csrf(&headers, &pool).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    let existing = match fetch_post(&pool, session.user_id, &post_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to resolve post for image removal: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Some(previous) = existing.featured_image_path.as_deref() {
        match set_featured_image(&pool, session.user_id, &post_id, None).await {
            Ok(true) => {}
            Ok(false) => return StatusCode::NOT_FOUND.into_response(),
            Err(err) => {
                error!("Failed to clear featured image: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
        if let Err(err) = media.store().delete(previous).await {
            error!("Failed to delete removed featured image: {err}");
        }
    }

    (
        StatusCode::OK,
        Json(MessageResponse::new("Featured image has been removed.")),
    )
        .into_response()
}

/// Merge a partial update onto the stored row, validating every presented
/// field. Stored values are trusted; only what the request changes is
/// checked against the authoring rules.
fn merge_update(
    existing: &PostRow,
    request: &UpdatePostRequest,
) -> Result<PostUpdate, (StatusCode, String)> {
    let (title, slug) = match request.title.as_deref().map(str::trim) {
        Some(value) if value != existing.title => {
            if !(TITLE_MIN..=TITLE_MAX).contains(&value.chars().count()) {
                return Err((StatusCode::BAD_REQUEST, "Invalid title".to_string()));
            }
            let Some(slug) = slug_from_title(value) else {
                return Err((StatusCode::BAD_REQUEST, "Invalid title".to_string()));
            };
            (value.to_string(), slug)
        }
        _ => (existing.title.clone(), existing.slug.clone()),
    };

    let excerpt = match request.excerpt.as_deref().map(str::trim) {
        Some("") => None,
        Some(value) => {
            if value.chars().count() > EXCERPT_MAX {
                return Err((StatusCode::BAD_REQUEST, "Invalid excerpt".to_string()));
            }
            Some(value.to_string())
        }
        None => existing.excerpt.clone(),
    };

    let body = match request.body.as_deref() {
        Some(value) => {
            if !(BODY_MIN..=BODY_MAX).contains(&value.chars().count()) {
                return Err((StatusCode::BAD_REQUEST, "Invalid body".to_string()));
            }
            Some(value.to_string())
        }
        None => existing.body.clone(),
    };

    let status = match request.status.as_deref().map(str::trim) {
        Some(value) => match PostStatus::parse(value) {
            Some(status) => status,
            None => return Err((StatusCode::BAD_REQUEST, "Invalid status".to_string())),
        },
        None => existing.status,
    };

    let publish_date = match request.publish_date.as_deref().map(str::trim) {
        Some(value) => {
            let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
                return Err((StatusCode::BAD_REQUEST, "Invalid publish date".to_string()));
            };
            if date < Utc::now().date_naive() {
                return Err((
                    StatusCode::BAD_REQUEST,
                    "Publish date must be today or later".to_string(),
                ));
            }
            Some(date)
        }
        None => existing.publish_date,
    };

    // Scheduling is meaningless without a date; stored dates may be in the
    // past once the publish day has gone by, which is fine.
    if status == PostStatus::Scheduled && publish_date.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Publish date is required for scheduled posts".to_string(),
        ));
    }

    Ok(PostUpdate {
        title,
        slug,
        excerpt,
        body,
        status,
        publish_date,
    })
}

/// Covers are re-encoded from raster data; SVG is a document format and
/// never decodable here.
fn is_supported_image(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let content_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    content_type.starts_with("image/") && content_type != "image/svg+xml"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://verki@127.0.0.1:1/verki")
            .unwrap()
    }

    fn stored_post() -> PostRow {
        PostRow {
            id: "01JAR1C4F8H2K6M0P4R8T2W6YA".to_string(),
            title: "A stored post title".to_string(),
            slug: "a-stored-post-title".to_string(),
            excerpt: Some("A short excerpt.".to_string()),
            body: Some("b".repeat(150)),
            status: PostStatus::Draft,
            publish_date: None,
            featured_image_path: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn empty_request() -> UpdatePostRequest {
        UpdatePostRequest {
            title: None,
            excerpt: None,
            body: None,
            status: None,
            publish_date: None,
        }
    }

    fn today() -> String {
        Utc::now().date_naive().format("%Y-%m-%d").to_string()
    }

    #[test]
    fn merge_keeps_stored_values_for_absent_fields() {
        let existing = stored_post();
        let update = merge_update(&existing, &empty_request()).unwrap();

        assert_eq!(update.title, existing.title);
        assert_eq!(update.slug, existing.slug);
        assert_eq!(update.excerpt, existing.excerpt);
        assert_eq!(update.body, existing.body);
        assert_eq!(update.status, PostStatus::Draft);
        assert_eq!(update.publish_date, None);
    }

    #[test]
    fn merge_rederives_slug_when_title_changes() {
        let mut request = empty_request();
        request.title = Some("A Brand New Headline!".to_string());

        let update = merge_update(&stored_post(), &request).unwrap();
        assert_eq!(update.title, "A Brand New Headline!");
        assert_eq!(update.slug, "a-brand-new-headline");
    }

    #[test]
    fn merge_keeps_slug_when_title_is_unchanged() {
        let mut existing = stored_post();
        // A suffixed slug from creation must survive no-op title submits.
        existing.slug = "a-stored-post-title-2".to_string();
        let mut request = empty_request();
        request.title = Some("A stored post title".to_string());

        let update = merge_update(&existing, &request).unwrap();
        assert_eq!(update.slug, "a-stored-post-title-2");
    }

    #[test]
    fn merge_rejects_bad_titles() {
        let mut request = empty_request();
        request.title = Some("Too short".to_string());
        let (status, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Invalid title");

        request.title = Some("t".repeat(101));
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Invalid title");

        request.title = Some("!!!!!!!!!!!!".to_string());
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Invalid title");
    }

    #[test]
    fn merge_clears_excerpt_with_blank_string() {
        let mut request = empty_request();
        request.excerpt = Some("   ".to_string());

        let update = merge_update(&stored_post(), &request).unwrap();
        assert_eq!(update.excerpt, None);
    }

    #[test]
    fn merge_rejects_overlong_excerpt() {
        let mut request = empty_request();
        request.excerpt = Some("e".repeat(301));
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Invalid excerpt");
    }

    #[test]
    fn merge_rejects_out_of_bounds_body() {
        let mut request = empty_request();
        request.body = Some("too short".to_string());
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Invalid body");

        request.body = Some("b".repeat(10_001));
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Invalid body");
    }

    #[test]
    fn merge_rejects_unknown_status() {
        let mut request = empty_request();
        request.status = Some("archived".to_string());
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Invalid status");
    }

    #[test]
    fn merge_rejects_malformed_publish_date() {
        let mut request = empty_request();
        request.publish_date = Some("tomorrow".to_string());
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Invalid publish date");
    }

    #[test]
    fn merge_rejects_past_publish_date() {
        let yesterday = (Utc::now().date_naive() - chrono::Duration::days(1))
            .format("%Y-%m-%d")
            .to_string();
        let mut request = empty_request();
        request.publish_date = Some(yesterday);

        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Publish date must be today or later");
    }

    #[test]
    fn merge_requires_date_for_scheduled_posts() {
        let mut request = empty_request();
        request.status = Some("scheduled".to_string());
        let (_, message) = merge_update(&stored_post(), &request).unwrap_err();
        assert_eq!(message, "Publish date is required for scheduled posts");

        request.publish_date = Some(today());
        let update = merge_update(&stored_post(), &request).unwrap();
        assert_eq!(update.status, PostStatus::Scheduled);
        assert!(update.publish_date.is_some());
    }

    #[test]
    fn supported_image_types() {
        let mut headers = HeaderMap::new();
        assert!(!is_supported_image(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        assert!(is_supported_image(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("IMAGE/JPEG; charset=binary"),
        );
        assert!(is_supported_image(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("image/svg+xml"),
        );
        assert!(!is_supported_image(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!is_supported_image(&headers));
    }

    #[tokio::test]
    async fn list_posts_rejects_anonymous_callers() {
        let response = list_posts(HeaderMap::new(), Extension(lazy_pool()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_post_rejects_anonymous_callers() {
        let response = create_post(HeaderMap::new(), Extension(lazy_pool()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn get_post_rejects_anonymous_callers() {
        let response = get_post(
            Path("someid".to_string()),
            HeaderMap::new(),
            Extension(lazy_pool()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_post_rejects_anonymous_callers() {
        let response = update_post(
            Path("someid".to_string()),
            HeaderMap::new(),
            Extension(lazy_pool()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn featured_image_routes_reject_anonymous_callers() {
        let media = Arc::new(MediaState::new(
            Arc::new(super::super::media::FsMediaStore::new("/tmp/verki-test")),
            Arc::new(super::super::media::WebpCoverTransformer::default()),
        ));

        let response = upload_featured_image(
            Path("someid".to_string()),
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(Arc::clone(&media)),
            Bytes::new(),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = remove_featured_image(
            Path("someid".to_string()),
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(media),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
