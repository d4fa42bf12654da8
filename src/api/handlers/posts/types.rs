//! Request/response types for the post authoring API.
//!
//! These payloads are shared between handlers and `OpenAPI` generation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Partial update: absent fields keep their stored value.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub body: Option<String>,
    pub status: Option<String>,
    /// `YYYY-MM-DD`.
    pub publish_date: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostResponse {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub body: Option<String>,
    pub status: String,
    pub publish_date: Option<String>,
    pub featured_image_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeaturedImageResponse {
    pub featured_image_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PostStatus {
    Draft,
    Published,
    Scheduled,
}

impl PostStatus {
    /// Canonical string stored in the `posts.status` column.
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Scheduled => "scheduled",
        }
    }

    pub(super) fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PostStatus, UpdatePostRequest};
    use anyhow::Result;

    #[test]
    fn update_request_allows_partial_payloads() -> Result<()> {
        let request: UpdatePostRequest = serde_json::from_str(r#"{"title": "A longer title"}"#)?;
        assert_eq!(request.title.as_deref(), Some("A longer title"));
        assert!(request.excerpt.is_none());
        assert!(request.body.is_none());
        assert!(request.status.is_none());
        assert!(request.publish_date.is_none());
        Ok(())
    }

    #[test]
    fn post_status_round_trips() {
        for status in [
            PostStatus::Draft,
            PostStatus::Published,
            PostStatus::Scheduled,
        ] {
            assert_eq!(PostStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::parse("archived"), None);
        assert_eq!(PostStatus::parse("Draft"), None);
    }
}
