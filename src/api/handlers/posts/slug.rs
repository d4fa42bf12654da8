//! Slug derivation for post URLs.
//!
//! Slugs are lowercase `a-z0-9-`; uniqueness is resolved by the storage
//! layer with numeric suffixes.

use super::POST_SLUG_MAX;

/// Derive the base slug for a title. Returns `None` when nothing URL-safe
/// survives normalization.
pub(super) fn slug_from_title(title: &str) -> Option<String> {
    let mut slug = String::new();
    let mut prev_dash = false;
    for ch in title.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }

    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        return None;
    }
    let truncated: String = trimmed.chars().take(POST_SLUG_MAX).collect();
    let normalized = truncated.trim_end_matches('-').to_string();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Append `-{n}` to a base slug, shortening the base when the result would
/// exceed the length bound.
pub(super) fn with_suffix(base: &str, n: usize) -> Option<String> {
    let suffix = format!("-{n}");
    if suffix.len() >= POST_SLUG_MAX {
        return None;
    }
    let allowed = POST_SLUG_MAX.saturating_sub(suffix.len());
    let head: String = base.chars().take(allowed).collect();
    let head = head.trim_end_matches('-');
    if head.is_empty() {
        return None;
    }
    Some(format!("{head}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::{slug_from_title, with_suffix};

    #[test]
    fn derives_lowercase_dashed_slugs() {
        assert_eq!(
            slug_from_title("Hello, World!").as_deref(),
            Some("hello-world")
        );
        assert_eq!(
            slug_from_title("Untitled Post").as_deref(),
            Some("untitled-post")
        );
        assert_eq!(
            slug_from_title("  Spaces   Collapse  ").as_deref(),
            Some("spaces-collapse")
        );
    }

    #[test]
    fn rejects_titles_with_no_url_safe_characters() {
        assert_eq!(slug_from_title("!!!???"), None);
        assert_eq!(slug_from_title("   "), None);
    }

    #[test]
    fn truncates_overlong_titles() {
        let title = "a".repeat(400);
        let slug = slug_from_title(&title).unwrap();
        assert_eq!(slug.len(), super::POST_SLUG_MAX);
    }

    #[test]
    fn suffix_appends_and_shortens() {
        assert_eq!(
            with_suffix("hello-world", 2).as_deref(),
            Some("hello-world-2")
        );

        let base = "b".repeat(super::POST_SLUG_MAX);
        let suffixed = with_suffix(&base, 12).unwrap();
        assert!(suffixed.len() <= super::POST_SLUG_MAX);
        assert!(suffixed.ends_with("-12"));
    }
}
