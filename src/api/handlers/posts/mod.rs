//! Post authoring endpoints.
//!
//! Posts belong to exactly one user. Every query is scoped by owner and a
//! foreign post id answers exactly like a missing one (404), so post ids
//! cannot be enumerated across accounts. Slugs are derived from titles and
//! kept unique by numeric suffixes resolved on insert/update. Featured
//! images pass through an `ImageTransformer` (fixed-size `WebP` cover) and a
//! `MediaStore` (path-addressed object storage); the HTTP layer never
//! touches image bytes beyond size and content-type bounds.

pub(crate) mod handlers;
pub(crate) mod media;
mod slug;
mod storage;
pub(crate) mod types;

const TITLE_MIN: usize = 10;
const TITLE_MAX: usize = 100;
const EXCERPT_MAX: usize = 300;
const BODY_MIN: usize = 100;
const BODY_MAX: usize = 10_000;
const POST_SLUG_MAX: usize = 150;

const DEFAULT_TITLE: &str = "Untitled Post";

const IMAGE_MIN_BYTES: usize = 1024;
const IMAGE_MAX_BYTES: usize = 5 * 1024 * 1024;

pub use media::{FsMediaStore, MediaState, WebpCoverTransformer};
