//! API handlers grouped by resource.
//!
//! Auth flows, sessions, and their storage live under `auth`; post
//! authoring and featured image handling under `posts`.

pub mod auth;
pub mod health;
pub mod posts;
pub mod root;
