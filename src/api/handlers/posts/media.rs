//! Cover image processing and object storage.
//!
//! `ImageTransformer` and `MediaStore` are the seams between handlers and
//! the image pipeline: handlers never touch the filesystem or encoder
//! directly, and tests swap either side out.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use image::imageops::FilterType;
use rand::Rng;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Boxed future so `MediaStore` stays usable as a trait object.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable storage for media objects addressed by relative path.
pub trait MediaStore: Send + Sync {
    fn put<'a>(&'a self, path: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Removing an object that is already gone is not an error.
    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Stores media objects under a local directory root.
#[derive(Debug)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a stored path onto the root. Stored paths are data; never let
    /// them climb out of the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative.is_absolute() {
            return Err(anyhow!("Media path must be relative: {path}"));
        }
        if relative
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(anyhow!("Media path must not traverse upward: {path}"));
        }
        Ok(self.root.join(relative))
    }
}

impl MediaStore for FsMediaStore {
    fn put<'a>(&'a self, path: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create media directory for {path}"))?;
            }
            tokio::fs::write(&target, bytes)
                .await
                .with_context(|| format!("Failed to write media object {path}"))
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => {
                    Err(err).with_context(|| format!("Failed to delete media object {path}"))
                }
            }
        })
    }
}

/// Re-encodes uploaded bytes into the stored cover format. Synchronous on
/// purpose; callers run it on a blocking thread.
pub trait ImageTransformer: Send + Sync {
    fn transform(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Crops and scales any readable raster image to a fixed WebP cover.
#[derive(Debug)]
pub struct WebpCoverTransformer {
    width: u32,
    height: u32,
}

impl WebpCoverTransformer {
    const QUALITY: f32 = 80.0;

    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for WebpCoverTransformer {
    /// Social card cover size.
    fn default() -> Self {
        Self::new(1200, 630)
    }
}

impl ImageTransformer for WebpCoverTransformer {
    fn transform(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let source = image::load_from_memory(bytes).context("Unreadable image data")?;
        // Fill the frame and crop the overflow so every cover keeps the
        // same aspect ratio.
        let cover = source.resize_to_fill(self.width, self.height, FilterType::Lanczos3);
        let rgba = cover.to_rgba8();
        let encoded =
            webp::Encoder::from_rgba(rgba.as_raw(), self.width, self.height).encode(Self::QUALITY);
        Ok(encoded.to_vec())
    }
}

/// Object key for a new cover. The random tail keeps rapid re-uploads
/// within the same second from colliding.
pub(super) fn featured_image_path(user_id: Uuid) -> String {
    let noise = rand::thread_rng().gen_range(100_000..1_000_000);
    format!(
        "post/featured_image/{user_id}_{}_{noise}.webp",
        Utc::now().timestamp()
    )
}

/// Media dependencies shared by the featured image handlers.
#[derive(Clone)]
pub struct MediaState {
    store: Arc<dyn MediaStore>,
    transformer: Arc<dyn ImageTransformer>,
}

impl MediaState {
    #[must_use]
    pub fn new(store: Arc<dyn MediaStore>, transformer: Arc<dyn ImageTransformer>) -> Self {
        Self { store, transformer }
    }

    pub(super) fn store(&self) -> &dyn MediaStore {
        self.store.as_ref()
    }

    /// Cloned handle so callers can move the transformer into a blocking task.
    pub(super) fn transformer(&self) -> Arc<dyn ImageTransformer> {
        Arc::clone(&self.transformer)
    }
}
