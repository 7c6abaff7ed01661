//! Remote media hosting
//!
//! The graph API only accepts media by URL, so local files are first handed to
//! a hosting service through an [`Uploader`]. Uploads are sequential and a
//! failed file never stops its siblings; [`upload_all`] collects what worked
//! and what did not, and the caller decides what a partial batch means.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;
use crate::media::{MediaItem, MediaKind};

pub mod cloudinary;

// Mock is available for all builds (not just tests) to support integration tests
pub mod mock;

/// A hosting service that turns a local file into a public URL
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Service name used in log messages
    fn name(&self) -> &str;

    /// Upload `path` and return its public URL
    ///
    /// `kind` selects the resource type; videos must not be sent through the
    /// image pipeline.
    async fn upload(&self, path: &Path, kind: MediaKind) -> Result<String>;
}

/// A file that could not be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of uploading a set of files
#[derive(Debug, Default)]
pub struct UploadBatch {
    /// Hosted items, in the order of the input files
    pub items: Vec<MediaItem>,
    pub failed: Vec<FailedUpload>,
}

impl UploadBatch {
    pub fn attempted(&self) -> usize {
        self.items.len() + self.failed.len()
    }

    pub fn is_partial(&self) -> bool {
        !self.items.is_empty() && !self.failed.is_empty()
    }
}

/// Upload one file, classifying it by extension
pub async fn upload_file(uploader: &dyn Uploader, path: &Path) -> Result<MediaItem> {
    let kind = MediaKind::from_path(path);
    info!("Uploading {} ({}) to {}", path.display(), kind, uploader.name());
    let url = uploader.upload(path, kind).await?;
    info!("Uploaded {}", path.display());
    Ok(MediaItem::new(url, kind))
}

/// Upload `files` one after another, keeping input order
pub async fn upload_all(uploader: &dyn Uploader, files: &[PathBuf]) -> UploadBatch {
    let mut batch = UploadBatch::default();

    for path in files {
        match upload_file(uploader, path).await {
            Ok(item) => batch.items.push(item),
            Err(e) => {
                warn!("Failed to upload {}: {}", path.display(), e);
                batch.failed.push(FailedUpload {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    batch
}
