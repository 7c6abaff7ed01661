//! Local media discovery and classification

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Extensions picked up from a media folder. Case variants are listed
/// explicitly; anything else (e.g. `.Jpg`) is ignored.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "JPG", "JPEG", "PNG", "mp4", "MP4"];

/// Kind of media as far as the graph API is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a file by extension: `.mp4` in any case is video, everything else an image
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mp4") => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A piece of media that is already reachable at a public URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::new(url, MediaKind::Image)
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self::new(url, MediaKind::Video)
    }
}

/// List postable media in `folder`, sorted lexicographically by path
///
/// Only the top level is scanned. An empty result means there is nothing to post.
pub fn list_media(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(folder).map_err(|_| ConfigError::MediaFolder(folder.to_path_buf()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_supported_extension(path))
        .collect();

    files.sort();
    Ok(files)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Whether the argument names a remote resource rather than a local file
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Classify a local path or URL; for URLs only the path part counts
pub fn kind_of_location(location: &str) -> MediaKind {
    if is_remote(location) {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        MediaKind::from_path(Path::new(path))
    } else {
        MediaKind::from_path(Path::new(location))
    }
}
