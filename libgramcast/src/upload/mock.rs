//! Mock uploader for testing
//!
//! Returns deterministic URLs of the form
//! `https://cdn.example.com/{image|video}/{file name}` and can be told to fail
//! for specific file names.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::Uploader;
use crate::error::{Result, UploadError};
use crate::media::MediaKind;

#[derive(Debug, Default)]
pub struct MockUploader {
    failing: HashSet<String>,
    uploaded: Mutex<Vec<(PathBuf, MediaKind)>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail uploads of any file with this name
    pub fn failing(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    /// Every upload attempt, in order
    pub fn uploaded(&self) -> Vec<(PathBuf, MediaKind)> {
        self.uploaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(&self, path: &Path, kind: MediaKind) -> Result<String> {
        self.uploaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((path.to_path_buf(), kind));

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if self.failing.contains(&file_name) {
            return Err(UploadError::Failed {
                path: path.to_path_buf(),
                reason: "mock upload failure".to_string(),
            }
            .into());
        }

        Ok(format!("https://cdn.example.com/{}/{}", kind, file_name))
    }
}
