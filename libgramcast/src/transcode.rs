//! Still image to reel video conversion
//!
//! Reels must be video, so posting a photo as a reel first turns it into a
//! short 1080x1920 H.264 clip with `ffmpeg`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{GramcastError, Result};

/// Output frame size (9:16)
pub const REEL_SCALE: &str = "scale=1080:1920";

/// A video written to the temp directory, removed when dropped
#[derive(Debug)]
pub struct TempVideo {
    path: PathBuf,
}

impl TempVideo {
    /// Reserve a fresh path in the system temp directory
    pub fn new() -> Self {
        let name = format!("gramcast-reel-{}.mp4", uuid::Uuid::new_v4());
        Self {
            path: std::env::temp_dir().join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TempVideo {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempVideo {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temporary video {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove temporary video {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// ffmpeg arguments for looping `image` into a `seconds` long clip at `output`
pub fn image_to_video_args(image: &Path, output: &Path, seconds: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-loop", "1", "-i"].iter().map(OsString::from).collect();
    args.push(image.as_os_str().to_owned());
    for arg in [
        "-c:v",
        "libx264",
        "-t",
        &seconds.to_string(),
        "-pix_fmt",
        "yuv420p",
        "-vf",
        REEL_SCALE,
    ] {
        args.push(OsString::from(arg));
    }
    args.push(output.as_os_str().to_owned());
    args
}

/// Render `image` as a `seconds` long video
pub async fn image_to_video(image: &Path, seconds: u32) -> Result<TempVideo> {
    if !image.is_file() {
        return Err(GramcastError::InvalidInput(format!(
            "image not found: {}",
            image.display()
        )));
    }
    if seconds == 0 {
        return Err(GramcastError::InvalidInput(
            "video duration must be at least 1 second".to_string(),
        ));
    }

    let video = TempVideo::new();
    info!(
        "Converting {} to a {}s video at {}",
        image.display(),
        seconds,
        video.path().display()
    );

    let output = Command::new("ffmpeg")
        .args(image_to_video_args(image, video.path(), seconds))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| GramcastError::Transcode(format!("failed to run ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(GramcastError::Transcode(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        )));
    }

    Ok(video)
}
