//! Still/video pair data structure

use crate::media::{self, MediaKind};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// A still image and a video believed to come from the same capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPair {
    still: PathBuf,
    video: PathBuf,
}

impl MediaPair {
    /// Creates a new pair without touching the filesystem.
    ///
    /// Use [`MediaPair::validate`] (the muxer always does) before relying on
    /// the paths.
    pub fn new(still: impl Into<PathBuf>, video: impl Into<PathBuf>) -> Self {
        Self {
            still: still.into(),
            video: video.into(),
        }
    }

    /// Path of the still image
    pub fn still(&self) -> &Path {
        &self.still
    }

    /// Path of the video clip
    pub fn video(&self) -> &Path {
        &self.video
    }

    /// Stem of the still image, used as the join key
    pub fn stem(&self) -> Option<String> {
        media::stem(&self.still)
    }

    /// Checks that both files exist and carry allowed extensions
    pub fn validate(&self) -> Result<()> {
        validate_file(&self.still, MediaKind::Still)?;
        validate_file(&self.video, MediaKind::Video)?;
        Ok(())
    }
}

/// Checks that `path` is an existing regular file of the expected kind
pub fn validate_file(path: &Path, expected: MediaKind) -> Result<()> {
    let kind = MediaKind::of(path);
    if kind != expected {
        let allowed: &[&str] = match expected {
            MediaKind::Still => media::STILL_EXTENSIONS,
            MediaKind::Video => media::VIDEO_EXTENSIONS,
            MediaKind::Other => &[],
        };
        return Err(Error::validation(
            path,
            format!("extension is not one of {}", allowed.join(", ")),
        ));
    }

    if !path.is_file() {
        return Err(Error::validation(path, "file does not exist"));
    }

    Ok(())
}
