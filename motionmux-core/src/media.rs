//! Media classification by file extension and stem matching rules

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Still image extensions accepted for pairing and muxing (lowercase)
pub const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "heic", "heif"];

/// Still image extensions in the phone's native format, which must be
/// transcoded to JPEG before muxing
pub const NATIVE_STILL_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Video extensions accepted for pairing and muxing (lowercase)
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4"];

/// Kind of a directory entry, judged by its extension only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Still,
    Video,
    Other,
}

impl MediaKind {
    /// Classifies a path by its extension (case-insensitive)
    pub fn of(path: &Path) -> Self {
        if is_still(path) {
            MediaKind::Still
        } else if is_video(path) {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    extension_lower(path).is_some_and(|ext| allowed.contains(&ext.as_str()))
}

/// Returns true if the path carries a still image extension
pub fn is_still(path: &Path) -> bool {
    has_extension(path, STILL_EXTENSIONS)
}

/// Returns true if the path carries a phone-native still image extension
pub fn is_native_still(path: &Path) -> bool {
    has_extension(path, NATIVE_STILL_EXTENSIONS)
}

/// Returns true if the path carries a video extension
pub fn is_video(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

/// Filename without its extension, if the path has a file name
pub fn stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Final path component as a string
pub fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|s| s.to_string_lossy().into_owned())
}

/// How filename stems are compared when joining stills to videos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    CaseSensitive,
    CaseInsensitive,
}

impl Default for MatchMode {
    /// Follows the usual filesystem behaviour of the host platform
    fn default() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            MatchMode::CaseInsensitive
        } else {
            MatchMode::CaseSensitive
        }
    }
}

impl MatchMode {
    /// Compares two stems for equality
    pub fn stem_eq(self, a: &str, b: &str) -> bool {
        match self {
            MatchMode::CaseSensitive => a == b,
            MatchMode::CaseInsensitive => a.to_lowercase() == b.to_lowercase(),
        }
    }

    /// Checks whether `name` begins with `prefix`
    pub fn has_prefix(self, name: &str, prefix: &str) -> bool {
        match self {
            MatchMode::CaseSensitive => name.starts_with(prefix),
            MatchMode::CaseInsensitive => name.to_lowercase().starts_with(&prefix.to_lowercase()),
        }
    }
}
