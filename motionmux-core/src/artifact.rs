//! Muxed artifact and motion photo offset metadata

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Metadata keys and values as exchanged with the metadata service
pub type MetadataMap = BTreeMap<String, Value>;

/// Marker tag flagging the file as a motion photo
pub const KEY_MOTION_PHOTO: &str = "XMP-GCamera:MicroVideo";
/// Motion photo format version tag
pub const KEY_VERSION: &str = "XMP-GCamera:MicroVideoVersion";
/// Byte count from end of file back to the start of the video
pub const KEY_VIDEO_OFFSET: &str = "XMP-GCamera:MicroVideoOffset";
/// Presentation timestamp of the still frame within the video
pub const KEY_PRESENTATION_TIMESTAMP: &str = "XMP-GCamera:MicroVideoPresentationTimestampUs";

/// All keys written by the annotator
pub const MOTION_PHOTO_KEYS: [&str; 4] = [
    KEY_MOTION_PHOTO,
    KEY_VERSION,
    KEY_VIDEO_OFFSET,
    KEY_PRESENTATION_TIMESTAMP,
];

/// Current motion photo format version
pub const FORMAT_VERSION: i64 = 1;

/// The representative still frame sits 1.5s into the capture
pub const PRESENTATION_TIMESTAMP_US: i64 = 1_500_000;

/// A still image with its video appended, as produced by the muxer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxedArtifact {
    /// Output file path
    pub output_path: PathBuf,
    /// Size of the still image prefix in bytes
    pub still_len: u64,
    /// Size of the whole output file in bytes
    pub total_len: u64,
}

impl MuxedArtifact {
    /// Returns the size of the trailing video segment in bytes
    pub fn video_len(&self) -> u64 {
        self.total_len.saturating_sub(self.still_len)
    }
}

/// Motion photo metadata locating the embedded video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetMetadata {
    pub is_motion_photo: bool,
    pub version: i64,
    /// Bytes from end of file back to the start of the video
    pub video_offset: u64,
    pub presentation_timestamp_us: i64,
}

impl OffsetMetadata {
    /// Builds the metadata for a trailing video of `video_len` bytes
    pub fn for_video_len(video_len: u64) -> Self {
        Self {
            is_motion_photo: true,
            version: FORMAT_VERSION,
            video_offset: video_len,
            presentation_timestamp_us: PRESENTATION_TIMESTAMP_US,
        }
    }

    /// Converts into metadata service entries
    pub fn to_entries(&self) -> MetadataMap {
        let mut entries = MetadataMap::new();
        entries.insert(
            KEY_MOTION_PHOTO.to_string(),
            Value::from(i64::from(self.is_motion_photo)),
        );
        entries.insert(KEY_VERSION.to_string(), Value::from(self.version));
        entries.insert(KEY_VIDEO_OFFSET.to_string(), Value::from(self.video_offset));
        entries.insert(
            KEY_PRESENTATION_TIMESTAMP.to_string(),
            Value::from(self.presentation_timestamp_us),
        );
        entries
    }

    /// Reads the metadata back from service entries.
    ///
    /// Returns `None` when the offset key is missing or not an integer.
    pub fn from_entries(entries: &MetadataMap) -> Option<Self> {
        let video_offset = entries.get(KEY_VIDEO_OFFSET).and_then(value_as_i64)?;
        let video_offset = u64::try_from(video_offset).ok()?;

        Some(Self {
            is_motion_photo: entries
                .get(KEY_MOTION_PHOTO)
                .and_then(value_as_i64)
                .is_some_and(|v| v != 0),
            version: entries
                .get(KEY_VERSION)
                .and_then(value_as_i64)
                .unwrap_or(FORMAT_VERSION),
            video_offset,
            presentation_timestamp_us: entries
                .get(KEY_PRESENTATION_TIMESTAMP)
                .and_then(value_as_i64)
                .unwrap_or(PRESENTATION_TIMESTAMP_US),
        })
    }

    /// Returns true if any motion photo key is already present
    pub fn is_present(entries: &MetadataMap) -> bool {
        MOTION_PHOTO_KEYS.iter().any(|key| entries.contains_key(*key))
    }
}

/// Integer view of a metadata value; tools may report numbers as strings
fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}
