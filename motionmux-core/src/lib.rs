//! motionmux Core Library
//!
//! This library provides the data model shared by the motionmux crates: media
//! classification, still/video pairing by filename stem, the muxed artifact
//! description and the motion photo offset metadata.

pub mod artifact;
pub mod container;
pub mod media;
pub mod pair;
pub mod resolver;

pub use artifact::{MetadataMap, MuxedArtifact, OffsetMetadata};
pub use container::{BoxHeader, EmbeddedSegment};
pub use media::{MatchMode, MediaKind};
pub use pair::MediaPair;
pub use resolver::{PairResolver, ScanResult, Unmatched};

use std::path::PathBuf;

/// Result type for motionmux-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for motionmux-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid input {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("Validation failed for {}: {reason}", path.display())]
    Validation { path: PathBuf, reason: String },

    #[error("Invalid embedded video segment: {0}")]
    InvalidSegment(String),
}

impl Error {
    pub(crate) fn validation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for argument-level errors that must abort a whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidInput { .. })
    }
}
