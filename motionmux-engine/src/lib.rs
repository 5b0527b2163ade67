//! motionmux Engine Library
//!
//! This library turns resolved still/video pairs into motion photos: it
//! concatenates the two files, writes the offset metadata through an external
//! metadata service and runs whole directories in parallel.

pub mod annotator;
pub mod housekeeping;
pub mod metadata;
pub mod muxer;
pub mod pipeline;
mod process;
pub mod progress;
pub mod report;
pub mod transcode;

#[cfg(test)]
pub(crate) mod testing;

pub use annotator::annotate;
pub use metadata::{ExifTool, MetadataStore};
pub use muxer::{CollisionPolicy, Muxer, OutputPlan};
pub use pipeline::Pipeline;
pub use report::{BatchReport, Problem, Stage};
pub use transcode::{CommandConverter, StillConverter};

use motionmux_core::MatchMode;
use std::path::PathBuf;

/// Result type for motionmux-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for motionmux-engine operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Core(#[from] motionmux_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata update failed for {}: {reason}", path.display())]
    MetadataWrite { path: PathBuf, reason: String },

    #[error("Transcode failed for {}: {reason}", path.display())]
    Transcode { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Returns true for errors that must abort the whole run
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Core(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory for motion photos and reports
    pub output_root: PathBuf,
    /// Maximum number of pairs processed concurrently
    pub workers: usize,
    /// Stem comparison mode for pairing
    pub match_mode: MatchMode,
    /// What to do when an output file already exists
    pub collision: CollisionPolicy,
    /// Move unmatched files into `other_files/` under the output root
    pub move_unmatched: bool,
    /// Copy unmatched files into the output root
    pub copy_unmatched: bool,
    /// Transcode phone-native stills even when they have no video
    pub convert_all: bool,
    /// Delete a source still once its motion photo is complete
    pub delete_sources: bool,
}

impl PipelineConfig {
    /// Directory receiving transcoded stills
    pub fn converted_dir(&self) -> PathBuf {
        self.output_root.join("converted")
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("motion_photos"),
            workers: num_cpus::get(),
            match_mode: MatchMode::default(),
            collision: CollisionPolicy::default(),
            move_unmatched: false,
            copy_unmatched: false,
            convert_all: false,
            delete_sources: false,
        }
    }
}
