//! Motion photo offset annotation

use crate::metadata::{metadata_error, MetadataStore};
use crate::Result;
use motionmux_core::OffsetMetadata;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes the motion photo metadata into a muxed file.
///
/// The offset is recomputed from the file's current size, so an artifact
/// touched after muxing still gets a correct value. Existing motion photo
/// keys are replaced. A backup the metadata service leaves behind during this
/// call is removed on every exit path; one that was already there is kept.
pub fn annotate(
    store: &dyn MetadataStore,
    artifact_path: &Path,
    still_len: u64,
) -> Result<OffsetMetadata> {
    let _sidecar = SidecarGuard::new(store.backup_path(artifact_path));

    let total_len = fs::metadata(artifact_path)
        .map_err(|e| metadata_error(artifact_path, format!("cannot stat file: {}", e)))?
        .len();
    if total_len <= still_len {
        return Err(metadata_error(
            artifact_path,
            format!(
                "file is {} bytes, no video after a {} byte still",
                total_len, still_len
            ),
        ));
    }

    let existing = store.read(artifact_path)?;
    if OffsetMetadata::is_present(&existing) {
        tracing::warn!(
            "{} already carries motion photo metadata, overwriting",
            artifact_path.display()
        );
    }

    let metadata = OffsetMetadata::for_video_len(total_len - still_len);
    store.write(artifact_path, &metadata.to_entries())?;

    tracing::info!(
        "Annotated {} with video offset {}",
        artifact_path.display(),
        metadata.video_offset
    );

    Ok(metadata)
}

/// Reads back the stored motion photo metadata, if any
pub fn read_metadata(store: &dyn MetadataStore, path: &Path) -> Result<Option<OffsetMetadata>> {
    let entries = store.read(path)?;
    Ok(OffsetMetadata::from_entries(&entries))
}

/// Removes the metadata service's backup file when dropped, unless the file
/// was already there when the guard was created
struct SidecarGuard {
    path: PathBuf,
    pre_existing: bool,
}

impl SidecarGuard {
    fn new(path: PathBuf) -> Self {
        let pre_existing = path.exists();
        if pre_existing {
            tracing::debug!("Keeping existing backup {}", path.display());
        }
        Self { path, pre_existing }
    }
}

impl Drop for SidecarGuard {
    fn drop(&mut self) {
        if self.pre_existing || !self.path.exists() {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed {}", self.path.display()),
            Err(e) => tracing::warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}
