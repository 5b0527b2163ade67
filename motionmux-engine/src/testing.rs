//! Test doubles for the external collaborators

use crate::metadata::{metadata_error, MetadataStore};
use crate::transcode::StillConverter;
use crate::{Error, Result};
use motionmux_core::{media, MetadataMap};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Keeps metadata in memory and mimics exiftool's `_original` backups
#[derive(Default)]
pub(crate) struct MemoryStore {
    files: Mutex<HashMap<PathBuf, MetadataMap>>,
    writes: AtomicUsize,
    fail_after_backup: bool,
}

impl MemoryStore {
    /// A store whose writes create the backup and then fail
    pub(crate) fn failing_after_backup() -> Self {
        Self {
            fail_after_backup: true,
            ..Self::default()
        }
    }

    pub(crate) fn insert(&self, path: &Path, key: &str, value: Value) {
        self.files
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub(crate) fn snapshot(&self, path: &Path) -> MetadataMap {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl MetadataStore for MemoryStore {
    fn read(&self, path: &Path) -> Result<MetadataMap> {
        if !path.is_file() {
            return Err(metadata_error(path, "file not found"));
        }
        Ok(self.snapshot(path))
    }

    fn write(&self, path: &Path, entries: &MetadataMap) -> Result<()> {
        // exiftool never replaces an existing backup
        let backup = self.backup_path(path);
        if !backup.exists() {
            fs::copy(path, &backup)?;
        }
        if self.fail_after_backup {
            return Err(metadata_error(path, "simulated write failure"));
        }

        let mut files = self.files.lock().unwrap();
        let stored = files.entry(path.to_path_buf()).or_default();
        for (key, value) in entries {
            stored.insert(key.clone(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Converts by copying bytes to `<stem>.jpg`; fails for chosen stems
#[derive(Default)]
pub(crate) struct CopyConverter {
    pub(crate) failing_stems: Vec<String>,
}

impl StillConverter for CopyConverter {
    fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        let stem = media::stem(input).unwrap_or_default();
        if self.failing_stems.contains(&stem) {
            return Err(Error::Transcode {
                path: input.to_path_buf(),
                reason: "simulated failure".to_string(),
            });
        }
        fs::create_dir_all(out_dir)?;
        let output = out_dir.join(format!("{}.jpg", stem));
        fs::copy(input, &output)?;
        Ok(output)
    }
}
