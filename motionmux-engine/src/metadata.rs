//! Embedded metadata service
//!
//! The annotator talks to metadata through [`MetadataStore`]. The production
//! backend drives the `exiftool` binary, which leaves a `<file>_original`
//! backup next to every file it modifies.

use crate::process::run_with_timeout;
use crate::{Error, Result};
use motionmux_core::MetadataMap;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default per-call deadline for the metadata tool
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Key/value metadata read and write on a file path
pub trait MetadataStore: Send + Sync {
    /// Reads all metadata entries of `path`
    fn read(&self, path: &Path) -> Result<MetadataMap>;

    /// Sets `entries` on `path`, leaving every other entry untouched
    fn write(&self, path: &Path, entries: &MetadataMap) -> Result<()>;

    /// Backup file a successful write may leave behind
    fn backup_path(&self, path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push("_original");
        PathBuf::from(name)
    }
}

/// Serialises work on the same file while letting distinct files proceed
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    /// Runs `f` while holding the lock for `path`
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(path.to_path_buf()).or_default())
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// `exiftool` command line backend
#[derive(Debug)]
pub struct ExifTool {
    program: PathBuf,
    timeout: Duration,
    locks: PathLocks,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool", DEFAULT_TIMEOUT)
    }
}

impl ExifTool {
    /// Creates a backend running `program` with a per-call `timeout`
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            locks: PathLocks::default(),
        }
    }

    /// Returns the tool version, or `None` if it cannot be run
    pub fn version(&self) -> Option<String> {
        let output = run_with_timeout(Command::new(&self.program).arg("-ver"), self.timeout)
            .ok()
            .flatten()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run(&self, path: &Path, args: &[String]) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).arg(path);

        tracing::debug!(
            "Running: {} {} {}",
            self.program.display(),
            args.join(" "),
            path.display()
        );

        let output = run_with_timeout(&mut cmd, self.timeout)
            .map_err(|e| metadata_error(path, format!("failed to run {}: {}", self.program.display(), e)))?
            .ok_or_else(|| metadata_error(path, format!("timed out after {:?}", self.timeout)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(metadata_error(
                path,
                format!(
                    "exiftool exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        Ok(output.stdout)
    }
}

impl MetadataStore for ExifTool {
    fn read(&self, path: &Path) -> Result<MetadataMap> {
        let args = ["-j", "-n", "-G1"].map(String::from);
        let stdout = self.locks.with_lock(path, || self.run(path, &args))?;
        parse_json_output(path, &stdout)
    }

    fn write(&self, path: &Path, entries: &MetadataMap) -> Result<()> {
        let args: Vec<String> = entries
            .iter()
            .map(|(key, value)| format!("-{}={}", key, value_to_arg(value)))
            .collect();
        self.locks.with_lock(path, || self.run(path, &args))?;
        Ok(())
    }
}

/// Parses `exiftool -j` output: an array holding one object per file
fn parse_json_output(path: &Path, stdout: &[u8]) -> Result<MetadataMap> {
    let mut records: Vec<MetadataMap> = serde_json::from_slice(stdout)
        .map_err(|e| metadata_error(path, format!("unreadable exiftool output: {}", e)))?;

    let mut record = records
        .pop()
        .ok_or_else(|| metadata_error(path, "exiftool returned no record"))?;
    record.remove("SourceFile");
    Ok(record)
}

fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => i64::from(*b).to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn metadata_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::MetadataWrite {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
