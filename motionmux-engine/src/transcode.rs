//! Still image transcoding to the interchange format

use crate::process::run_with_timeout;
use crate::{Error, Result};
use motionmux_core::media;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Converts a phone-native still into a JPEG
pub trait StillConverter: Send + Sync {
    /// Converts `input`, writing `<stem>.jpg` into `out_dir`
    fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Converter backed by an external program invoked as
/// `<program> <args...> <input> <output>`
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for CommandConverter {
    fn default() -> Self {
        Self::new("heif-convert", Vec::new(), Duration::from_secs(60))
    }
}

impl CommandConverter {
    /// Creates a converter running `program` with extra leading `args`
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

impl StillConverter for CommandConverter {
    fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        let stem = media::stem(input).ok_or_else(|| transcode_error(input, "path has no file name"))?;
        fs::create_dir_all(out_dir)?;
        let output_path = out_dir.join(format!("{}.jpg", stem));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(input).arg(&output_path);

        tracing::debug!(
            "Running: {} {} {} {}",
            self.program.display(),
            self.args.join(" "),
            input.display(),
            output_path.display()
        );

        let output = run_with_timeout(&mut cmd, self.timeout)
            .map_err(|e| transcode_error(input, format!("failed to run {}: {}", self.program.display(), e)))?
            .ok_or_else(|| transcode_error(input, format!("timed out after {:?}", self.timeout)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(transcode_error(
                input,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        if !output_path.is_file() {
            return Err(transcode_error(input, "converter produced no output file"));
        }

        tracing::info!("Converted {} to {}", input.display(), output_path.display());
        Ok(output_path)
    }
}

fn transcode_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::Transcode {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}
