//! Batch outcome accumulation and the problem report

use crate::Result;
use motionmux_core::{MediaPair, MuxedArtifact, OffsetMetadata, Unmatched};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the problem report written under the output root
pub const PROBLEM_REPORT_FILE: &str = "problem_files.txt";

/// Pipeline step at which a problem occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transcode,
    Mux,
    Annotate,
    Cleanup,
    Housekeeping,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Transcode => "transcode",
            Stage::Mux => "mux",
            Stage::Annotate => "annotate",
            Stage::Cleanup => "cleanup",
            Stage::Housekeeping => "housekeeping",
        };
        f.write_str(name)
    }
}

/// A file that could not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub path: PathBuf,
    pub stage: Stage,
    pub reason: String,
}

/// A pair that became a complete motion photo
#[derive(Debug, Clone)]
pub struct ProcessedPair {
    pub pair: MediaPair,
    pub artifact: MuxedArtifact,
    pub metadata: OffsetMetadata,
    /// Original phone-native still, when the pair's still was transcoded
    pub converted_from: Option<PathBuf>,
}

/// Everything a batch run did, merged from all workers
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: Vec<ProcessedPair>,
    pub problems: Vec<Problem>,
    pub unmatched: Vec<Unmatched>,
    /// Unmatched files moved into `other_files/`
    pub moved: Vec<PathBuf>,
    /// Unmatched files copied into the output root
    pub copied: Vec<PathBuf>,
    /// Unmatched stills transcoded without muxing
    pub converted_only: Vec<PathBuf>,
}

impl BatchReport {
    /// Records a problem and logs it
    pub fn problem(&mut self, path: &Path, stage: Stage, reason: impl fmt::Display) {
        tracing::error!("{} failed for {}: {}", stage, path.display(), reason);
        self.problems.push(Problem {
            path: path.to_path_buf(),
            stage,
            reason: reason.to_string(),
        });
    }

    /// Appends another report's records
    pub fn merge(&mut self, other: BatchReport) {
        self.processed.extend(other.processed);
        self.problems.extend(other.problems);
        self.unmatched.extend(other.unmatched);
        self.moved.extend(other.moved);
        self.copied.extend(other.copied);
        self.converted_only.extend(other.converted_only);
    }

    /// Orders records by path so reports do not depend on worker scheduling
    pub fn sort(&mut self) {
        self.processed
            .sort_by(|a, b| a.artifact.output_path.cmp(&b.artifact.output_path));
        self.problems.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Plain-text problem report, one `path<TAB>stage<TAB>reason` line each
    pub fn problem_report(&self) -> String {
        self.problems
            .iter()
            .map(|p| {
                format!(
                    "{}\t{}\t{}\n",
                    p.path.display(),
                    p.stage,
                    p.reason.replace(['\n', '\r'], " ")
                )
            })
            .collect()
    }

    /// Writes the problem report under `output_root` if there are problems
    pub fn write_problem_report(&self, output_root: &Path) -> Result<Option<PathBuf>> {
        if self.problems.is_empty() {
            return Ok(None);
        }
        fs::create_dir_all(output_root)?;
        let path = output_root.join(PROBLEM_REPORT_FILE);
        fs::write(&path, self.problem_report())?;
        tracing::warn!(
            "{} problem file(s) listed in {}",
            self.problems.len(),
            path.display()
        );
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_problem_report_lines() {
        let mut report = BatchReport::default();
        report.problem(Path::new("in/B.heic"), Stage::Transcode, "exit 1:\nbad file");
        report.problem(Path::new("out/A.jpg"), Stage::Annotate, "timed out");

        assert_eq!(
            report.problem_report(),
            "in/B.heic\ttranscode\texit 1: bad file\nout/A.jpg\tannotate\ttimed out\n"
        );
    }

    #[test]
    fn test_no_report_without_problems() {
        let dir = TempDir::new().unwrap();
        let report = BatchReport::default();
        assert_eq!(report.write_problem_report(dir.path()).unwrap(), None);
        assert!(!dir.path().join(PROBLEM_REPORT_FILE).exists());
    }

    #[test]
    fn test_merge_and_write() {
        let dir = TempDir::new().unwrap();
        let mut left = BatchReport::default();
        let mut right = BatchReport::default();
        right.problem(Path::new("b"), Stage::Mux, "io");
        left.problem(Path::new("a"), Stage::Mux, "io");
        left.merge(right);
        left.sort();

        let path = left.write_problem_report(dir.path()).unwrap().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "a\tmux\tio\nb\tmux\tio\n");
    }
}
