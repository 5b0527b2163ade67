//! Still + video concatenation
//!
//! The output is the raw still bytes immediately followed by the raw video
//! bytes. Readers find the video by counting back from end of file, so the
//! still prefix is copied untouched.

use crate::Result;
use motionmux_core::{media, Error as CoreError, MediaPair, MuxedArtifact};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Behaviour when the output path already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace the previous output (last run wins)
    #[default]
    Overwrite,
    /// Keep the previous output and write `<stem> (n).<ext>` instead
    Rename,
}

/// Output paths handed out for one batch.
///
/// Paths are claimed in a single thread before any pair is written, so two
/// pairs of the same batch never share an output. Under `Overwrite` a second
/// claim on the same path is refused; under `Rename` it gets the next free
/// `name (n).ext`.
#[derive(Debug)]
pub struct OutputPlan {
    collision: CollisionPolicy,
    root: PathBuf,
    claimed: HashMap<PathBuf, PathBuf>,
}

impl OutputPlan {
    /// Creates an empty plan for outputs under `root`
    pub fn new(collision: CollisionPolicy, root: &Path) -> Self {
        Self {
            collision,
            root: root.to_path_buf(),
            claimed: HashMap::new(),
        }
    }

    /// Reserves the output path for the motion photo made from `still`
    pub fn claim(&mut self, still: &Path) -> Result<PathBuf> {
        let path = self.root.join(output_name(still)?);

        let path = match self.collision {
            CollisionPolicy::Overwrite => {
                if let Some(owner) = self.claimed.get(&path) {
                    return Err(CoreError::Validation {
                        path: still.to_path_buf(),
                        reason: format!(
                            "{} is already the output of {}",
                            path.display(),
                            owner.display()
                        ),
                    }
                    .into());
                }
                path
            }
            CollisionPolicy::Rename => {
                next_free_path(&path, |p| self.claimed.contains_key(p) || p.exists())
            }
        };

        self.claimed.insert(path.clone(), still.to_path_buf());
        Ok(path)
    }
}

/// File name of the motion photo made from `still`.
///
/// Phone-native stills are transcoded first, so their output is `<stem>.jpg`.
pub fn output_name(still: &Path) -> Result<OsString> {
    let no_name = || CoreError::Validation {
        path: still.to_path_buf(),
        reason: "path has no file name".to_string(),
    };

    if media::is_native_still(still) {
        let stem = media::stem(still).ok_or_else(no_name)?;
        Ok(OsString::from(format!("{}.jpg", stem)))
    } else {
        Ok(still.file_name().ok_or_else(no_name)?.to_os_string())
    }
}

/// Concatenates validated pairs into motion photo files
#[derive(Debug, Clone, Copy, Default)]
pub struct Muxer {
    collision: CollisionPolicy,
}

impl Muxer {
    /// Creates a muxer with the given collision policy
    pub fn new(collision: CollisionPolicy) -> Self {
        Self { collision }
    }

    /// Muxes `pair` into `output_root`, keeping the still's file name.
    ///
    /// Validation runs before anything is created on disk. The output is
    /// written to a `.partial` file and renamed into place once complete.
    pub fn mux(&self, pair: &MediaPair, output_root: &Path) -> Result<MuxedArtifact> {
        pair.validate()?;
        let output_path = OutputPlan::new(self.collision, output_root).claim(pair.still())?;
        self.write(pair, output_path)
    }

    /// Muxes `pair` into an output path reserved by an [`OutputPlan`]
    pub fn mux_to(&self, pair: &MediaPair, output_path: &Path) -> Result<MuxedArtifact> {
        pair.validate()?;
        self.write(pair, output_path.to_path_buf())
    }

    fn write(&self, pair: &MediaPair, output_path: PathBuf) -> Result<MuxedArtifact> {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        ensure_not_input(&output_path, pair)?;

        if output_path.exists() {
            tracing::debug!("Replacing existing output {}", output_path.display());
        }

        // Under Rename a partial file someone else is writing is never reused
        let (partial, file) = PartialFile::open(&output_path, self.collision == CollisionPolicy::Rename)?;
        let (still_copied, video_copied) = {
            let mut writer = BufWriter::new(file);
            let still_copied = io::copy(&mut File::open(pair.still())?, &mut writer)?;
            let video_copied = io::copy(&mut File::open(pair.video())?, &mut writer)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            (still_copied, video_copied)
        };
        partial.commit()?;

        // Sizes come from the filesystem, not from the copy counters
        let still_len = fs::metadata(pair.still())?.len();
        let video_len = fs::metadata(pair.video())?.len();
        let total_len = fs::metadata(&output_path)?.len();

        if still_len != still_copied || video_len != video_copied || total_len != still_len + video_len {
            return Err(io::Error::other(format!(
                "inputs changed while muxing {}: copied {}+{} bytes, now {}+{}, output {}",
                output_path.display(),
                still_copied,
                video_copied,
                still_len,
                video_len,
                total_len
            ))
            .into());
        }

        tracing::info!(
            "Muxed {} ({} + {} bytes)",
            output_path.display(),
            still_len,
            video_len
        );

        Ok(MuxedArtifact {
            output_path,
            still_len,
            total_len,
        })
    }
}

/// `name.ext` if free, otherwise the first free `name (n).ext`
fn next_free_path(path: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !taken(path) {
        return path.to_path_buf();
    }

    let stem = media::stem(path).unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u32..)
        .map(|n| path.with_file_name(format!("{} ({}){}", stem, n, ext)))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}

fn ensure_not_input(output_path: &Path, pair: &MediaPair) -> Result<()> {
    if !output_path.exists() {
        return Ok(());
    }
    let output = fs::canonicalize(output_path)?;
    for input in [pair.still(), pair.video()] {
        if fs::canonicalize(input)? == output {
            return Err(CoreError::Validation {
                path: output_path.to_path_buf(),
                reason: "output would overwrite an input file".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// In-progress output; removed on drop unless committed
struct PartialFile {
    partial: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PartialFile {
    /// Opens `<target>.partial` for writing. With `exclusive` an existing
    /// partial file is an error instead of being truncated.
    fn open(target: &Path, exclusive: bool) -> io::Result<(Self, File)> {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".partial");
        let partial = target.with_file_name(name);

        let mut options = OpenOptions::new();
        options.write(true);
        if exclusive {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let file = options.open(&partial)?;

        Ok((
            Self {
                partial,
                target: target.to_path_buf(),
                committed: false,
            },
            file,
        ))
    }

    fn commit(mut self) -> io::Result<()> {
        fs::rename(&self.partial, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed && self.partial.exists() {
            if let Err(e) = fs::remove_file(&self.partial) {
                tracing::warn!("Failed to remove {}: {}", self.partial.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, len: usize, byte: u8) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![byte; len]).unwrap();
        path
    }

    #[test]
    fn test_mux_concatenates_exactly() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let still = write(input.path(), "IMG_0001.jpg", 1000, 0xAA);
        let video = write(input.path(), "IMG_0001.mov", 5000, 0xBB);
        let root = out.path().join("out");

        let artifact = Muxer::default()
            .mux(&MediaPair::new(&still, &video), &root)
            .unwrap();

        assert_eq!(artifact.output_path, root.join("IMG_0001.jpg"));
        assert_eq!(artifact.still_len, 1000);
        assert_eq!(artifact.total_len, 6000);
        assert_eq!(artifact.video_len(), 5000);

        let bytes = fs::read(&artifact.output_path).unwrap();
        assert_eq!(bytes.len(), 6000);
        assert!(bytes[..1000].iter().all(|&b| b == 0xAA));
        assert!(bytes[1000..].iter().all(|&b| b == 0xBB));
        assert!(!root.join("IMG_0001.jpg.partial").exists());

        // inputs are untouched
        assert_eq!(fs::read(&still).unwrap(), vec![0xAA; 1000]);
    }

    #[test]
    fn test_invalid_video_extension_creates_nothing() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let still = write(input.path(), "IMG_0001.jpg", 10, 1);
        let video = write(input.path(), "IMG_0001.txt", 10, 2);
        let root = out.path().join("out");

        let err = Muxer::default()
            .mux(&MediaPair::new(&still, &video), &root)
            .unwrap_err();

        assert!(matches!(err, Error::Core(CoreError::Validation { .. })));
        assert!(!root.exists());
    }

    #[test]
    fn test_rerun_overwrites() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let still = write(input.path(), "A.jpg", 10, 1);
        let video = write(input.path(), "A.mp4", 20, 2);
        let pair = MediaPair::new(&still, &video);

        let first = Muxer::default().mux(&pair, out.path()).unwrap();
        fs::write(&video, vec![3u8; 5]).unwrap();
        let second = Muxer::default().mux(&pair, out.path()).unwrap();

        assert_eq!(first.output_path, second.output_path);
        assert_eq!(second.total_len, 15);
    }

    #[test]
    fn test_rename_policy_keeps_previous_output() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let still = write(input.path(), "A.jpg", 10, 1);
        let video = write(input.path(), "A.mp4", 20, 2);
        let pair = MediaPair::new(&still, &video);
        let muxer = Muxer::new(CollisionPolicy::Rename);

        let first = muxer.mux(&pair, out.path()).unwrap();
        let second = muxer.mux(&pair, out.path()).unwrap();
        let third = muxer.mux(&pair, out.path()).unwrap();

        assert_eq!(first.output_path, out.path().join("A.jpg"));
        assert_eq!(second.output_path, out.path().join("A (1).jpg"));
        assert_eq!(third.output_path, out.path().join("A (2).jpg"));
    }

    #[test]
    fn test_plan_refuses_second_claim_under_overwrite() {
        let out = TempDir::new().unwrap();
        let mut plan = OutputPlan::new(CollisionPolicy::Overwrite, out.path());

        let first = plan.claim(Path::new("in/A.heic")).unwrap();
        let err = plan.claim(Path::new("in/A.jpg")).unwrap_err();

        assert_eq!(first, out.path().join("A.jpg"));
        match err {
            Error::Core(CoreError::Validation { path, reason }) => {
                assert_eq!(path, PathBuf::from("in/A.jpg"));
                assert!(reason.contains("in/A.heic"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plan_renames_within_batch_and_around_existing_files() {
        let out = TempDir::new().unwrap();
        write(out.path(), "A.jpg", 1, 0);
        let mut plan = OutputPlan::new(CollisionPolicy::Rename, out.path());

        assert_eq!(plan.claim(Path::new("in/A.heic")).unwrap(), out.path().join("A (1).jpg"));
        assert_eq!(plan.claim(Path::new("in/A.jpg")).unwrap(), out.path().join("A (2).jpg"));
        assert_eq!(plan.claim(Path::new("in/B.jpeg")).unwrap(), out.path().join("B.jpeg"));
    }

    #[test]
    fn test_rename_policy_never_reuses_a_partial_file() {
        let input = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let still = write(input.path(), "A.jpg", 10, 1);
        let video = write(input.path(), "A.mp4", 20, 2);
        let busy = write(out.path(), "A.jpg.partial", 3, 9);

        let err = Muxer::new(CollisionPolicy::Rename)
            .mux_to(&MediaPair::new(&still, &video), &out.path().join("A.jpg"))
            .unwrap_err();

        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read(&busy).unwrap(), vec![9u8; 3]);
        assert!(!out.path().join("A.jpg").exists());
    }

    #[test]
    fn test_refuses_to_overwrite_input() {
        let dir = TempDir::new().unwrap();
        let still = write(dir.path(), "A.jpg", 10, 1);
        let video = write(dir.path(), "A.mov", 20, 2);

        let err = Muxer::default()
            .mux(&MediaPair::new(&still, &video), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::Core(CoreError::Validation { .. })));
        assert_eq!(fs::read(&still).unwrap(), vec![1u8; 10]);
    }
}
