//! Pair discovery by filename stem
//!
//! A still `name.ext` pairs with a video in the same directory whose file
//! name begins with `name` and whose extension is a video extension. When
//! several videos qualify the tie-break is explicit and independent of the
//! platform's directory listing order:
//!
//! 1. a video whose stem equals the still's stem,
//! 2. the shortest file name,
//! 3. byte-wise file name order.
//!
//! A video is claimed by at most one still. Exact stem matches are claimed
//! for the whole directory first, so a prefix match never takes a video
//! whose own still is present. The prefix fallback then runs over the videos
//! left, visiting stills in file name order.

use crate::media::{self, MatchMode, MediaKind};
use crate::pair::{validate_file, MediaPair};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// A directory entry that did not end up in any pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmatched {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Outcome of scanning one directory
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Matched pairs, in still file name order
    pub pairs: Vec<MediaPair>,
    /// Every other regular file, in file name order
    pub unmatched: Vec<Unmatched>,
}

impl ScanResult {
    /// Unmatched entries of the given kind
    pub fn unmatched_of(&self, kind: MediaKind) -> impl Iterator<Item = &Path> {
        self.unmatched
            .iter()
            .filter(move |u| u.kind == kind)
            .map(|u| u.path.as_path())
    }
}

/// Checks that `dir` exists and is a directory
pub fn validate_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(Error::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(Error::InvalidInput {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

/// Resolves stills and videos into pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct PairResolver {
    mode: MatchMode,
}

impl PairResolver {
    /// Creates a resolver using the given stem match mode
    pub fn new(mode: MatchMode) -> Self {
        Self { mode }
    }

    /// Returns the match mode in use
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Scans `dir` (non-recursively) and pairs its files.
    ///
    /// Fails with `NotFound` or `InvalidInput` before reading any entry if
    /// `dir` is not a usable directory. Never writes.
    pub fn scan(&self, dir: &Path) -> Result<ScanResult> {
        validate_directory(dir)?;

        let files = list_files(dir)?;
        let videos: Vec<PathBuf> = files
            .iter()
            .filter(|p| media::is_video(p))
            .cloned()
            .collect();

        let stills: Vec<&PathBuf> = files.iter().filter(|p| media::is_still(p)).collect();
        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut result = ScanResult::default();

        for exact_only in [true, false] {
            for still in &stills {
                if claimed.contains(*still) {
                    continue;
                }
                let Some(stem) = media::stem(still) else {
                    continue;
                };
                let available: Vec<PathBuf> = videos
                    .iter()
                    .filter(|v| !claimed.contains(*v))
                    .filter(|v| {
                        !exact_only || media::stem(v).is_some_and(|s| self.mode.stem_eq(&s, &stem))
                    })
                    .cloned()
                    .collect();

                if let Some(video) = self.video_for_still(still, &available) {
                    tracing::debug!(
                        "Paired {} with {}",
                        still.display(),
                        video.display()
                    );
                    claimed.insert(video.clone());
                    claimed.insert((*still).clone());
                    result.pairs.push(MediaPair::new((*still).clone(), video));
                }
            }
        }
        result
            .pairs
            .sort_by(|a, b| a.still().file_name().cmp(&b.still().file_name()));

        result.unmatched = files
            .into_iter()
            .filter(|p| !claimed.contains(p))
            .map(|path| Unmatched {
                kind: MediaKind::of(&path),
                path,
            })
            .collect();

        tracing::info!(
            "Scanned {}: {} pairs, {} unmatched files",
            dir.display(),
            result.pairs.len(),
            result.unmatched.len()
        );

        Ok(result)
    }

    /// Picks the best video partner for `still` among `candidates`
    pub fn video_for_still(&self, still: &Path, candidates: &[PathBuf]) -> Option<PathBuf> {
        let stem = media::stem(still)?;

        candidates
            .iter()
            .filter(|c| media::is_video(c))
            .filter_map(|c| media::file_name(c).map(|name| (c, name)))
            .filter(|(_, name)| self.mode.has_prefix(name, &stem))
            .min_by_key(|(c, name)| {
                let exact = media::stem(c).is_some_and(|s| self.mode.stem_eq(&s, &stem));
                (!exact, name.len(), name.clone())
            })
            .map(|(c, _)| c.clone())
    }

    /// Picks the best still partner for `video` among `candidates`.
    ///
    /// Same prefix rule in reverse: the still's stem must begin the video's
    /// file name. An exact stem match wins, then the longest stem, then
    /// file name order.
    pub fn still_for_video(&self, video: &Path, candidates: &[PathBuf]) -> Option<PathBuf> {
        let video_name = media::file_name(video)?;
        let video_stem = media::stem(video)?;

        candidates
            .iter()
            .filter(|c| media::is_still(c))
            .filter_map(|c| {
                let stem = media::stem(c)?;
                let name = media::file_name(c)?;
                Some((c, stem, name))
            })
            .filter(|(_, stem, _)| self.mode.has_prefix(&video_name, stem))
            .min_by_key(|(_, stem, name)| {
                let exact = self.mode.stem_eq(stem, &video_stem);
                (!exact, std::cmp::Reverse(stem.len()), name.clone())
            })
            .map(|(c, _, _)| c.clone())
    }

    /// Finds the partner of a single still or video in its own directory.
    ///
    /// The whole directory is scanned so the answer agrees with what a
    /// directory run would pair.
    pub fn partner_of(&self, path: &Path) -> Result<Option<PathBuf>> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let name = path.file_name();
        let scan = self.scan(dir)?;

        Ok(scan.pairs.into_iter().find_map(|pair| {
            if pair.still().file_name() == name {
                Some(pair.video().to_path_buf())
            } else if pair.video().file_name() == name {
                Some(pair.still().to_path_buf())
            } else {
                None
            }
        }))
    }

    /// Validates a user-supplied pair.
    ///
    /// Both files must exist with allowed extensions and the video's file
    /// name must begin with the still's stem.
    pub fn resolve_explicit(&self, still: &Path, video: &Path) -> Result<MediaPair> {
        for path in [still, video] {
            if !path.exists() {
                return Err(Error::NotFound(path.to_path_buf()));
            }
        }
        validate_file(still, MediaKind::Still)?;
        validate_file(video, MediaKind::Video)?;

        let stem = media::stem(still).unwrap_or_default();
        let video_name = media::file_name(video).unwrap_or_default();
        if !self.mode.has_prefix(&video_name, &stem) {
            return Err(Error::Validation {
                path: video.to_path_buf(),
                reason: format!("file name does not start with stem '{}'", stem),
            });
        }

        Ok(MediaPair::new(still, video))
    }
}

/// Regular files of `dir`, sorted by file name
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
