//! Relocation of files that did not take part in a pair

use crate::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Subfolder of the output root receiving moved unmatched files
pub const OTHER_FILES_DIR: &str = "other_files";

/// Moves `path` into `dir`, falling back to copy + delete across devices.
///
/// Any other rename failure is returned as is.
pub fn move_into(path: &Path, dir: &Path) -> Result<PathBuf> {
    let target = target_in(path, dir)?;
    match fs::rename(path, &target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                "{} is on another device than {}, copying instead",
                path.display(),
                dir.display()
            );
            fs::copy(path, &target)?;
            fs::remove_file(path)?;
        }
        Err(e) => {
            return Err(io::Error::new(
                e.kind(),
                format!("cannot move {} to {}: {}", path.display(), target.display(), e),
            )
            .into())
        }
    }
    tracing::debug!("Moved {} to {}", path.display(), target.display());
    Ok(target)
}

/// Copies `path` into `dir`, replacing any file of the same name
pub fn copy_into(path: &Path, dir: &Path) -> Result<PathBuf> {
    let target = target_in(path, dir)?;
    fs::copy(path, &target)?;
    tracing::debug!("Copied {} to {}", path.display(), target.display());
    Ok(target)
}

fn target_in(path: &Path, dir: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    fs::create_dir_all(dir)?;
    Ok(dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_into_creates_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("B.jpg");
        fs::write(&file, b"b").unwrap();

        let target = move_into(&file, &dir.path().join("out").join(OTHER_FILES_DIR)).unwrap();
        assert!(!file.exists());
        assert_eq!(fs::read(target).unwrap(), b"b");
    }

    #[test]
    fn test_failed_move_is_not_retried_as_copy() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("B.jpg");
        fs::write(&file, b"b").unwrap();
        let other = dir.path().join(OTHER_FILES_DIR);
        // a directory squatting on the target name makes the rename fail
        fs::create_dir_all(other.join("B.jpg").join("inner")).unwrap();

        let err = move_into(&file, &other).unwrap_err();
        assert!(err.to_string().contains("cannot move"), "{err}");
        assert!(matches!(&err, crate::Error::Io(e) if e.kind() != io::ErrorKind::CrossesDevices));
        assert_eq!(fs::read(&file).unwrap(), b"b");
        assert!(other.join("B.jpg").is_dir());
    }

    #[test]
    fn test_copy_into_keeps_source() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("B.mov");
        fs::write(&file, b"b").unwrap();

        let target = copy_into(&file, &dir.path().join("out")).unwrap();
        assert!(file.exists());
        assert!(target.exists());
    }
}
