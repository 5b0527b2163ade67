//! Optional TOML configuration file
//!
//! ```toml
//! [pipeline]
//! output_root = "motion_photos"
//! workers = 8
//! match_mode = "case-insensitive"
//! collision = "rename"
//! move_unmatched = true
//!
//! [tools]
//! exiftool = "/usr/local/bin/exiftool"
//! converter = "heif-convert"
//! converter_args = ["-q", "95"]
//! metadata_timeout_secs = 30
//!
//! [logging]
//! level = "debug"
//! ```

use anyhow::{Context, Result};
use motionmux_core::MatchMode;
use motionmux_engine::CollisionPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings loaded from the config file; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub tools: ToolSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub output_root: Option<PathBuf>,
    pub workers: Option<usize>,
    pub match_mode: Option<MatchMode>,
    pub collision: Option<CollisionPolicy>,
    pub move_unmatched: bool,
    pub copy_unmatched: bool,
    pub convert_all: bool,
    pub delete_sources: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub exiftool: PathBuf,
    pub converter: PathBuf,
    pub converter_args: Vec<String>,
    pub metadata_timeout_secs: u64,
    pub converter_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            exiftool: PathBuf::from("exiftool"),
            converter: PathBuf::from("heif-convert"),
            converter_args: Vec::new(),
            metadata_timeout_secs: 30,
            converter_timeout_secs: 60,
        }
    }
}

impl ToolSettings {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn converter_timeout(&self) -> Duration {
        Duration::from_secs(self.converter_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parses settings from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.tools.exiftool, PathBuf::from("exiftool"));
        assert_eq!(settings.tools.metadata_timeout(), Duration::from_secs(30));
        assert_eq!(settings.logging.level, "info");
        assert!(settings.pipeline.output_root.is_none());
        assert!(!settings.pipeline.move_unmatched);
    }

    #[test]
    fn test_full_config() {
        let settings = Settings::parse(
            r#"
            [pipeline]
            output_root = "out"
            workers = 2
            match_mode = "case-insensitive"
            collision = "rename"
            move_unmatched = true

            [tools]
            converter_args = ["-q", "95"]
            metadata_timeout_secs = 5

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(settings.pipeline.output_root, Some(PathBuf::from("out")));
        assert_eq!(settings.pipeline.workers, Some(2));
        assert_eq!(settings.pipeline.match_mode, Some(MatchMode::CaseInsensitive));
        assert_eq!(settings.pipeline.collision, Some(CollisionPolicy::Rename));
        assert!(settings.pipeline.move_unmatched);
        assert_eq!(settings.tools.converter_args, vec!["-q", "95"]);
        assert_eq!(settings.tools.converter, PathBuf::from("heif-convert"));
        assert_eq!(settings.tools.metadata_timeout(), Duration::from_secs(5));
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_bad_value_is_error() {
        assert!(Settings::parse("[pipeline]\ncollision = \"explode\"\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
