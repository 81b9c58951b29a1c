//! YAML configuration file.
//!
//! The file has `general`, `a_pass`, `b_pass`, `io` and `logging`
//! sections. `b_pass` is required; the others default. Unknown sections
//! (e.g. `quality`) and keys owned by other tools are ignored.

use std::path::{Path, PathBuf};

use retouch_pipeline::{APassConfig, BPassConfig, GeneralConfig};
use serde::Deserialize;

/// Errors from loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid YAML or lacks a required field.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Default directories for the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Where input portraits live.
    pub input_dir: PathBuf,
    /// Root of per-image working directories.
    pub work_dir: PathBuf,
    /// Where final images are written.
    pub output_dir: PathBuf,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("output"),
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `DEBUG`, `INFO`, `WARNING`, `ERROR` or `CRITICAL`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_owned(),
        }
    }
}

impl LoggingConfig {
    /// `tracing` filter directive for the configured level.
    ///
    /// Unrecognized levels map to `info`.
    #[must_use]
    pub fn filter_directive(&self) -> &'static str {
        match self.level.trim().to_ascii_uppercase().as_str() {
            "TRACE" => "trace",
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetouchConfig {
    /// Service endpoints and timeouts.
    #[serde(default)]
    pub general: GeneralConfig,
    /// A-pass geometry.
    #[serde(default)]
    pub a_pass: APassConfig,
    /// B-pass parameters.
    pub b_pass: BPassConfig,
    /// Default directories.
    #[serde(default)]
    pub io: IoConfig,
    /// Log verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RetouchConfig {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid YAML or a missing
    /// required field.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&contents)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use retouch_pipeline::config::MaskSource;

    use super::*;

    const SAMPLE: &str = r#"
general:
  a1111_endpoint: "http://gpu-box:7860"
  retries: 3
b_pass:
  prompt: "natural skin texture"
  denoise: 0.2
  cfg: 4.5
  steps: 24
  mask_blur_px: 8
  selection: sequential
  cheek_refiner:
    enabled: true
    mask_source: cached
quality:
  min_side: 512
io:
  output_dir: final
logging:
  level: WARNING
"#;

    #[test]
    fn sample_parses() {
        let cfg = RetouchConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.general.a1111_endpoint, "http://gpu-box:7860");
        assert_eq!(cfg.b_pass.steps, 24);
        assert_eq!(cfg.b_pass.selection, retouch_pipeline::SelectionPolicy::Sequential);
        assert!(cfg.b_pass.cheek_refiner.enabled);
        assert_eq!(cfg.b_pass.cheek_refiner.mask_source, MaskSource::Cached);
        assert_eq!(cfg.b_pass.cheek_refiner.blur_px, 12);
        assert_eq!(cfg.io.output_dir, PathBuf::from("final"));
        assert_eq!(cfg.io.work_dir, PathBuf::from("work"));
        assert_eq!(cfg.logging.filter_directive(), "warn");
        assert_eq!(cfg.a_pass, APassConfig::default());
    }

    #[test]
    fn missing_b_pass_is_an_error() {
        let err = RetouchConfig::from_yaml("general: {}\n").unwrap_err();
        assert!(err.to_string().contains("b_pass"), "{err}");
    }

    #[test]
    fn level_mapping() {
        let level = |l: &str| LoggingConfig { level: l.into() }.filter_directive();
        assert_eq!(level("CRITICAL"), "error");
        assert_eq!(level("debug"), "debug");
        assert_eq!(level("verbose"), "info");
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RetouchConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
