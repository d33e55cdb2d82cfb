//! Output configuration
//!
//! [`OutputConfig`] is the user-facing configuration of a trajectory output.
//! It can be built in code or loaded from TOML:
//!
//! ```toml
//! path = "runs/sample_model.traj"
//! all_data = true
//! compress = true
//! format = "enhanced"
//! codec = "zstd"
//! ```
//!
//! All settings are locked while a run is open.

use crate::core::compression::{CompressionConfig, CompressionMethod};
use crate::error::{Result, TrajectoryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk format variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum OutputFormat {
    /// Uncompressed chunks only
    Classic = 1,
    /// Chunks may be compressed
    Enhanced = 2,
}

impl OutputFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(OutputFormat::Classic),
            2 => Some(OutputFormat::Enhanced),
            _ => None,
        }
    }

    pub fn supports_compression(self) -> bool {
        matches!(self, OutputFormat::Enhanced)
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Enhanced
    }
}

fn default_true() -> bool {
    true
}

fn default_codec() -> CompressionMethod {
    CompressionMethod::Lz4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Primary output file
    pub path: PathBuf,

    /// Export every particle source array, not only the standard fields
    #[serde(default)]
    pub all_data: bool,

    /// Compress chunk payloads (ignored by the classic format)
    #[serde(default = "default_true")]
    pub compress: bool,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default = "default_codec")]
    pub codec: CompressionMethod,
}

impl OutputConfig {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        OutputConfig {
            path: path.into(),
            all_data: false,
            compress: true,
            format: OutputFormat::default(),
            codec: default_codec(),
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: OutputConfig =
            toml::from_str(text).map_err(|e| TrajectoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| TrajectoryError::Config(e.to_string()))
    }

    /// Static checks that do not touch the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(TrajectoryError::Config("path must not be empty".to_string()));
        }
        if self.compress && self.codec == CompressionMethod::None {
            return Err(TrajectoryError::Config(
                "compress is on but codec is 'none'".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective chunk compression for this configuration
    pub fn compression(&self) -> CompressionConfig {
        if self.compress && self.format.supports_compression() {
            CompressionConfig::for_method(self.codec)
        } else {
            CompressionConfig::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = OutputConfig::from_toml_str(r#"path = "out/run.traj""#).unwrap();
        assert_eq!(config.path, PathBuf::from("out/run.traj"));
        assert!(!config.all_data);
        assert!(config.compress);
        assert_eq!(config.format, OutputFormat::Enhanced);
        assert_eq!(config.codec, CompressionMethod::Lz4);
    }

    #[test]
    fn test_full_toml() {
        let text = r#"
            path = "run.traj"
            all_data = true
            compress = false
            format = "classic"
            codec = "zstd"
        "#;
        let config = OutputConfig::from_toml_str(text).unwrap();
        assert!(config.all_data);
        assert!(!config.compress);
        assert_eq!(config.format, OutputFormat::Classic);
        assert_eq!(config.codec, CompressionMethod::Zstd);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = OutputConfig::from_toml_str("path = \"a\"\nformat = \"netcdf3\"").unwrap_err();
        assert!(matches!(err, TrajectoryError::Config(_)));
    }

    #[test]
    fn test_compress_without_codec_rejected() {
        let err = OutputConfig::from_toml_str("path = \"a\"\ncodec = \"none\"").unwrap_err();
        assert!(matches!(err, TrajectoryError::Config(_)));
    }

    #[test]
    fn test_classic_never_compresses() {
        let mut config = OutputConfig::new("a.traj");
        config.format = OutputFormat::Classic;
        assert_eq!(config.compression().method, CompressionMethod::None);

        config.format = OutputFormat::Enhanced;
        config.codec = CompressionMethod::Zstd;
        assert_eq!(config.compression().method, CompressionMethod::Zstd);

        config.compress = false;
        assert_eq!(config.compression().method, CompressionMethod::None);
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("output.toml");
        std::fs::write(&file, "path = \"spill.traj\"\nall_data = true\n").unwrap();

        let config = OutputConfig::load(&file).unwrap();
        assert_eq!(config.path, PathBuf::from("spill.traj"));
        assert!(config.all_data);

        assert!(matches!(
            OutputConfig::load(temp.path().join("missing.toml")),
            Err(TrajectoryError::Io(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = OutputConfig::new("x/y.traj");
        config.all_data = true;
        let text = config.to_toml_string().unwrap();
        assert_eq!(OutputConfig::from_toml_str(&text).unwrap(), config);
    }
}
