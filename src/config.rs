//! Configuration for Matrix Builds
//!
//! Loaded from an optional TOML file, then overridden by `PHENO_MATRIX_*`
//! environment variables, then by command-line flags. Every section has
//! defaults, so an empty file is a valid configuration.
//!
//! ```toml
//! [output]
//! comment_header = true
//! compression_level = 6
//! missing_value = ""
//!
//! [merge]
//! trailing_lines = "fail"   # or "ignore"
//! progress_interval = 1000000
//!
//! [resources]
//! fd_headroom = 100
//! raise_fd_limit = true
//!
//! [logging]
//! filter = "info"
//! format = "text"           # or "json"
//! ```

use crate::bgzf::DEFAULT_COMPRESSION_LEVEL;
use crate::matrix::MatrixError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest compression level the deflate backend accepts
pub const COMPRESSION_LEVEL_MAX: u32 = 9;

/// Main configuration for building a matrix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    pub output: OutputConfig,
    pub merge: MergeConfig,
    pub resources: ResourceConfig,
    pub logging: LoggingConfig,
}

impl MatrixConfig {
    /// Configuration for tests (small progress interval, fd limit untouched)
    pub fn test() -> Self {
        MatrixConfig {
            output: OutputConfig::default(),
            merge: MergeConfig::test(),
            resources: ResourceConfig::test(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, MatrixError> {
        let config: MatrixConfig =
            toml::from_str(text).map_err(|e| MatrixError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: &Path) -> Result<Self, MatrixError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MatrixError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: MatrixConfig = toml::from_str(&text)
            .map_err(|e| MatrixError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), MatrixError> {
        if self.output.compression_level > COMPRESSION_LEVEL_MAX {
            return Err(MatrixError::Config(format!(
                "output.compression_level must be 0-{}, got {}",
                COMPRESSION_LEVEL_MAX, self.output.compression_level
            )));
        }
        if self
            .output
            .missing_value
            .bytes()
            .any(|b| b == b'\t' || b == b'\n' || b == b'\r')
        {
            return Err(MatrixError::Config(
                "output.missing_value must not contain tabs or line breaks".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `PHENO_MATRIX_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), MatrixError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable lookup; unset variables are skipped
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), MatrixError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PHENO_MATRIX_COMPRESSION_LEVEL") {
            self.output.compression_level = parse_env("PHENO_MATRIX_COMPRESSION_LEVEL", &v)?;
        }
        if let Some(v) = lookup("PHENO_MATRIX_COMMENT_HEADER") {
            self.output.comment_header = parse_bool("PHENO_MATRIX_COMMENT_HEADER", &v)?;
        }
        if let Some(v) = lookup("PHENO_MATRIX_MISSING_VALUE") {
            self.output.missing_value = v;
        }
        if let Some(v) = lookup("PHENO_MATRIX_TRAILING_LINES") {
            self.merge.trailing_lines = match v.to_lowercase().as_str() {
                "fail" => TrailingLinesPolicy::Fail,
                "ignore" => TrailingLinesPolicy::Ignore,
                other => {
                    return Err(MatrixError::Config(format!(
                        "PHENO_MATRIX_TRAILING_LINES must be fail or ignore, got {}",
                        other
                    )))
                }
            };
        }
        if let Some(v) = lookup("PHENO_MATRIX_PROGRESS_INTERVAL") {
            self.merge.progress_interval = parse_env("PHENO_MATRIX_PROGRESS_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("PHENO_MATRIX_FD_HEADROOM") {
            self.resources.fd_headroom = parse_env("PHENO_MATRIX_FD_HEADROOM", &v)?;
        }
        if let Some(v) = lookup("PHENO_MATRIX_LOG_FORMAT") {
            self.logging.format = match v.to_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(MatrixError::Config(format!(
                        "PHENO_MATRIX_LOG_FORMAT must be text or json, got {}",
                        other
                    )))
                }
            };
        }
        self.validate()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, MatrixError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| MatrixError::Config(format!("{}={}: {}", name, value, e)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, MatrixError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(MatrixError::Config(format!(
            "{}={}: expected true or false",
            name, value
        ))),
    }
}

/// Output container settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Prefix the header line with `#` (default: true)
    pub comment_header: bool,
    /// DEFLATE level, 0-9 (default: 6)
    pub compression_level: u32,
    /// Placeholder written for each field of a source lacking a row (default: empty)
    pub missing_value: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            comment_header: true,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            missing_value: String::new(),
        }
    }
}

/// What to do with source lines left once the canonical stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingLinesPolicy {
    /// Abort with an alignment error
    #[default]
    Fail,
    /// Log a warning and keep the output
    Ignore,
}

/// Merge loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub trailing_lines: TrailingLinesPolicy,
    /// Rows between progress log lines; 0 disables them (default: 1,000,000)
    pub progress_interval: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            trailing_lines: TrailingLinesPolicy::Fail,
            progress_interval: 1_000_000,
        }
    }
}

impl MergeConfig {
    pub fn test() -> Self {
        MergeConfig {
            trailing_lines: TrailingLinesPolicy::Fail,
            progress_interval: 2,
        }
    }
}

/// Process resource settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Descriptors reserved beyond one per source (default: 100)
    pub fd_headroom: u64,
    /// Raise the soft descriptor limit before opening sources (default: true)
    pub raise_fd_limit: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        ResourceConfig {
            fd_headroom: 100,
            raise_fd_limit: true,
        }
    }
}

impl ResourceConfig {
    pub fn test() -> Self {
        ResourceConfig {
            fd_headroom: 100,
            raise_fd_limit: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings; `RUST_LOG` wins over `filter` when set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = MatrixConfig::default();
        assert!(config.output.comment_header);
        assert_eq!(config.output.compression_level, 6);
        assert_eq!(config.output.missing_value, "");
        assert_eq!(config.merge.trailing_lines, TrailingLinesPolicy::Fail);
        assert_eq!(config.merge.progress_interval, 1_000_000);
        assert_eq!(config.resources.fd_headroom, 100);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(MatrixConfig::from_toml_str("").unwrap(), MatrixConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = MatrixConfig::from_toml_str(
            r#"
            [output]
            missing_value = "NA"

            [merge]
            trailing_lines = "ignore"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.output.missing_value, "NA");
        assert_eq!(config.output.compression_level, 6);
        assert_eq!(config.merge.trailing_lines, TrailingLinesPolicy::Ignore);
        assert_eq!(config.merge.progress_interval, 1_000_000);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(MatrixConfig::from_toml_str("[output]\ncompression_level = 12").is_err());
        assert!(MatrixConfig::from_toml_str("[merge]\ntrailing_lines = \"skip\"").is_err());
        assert!(MatrixConfig::from_toml_str("[output]\nmissing_value = \"a\\tb\"").is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PHENO_MATRIX_COMPRESSION_LEVEL", "9"),
            ("PHENO_MATRIX_COMMENT_HEADER", "false"),
            ("PHENO_MATRIX_TRAILING_LINES", "Ignore"),
            ("PHENO_MATRIX_FD_HEADROOM", "32"),
        ]
        .into_iter()
        .collect();

        let mut config = MatrixConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.output.compression_level, 9);
        assert!(!config.output.comment_header);
        assert_eq!(config.merge.trailing_lines, TrailingLinesPolicy::Ignore);
        assert_eq!(config.resources.fd_headroom, 32);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = MatrixConfig::default();
        let err = config
            .apply_overrides(|name| {
                (name == "PHENO_MATRIX_PROGRESS_INTERVAL").then(|| "often".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, MatrixError::Config(ref msg) if msg.contains("PROGRESS_INTERVAL")));
    }
}
