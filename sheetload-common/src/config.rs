//! Import configuration and config-file resolution
//!
//! Configuration is an explicit value handed to the orchestrator and the
//! upload client. Nothing here is process-wide state.
//!
//! # Sources Priority
//!
//! 1. Command-line arguments (applied by the binary on top of the loaded value)
//! 2. Explicit config file (`--config` / `SHEETLOAD_CONFIG`)
//! 3. Per-user config file (`<config_dir>/sheetload/config.toml`)
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Settings consumed by the orchestrator and the upload client
///
/// Every field has a built-in default, so a partial TOML file (or none at
/// all) is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Spreadsheet cloned when the job has to create its target
    pub template_spreadsheet_id: Option<String>,

    /// Files larger than this are rejected before any read
    ///
    /// Default: 50
    pub max_file_size_mb: f64,

    /// Fixed throttle slept before every remote request
    ///
    /// Default: 1.0
    pub request_delay_secs: f64,

    /// Pause between two consecutive files
    ///
    /// Default: 2.0
    pub file_delay_secs: f64,

    /// Retries allowed per request after the first attempt
    ///
    /// Default: 3
    pub max_retries: u32,

    /// Backoff before retry `n` is `backoff_base_secs * 2^n`, capped
    ///
    /// Default: 30.0
    pub backoff_base_secs: f64,

    /// Upper bound for a single backoff sleep
    ///
    /// Default: 300.0
    pub backoff_max_secs: f64,

    /// Rows sent per batched write request
    ///
    /// Default: 1000
    pub batch_rows: usize,

    /// Strict decode candidates, in priority order (WHATWG labels)
    pub encodings: Vec<String>,

    /// Lossy decoder used when every strict candidate fails
    ///
    /// Empty string disables the fallback.
    pub fallback_encoding: String,

    /// Write the per-tab row summary onto the first tab after the run
    pub write_summary: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Plain-text log file; `None` logs to the console only
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("import_log.txt")),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            template_spreadsheet_id: None,
            max_file_size_mb: 50.0,
            request_delay_secs: 1.0,
            file_delay_secs: 2.0,
            max_retries: 3,
            backoff_base_secs: 30.0,
            backoff_max_secs: 300.0,
            batch_rows: 1000,
            encodings: vec!["utf-8".to_string(), "euc-kr".to_string()],
            fallback_encoding: "windows-1252".to_string(),
            write_summary: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl ImportConfig {
    /// Parse a TOML document; absent keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read config {} failed: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if !(self.max_file_size_mb.is_finite() && self.max_file_size_mb > 0.0) {
            return Err(Error::Config(format!(
                "max_file_size_mb must be positive, got {}",
                self.max_file_size_mb
            )));
        }

        for (name, value) in [
            ("request_delay_secs", self.request_delay_secs),
            ("file_delay_secs", self.file_delay_secs),
            ("backoff_base_secs", self.backoff_base_secs),
            ("backoff_max_secs", self.backoff_max_secs),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(Error::Config(format!(
                    "{} must be a non-negative, representable number of seconds, got {}",
                    name, value
                )));
            }
        }

        if self.batch_rows == 0 {
            return Err(Error::Config("batch_rows must be at least 1".to_string()));
        }

        if self.encodings.is_empty() && self.fallback_encoding.is_empty() {
            return Err(Error::Config(
                "at least one encoding or a fallback encoding is required".to_string(),
            ));
        }

        let labels = self
            .encodings
            .iter()
            .chain(std::iter::once(&self.fallback_encoding).filter(|l| !l.is_empty()));
        for label in labels {
            if Encoding::for_label_no_replacement(label.trim().as_bytes()).is_none() {
                return Err(Error::Config(format!("Unknown encoding label: {}", label)));
            }
        }

        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        (self.max_file_size_mb * BYTES_PER_MB) as u64
    }

    pub fn request_delay(&self) -> Duration {
        secs(self.request_delay_secs)
    }

    pub fn file_delay(&self) -> Duration {
        secs(self.file_delay_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        secs(self.backoff_max_secs)
    }
}

/// Values `validate()` rejects map to zero
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Per-user config file location: `<config_dir>/sheetload/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sheetload").join("config.toml"))
}

/// Where the resolved configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` / `SHEETLOAD_CONFIG`
    Explicit(PathBuf),
    /// Per-user config file
    User(PathBuf),
    /// Built-in defaults; carries the per-user path that was absent, if known
    Defaults(Option<PathBuf>),
}

impl ConfigSource {
    /// Report the source; call once a subscriber is installed
    pub fn log(&self) {
        match self {
            Self::Explicit(path) | Self::User(path) => {
                info!("Loaded configuration from {}", path.display());
            }
            Self::Defaults(Some(path)) => {
                warn!(
                    "No config file at {}, using built-in defaults",
                    path.display()
                );
            }
            Self::Defaults(None) => {
                warn!("Could not determine config directory, using built-in defaults");
            }
        }
    }
}

/// Resolves the configuration file to load
///
/// An explicit path must exist. The per-user file is optional: when it is
/// missing the built-in defaults are used.
pub struct ConfigResolver {
    explicit: Option<PathBuf>,
    user_default: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            explicit,
            user_default: default_config_path(),
        }
    }

    /// Override the per-user location (tests, packaging)
    pub fn with_user_default(mut self, path: Option<PathBuf>) -> Self {
        self.user_default = path;
        self
    }

    pub fn resolve(&self) -> Result<(ImportConfig, ConfigSource)> {
        if let Some(path) = &self.explicit {
            let config = ImportConfig::load_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        match &self.user_default {
            Some(path) if path.exists() => {
                let config = ImportConfig::load_file(path)?;
                Ok((config, ConfigSource::User(path.clone())))
            }
            other => Ok((ImportConfig::default(), ConfigSource::Defaults(other.clone()))),
        }
    }
}
