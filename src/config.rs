//! Configuration loading.
//!
//! Settings live in an optional TOML file. Missing keys take their defaults;
//! a missing file means all defaults. A file that exists but cannot be read
//! or parsed is an error, since silently ignoring it would sync with
//! settings the user did not ask for.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "kobo2calibre.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Worker threads for per-book conversion; 0 lets rayon decide.
    pub jobs: usize,
    /// Desktop color used when the device did not record one.
    pub default_color: String,
    /// Prefix joining the device mount point to a book's device path.
    pub device_prefix: String,
    pub tokenizer: TokenizerConfig,
    pub offsets: OffsetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LogLevel::default(),
            jobs: 0,
            default_color: default_color(),
            device_prefix: default_device_prefix(),
            tokenizer: TokenizerConfig::default(),
            offsets: OffsetConfig::default(),
        }
    }
}

/// Sentence splitting options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub split_on_colon: bool,
    pub extra_abbreviations: Vec<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig {
            split_on_colon: true,
            extra_abbreviations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OffsetConfig {
    /// Device offsets count characters of `\uXXXX`-escaped text.
    pub escaped: bool,
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

fn default_color() -> String {
    "yellow".to_string()
}

fn default_device_prefix() -> String {
    "file:///mnt/onboard/".to_string()
}

/// Load configuration from `path`, or defaults if it does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        Err(err) => return Err(err.into()),
    };

    let config: Config = toml::from_str(&contents)?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}
