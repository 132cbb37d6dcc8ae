use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::{
    ConnectionConfig, ReaderOptions, DEFAULT_BAUD_RATE, DEFAULT_PORT, DEFAULT_READ_TIMEOUT,
};
use crate::serial::LineFramer;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for the status tool. Missing fields fall back to the defaults
/// the lock firmware expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub suppress_ack: bool,
    pub max_line_len: usize,
    pub log_level: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            suppress_ack: false,
            max_line_len: LineFramer::DEFAULT_MAX_LINE_LEN,
            log_level: "info".to_string(),
        }
    }
}

impl ToolSettings {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load settings from `path`. A file that does not exist yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match Self::try_load(path)? {
            Some(settings) => Ok(settings),
            None => {
                log::info!("No settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Like [`ToolSettings::load`] but reports a missing file as `None`, for
    /// callers that need to announce the fallback themselves.
    pub fn try_load(path: &Path) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(
            self.port_name.clone(),
            self.baud_rate,
            Duration::from_millis(self.read_timeout_ms),
        )
    }

    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            suppress_ack: self.suppress_ack,
            max_line_len: self.max_line_len,
        }
    }
}
