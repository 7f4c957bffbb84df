//! # courier-config: daemon configuration
//!
//! The daemon reads one INI file (default `config.ini`) with three required
//! sections. Every field is mandatory; a missing field or an unreadable
//! referenced file is fatal at startup.
//!
//! ```ini
//! [server]
//! threads = 4
//! pid = /run/courierd.pid
//! port = 9400
//!
//! [storage]
//! storage_library = memory
//! storage_config = storage.ini
//!
//! [logger]
//! log_file = courierd.log
//! max_file_size = 1048576
//! max_file_count = 5
//! ```

use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file itself does not exist.
    #[error("config file `{0}` does not exist")]
    FileNotFound(PathBuf),

    /// A section or field is missing or has the wrong shape.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// The referenced storage config file does not exist.
    #[error("storage config `{0}` does not exist")]
    StorageConfigMissing(PathBuf),
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// RPC worker count.
    pub threads: usize,
    /// PID file path, written at startup.
    pub pid: PathBuf,
    /// TCP port to listen on.
    pub port: u16,
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Back-end selector (historically the plugin path; now the registered
    /// back-end name, e.g. `memory`).
    pub storage_library: String,
    /// Back-end specific config file, handed to the back-end factory.
    pub storage_config: PathBuf,
}

/// `[logger]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerSection {
    /// Log file path.
    pub log_file: PathBuf,
    /// Bytes per log file before rotation.
    pub max_file_size: u64,
    /// Rotated files kept.
    pub max_file_count: usize,
}

/// The full daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CourierConfig {
    /// `[server]` section.
    pub server: ServerSection,
    /// `[storage]` section.
    pub storage: StorageSection,
    /// `[logger]` section.
    pub logger: LoggerSection,
}

impl CourierConfig {
    /// Loads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let raw = Config::builder()
            .add_source(File::from(path.to_path_buf()).format(FileFormat::Ini))
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let parsed: Self = raw
            .try_deserialize()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if !parsed.storage.storage_config.exists() {
            return Err(ConfigError::StorageConfigMissing(
                parsed.storage.storage_config.clone(),
            ));
        }

        Ok(parsed)
    }
}
