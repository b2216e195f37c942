//! Optional TOML configuration file.
//!
//! Every setting the CLI accepts can also live in a file passed with
//! `--config`.  Absent keys fall through to the CLI defaults, and a flag
//! given on the command line always wins over the file.  A few device
//! timings are file-only.
//!
//! ```toml
//! log_level = "debug"
//!
//! [device]
//! vid = 0x0403            # TOML accepts hex integers directly
//! pid = 0x6015
//! baud_rate = 115200
//! write_queue = 4
//! open_attempts = 5
//! open_backoff_ms = 150
//! reconnect_interval_ms = 1000
//!
//! [control]
//! host = "127.0.0.1"
//! port = 9876
//! send_timeout_secs = 2
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::DeviceConfig;

/// Error type for configuration file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    pub device: DeviceSection,
    pub control: ControlSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub baud_rate: Option<u32>,
    pub write_queue: Option<usize>,
    pub open_attempts: Option<u32>,
    pub open_backoff_ms: Option<u64>,
    pub reconnect_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub send_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Parses file contents.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML, unknown keys or out-of-range
    /// values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

impl DeviceSection {
    /// Overwrites the fields of `config` that this section sets.
    pub fn apply_to(&self, config: &mut DeviceConfig) {
        if let Some(vid) = self.vid {
            config.hardware.vendor_id = vid;
        }
        if let Some(pid) = self.pid {
            config.hardware.product_id = pid;
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(capacity) = self.write_queue {
            config.write_queue_capacity = capacity;
        }
        if let Some(attempts) = self.open_attempts {
            config.open_attempts = attempts;
        }
        if let Some(ms) = self.open_backoff_ms {
            config.open_backoff_step = Duration::from_millis(ms);
        }
        if let Some(ms) = self.reconnect_interval_ms {
            config.reconnect_interval = Duration::from_millis(ms);
        }
    }
}

/// Reads and parses the file at `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read (including "not found":
/// an explicitly named file must exist), [`ConfigError::Parse`] otherwise.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigFile::from_toml_str(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
