//! TOML-based configuration for the Typist client.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\Typist\config.toml`
//! - Linux:    `~/.config/typist/config.toml` (or `$XDG_CONFIG_HOME/typist`)
//! - macOS:    `~/Library/Application Support/Typist/config.toml`
//!
//! # Example file
//!
//! ```toml
//! log_level = "debug"
//!
//! [device]
//! name_pattern = "Typist"
//! scan_window_secs = 8
//!
//! [reconnect]
//! floor_ms = 800
//! ceiling_ms = 15000
//! jitter_ms = 250
//!
//! [typing]
//! send_with_enter = false
//! ```
//!
//! Every field has a serde default, so the file may list only the values the
//! user wants to change, and a missing file is the same as an empty one.
//!
//! Durations are stored as integer milliseconds (seconds for the scan
//! window) so the file stays readable without a duration syntax.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use typist_core::domain::backoff::{DEFAULT_CEILING, DEFAULT_FLOOR, DEFAULT_JITTER};
use typist_core::CHUNK_SIZE;

use crate::application::session::{SessionConfig, DEFAULT_SETTLE_DELAY};
use crate::application::transport::{
    DeviceFilter, LinkSettings, DEFAULT_POST_CONNECT_DELAY, NUS_NOTIFY_UUID, NUS_SERVICE_UUID,
    NUS_WRITE_UUID,
};
use crate::application::writer::{WriterSettings, DEFAULT_INTER_CHUNK_DELAY};
use crate::infrastructure::ble::DEFAULT_SCAN_WINDOW;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub typing: TypingConfig,
}

/// Which peripheral to talk to and how to find it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Advertised-name prefix offered by the chooser.
    #[serde(default = "default_name_pattern")]
    pub name_pattern: String,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: Uuid,
    /// Characteristic the client writes to.
    #[serde(default = "default_write_uuid")]
    pub write_uuid: Uuid,
    /// Characteristic the device notifies on.
    #[serde(default = "default_notify_uuid")]
    pub notify_uuid: Uuid,
    /// How long the chooser scans before picking a device.
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
}

/// Write pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_inter_chunk_delay_ms")]
    pub inter_chunk_delay_ms: u64,
    /// Pause between connecting and enumerating characteristics.
    #[serde(default = "default_post_connect_delay_ms")]
    pub post_connect_delay_ms: u64,
}

/// Backoff between reconnect attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectConfig {
    #[serde(default = "default_floor_ms")]
    pub floor_ms: u64,
    #[serde(default = "default_ceiling_ms")]
    pub ceiling_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

/// Config stream reassembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamConfig {
    /// Wait before re-parsing a stream whose first parse failed.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingConfig {
    /// Press Enter after every typed text.
    #[serde(default = "default_true")]
    pub send_with_enter: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_name_pattern() -> String {
    DeviceFilter::default().name_pattern
}
fn default_service_uuid() -> Uuid {
    NUS_SERVICE_UUID
}
fn default_write_uuid() -> Uuid {
    NUS_WRITE_UUID
}
fn default_notify_uuid() -> Uuid {
    NUS_NOTIFY_UUID
}
fn default_scan_window_secs() -> u64 {
    DEFAULT_SCAN_WINDOW.as_secs()
}
fn default_chunk_size() -> usize {
    CHUNK_SIZE
}
fn default_inter_chunk_delay_ms() -> u64 {
    millis(DEFAULT_INTER_CHUNK_DELAY)
}
fn default_post_connect_delay_ms() -> u64 {
    millis(DEFAULT_POST_CONNECT_DELAY)
}
fn default_floor_ms() -> u64 {
    millis(DEFAULT_FLOOR)
}
fn default_ceiling_ms() -> u64 {
    millis(DEFAULT_CEILING)
}
fn default_jitter_ms() -> u64 {
    millis(DEFAULT_JITTER)
}
fn default_settle_delay_ms() -> u64 {
    millis(DEFAULT_SETTLE_DELAY)
}
fn default_true() -> bool {
    true
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            device: DeviceConfig::default(),
            link: LinkConfig::default(),
            reconnect: ReconnectConfig::default(),
            stream: StreamConfig::default(),
            typing: TypingConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name_pattern: default_name_pattern(),
            service_uuid: default_service_uuid(),
            write_uuid: default_write_uuid(),
            notify_uuid: default_notify_uuid(),
            scan_window_secs: default_scan_window_secs(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            inter_chunk_delay_ms: default_inter_chunk_delay_ms(),
            post_connect_delay_ms: default_post_connect_delay_ms(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            floor_ms: default_floor_ms(),
            ceiling_ms: default_ceiling_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            send_with_enter: default_true(),
        }
    }
}

impl AppConfig {
    /// Projects the file format onto the runtime settings of the session.
    ///
    /// A chunk size of zero is treated as the protocol default.
    pub fn to_session_config(&self) -> SessionConfig {
        let chunk_size = if self.link.chunk_size == 0 {
            CHUNK_SIZE
        } else {
            self.link.chunk_size
        };
        SessionConfig {
            filter: DeviceFilter {
                name_pattern: self.device.name_pattern.clone(),
                service_uuid: self.device.service_uuid,
            },
            link: LinkSettings {
                service_uuid: self.device.service_uuid,
                write_uuid: self.device.write_uuid,
                notify_uuid: self.device.notify_uuid,
                post_connect_delay: Duration::from_millis(self.link.post_connect_delay_ms),
            },
            writer: WriterSettings {
                chunk_size,
                inter_chunk_delay: Duration::from_millis(self.link.inter_chunk_delay_ms),
            },
            reconnect_floor: Duration::from_millis(self.reconnect.floor_ms),
            reconnect_ceiling: Duration::from_millis(self.reconnect.ceiling_ms),
            reconnect_jitter: Duration::from_millis(self.reconnect.jitter_ms),
            settle_delay: Duration::from_millis(self.stream.settle_delay_ms),
            send_with_enter: self.typing.send_with_enter,
        }
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(self.device.scan_window_secs)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// The durable state file that belongs to the config file at `config_path`.
pub fn state_file_for(config_path: &Path) -> PathBuf {
    config_path.with_file_name("state.toml")
}

/// Loads `AppConfig` from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `Typist` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Typist"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("typist"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Typist")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
