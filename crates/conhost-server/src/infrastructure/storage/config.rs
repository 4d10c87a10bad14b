//! TOML-based settings for the console host server.
//!
//! Reads `ServerSettings` from the platform-appropriate settings file:
//! - Windows:  `%APPDATA%\ConsoleHost\server.toml`
//! - Linux:    `~/.config/conhost/server.toml`
//! - macOS:    `~/Library/Application Support/ConsoleHost/server.toml`
//!
//! Example:
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1:24900"
//! log_level = "debug"
//! input_init_timeout_ms = 0        # wait for the input thread forever
//! oem_code_page = 850
//! system_root = 'C:\Windows'
//! console_store = '/etc/conhost/console.toml'
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so the server runs with a
//! missing file, an empty file, or a file written by an older version.

use std::path::{Path, PathBuf};
use std::time::Duration;

use conhost_core::domain::code_page::DEFAULT_OEM_CODE_PAGE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Settings schema ───────────────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default)]
    pub server: ServerSection,
}

/// The `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Address the device channel listens on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long allocation waits for the input thread; `0` waits forever.
    #[serde(default = "default_input_init_timeout_ms")]
    pub input_init_timeout_ms: u64,
    /// Platform OEM code page: the default code page and the fallback for
    /// unsupported ones.
    #[serde(default = "default_oem_code_page")]
    pub oem_code_page: u32,
    /// Absolute system root, abbreviated to `%SystemRoot%` in store keys.
    #[serde(default = "default_system_root")]
    pub system_root: String,
    /// Path of the persistent configuration store.  Defaults to
    /// `console.toml` next to the settings file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_store: Option<PathBuf>,
}

fn default_bind_address() -> String {
    "127.0.0.1:24900".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_input_init_timeout_ms() -> u64 {
    30_000
}
fn default_oem_code_page() -> u32 {
    DEFAULT_OEM_CODE_PAGE
}
fn default_system_root() -> String {
    r"C:\Windows".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            log_level: default_log_level(),
            input_init_timeout_ms: default_input_init_timeout_ms(),
            oem_code_page: default_oem_code_page(),
            system_root: default_system_root(),
            console_store: None,
        }
    }
}

impl ServerSection {
    /// The input-thread wait limit; `None` means unbounded.
    pub fn input_init_timeout(&self) -> Option<Duration> {
        match self.input_init_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// The system root, or `None` when configured empty.
    pub fn system_root(&self) -> Option<String> {
        Some(self.system_root.clone()).filter(|root| !root.is_empty())
    }

    /// Where the persistent configuration store lives.
    pub fn console_store_path(&self, settings_dir: &Path) -> PathBuf {
        self.console_store
            .clone()
            .unwrap_or_else(|| settings_dir.join("console.toml"))
    }
}

// ── Settings repository ───────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the settings file.
///
/// # Errors
///
/// Returns [`SettingsError::NoPlatformConfigDir`] when the platform config
/// base directory cannot be determined from the environment.
pub fn settings_dir() -> Result<PathBuf, SettingsError> {
    platform_config_dir().ok_or(SettingsError::NoPlatformConfigDir)
}

/// Resolves the full path to the settings file.
///
/// # Errors
///
/// Returns [`SettingsError::NoPlatformConfigDir`] if the base directory
/// cannot be determined.
pub fn settings_file_path() -> Result<PathBuf, SettingsError> {
    Ok(settings_dir()?.join("server.toml"))
}

/// Loads settings from `path`, returning the defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] for file-system errors other than "not
/// found", and [`SettingsError::Parse`] if the TOML is malformed.
pub fn load_settings_from(path: &Path) -> Result<ServerSettings, SettingsError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerSettings::default()),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads settings from the platform settings file.
///
/// # Errors
///
/// See [`settings_file_path`] and [`load_settings_from`].
pub fn load_settings() -> Result<ServerSettings, SettingsError> {
    load_settings_from(&settings_file_path()?)
}

/// Resolves the platform config base directory for the server.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("ConsoleHost"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("conhost"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("ConsoleHost")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
