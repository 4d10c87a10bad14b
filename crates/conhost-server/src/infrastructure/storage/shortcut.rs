//! `TomlShortcutResolver`: shortcut documents stored as TOML.
//!
//! When a client is launched from a shortcut, its console title carries the
//! shortcut's path.  The document at that path looks like:
//!
//! ```toml
//! title = "Developer Prompt"
//! icon_location = 'C:\Tools\dev.ico'
//! icon_index = 2
//! show_window = 3
//! hotkey = 0x0641
//!
//! [console]
//! code_page = 65001
//! window_size = { x = 132, y = 50 }
//! ```
//!
//! The `[console]` table holds the embedded console properties.  A shortcut
//! without it still supplies a title and icon, but leaves the configuration
//! alone.  The top-level `show_window` and `hotkey` belong to the shortcut
//! itself and are only folded into the properties when `[console]` exists.

use std::path::Path;

use conhost_core::PartialConfig;
use serde::Deserialize;
use tracing::debug;

use crate::application::resolve_config::{
    ConfigSourceError, ShortcutResolution, ShortcutResolver,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShortcutDocument {
    title: Option<String>,
    icon_location: Option<String>,
    icon_index: i32,
    show_window: Option<u16>,
    hotkey: Option<u32>,
    console: Option<PartialConfig>,
}

impl ShortcutDocument {
    fn into_resolution(self) -> ShortcutResolution {
        let show_window = self.show_window;
        let hotkey = self.hotkey;
        let console_properties = self.console.map(|mut properties| {
            if show_window.is_some() {
                properties.show_window = show_window;
            }
            if hotkey.is_some() {
                properties.hotkey = hotkey;
            }
            properties
        });
        ShortcutResolution {
            title: self.title,
            icon_location: self.icon_location,
            icon_index: self.icon_index,
            console_properties,
        }
    }
}

/// [`ShortcutResolver`] that treats the shortcut name as a file path.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlShortcutResolver;

impl TomlShortcutResolver {
    pub fn new() -> Self {
        Self
    }
}

impl ShortcutResolver for TomlShortcutResolver {
    fn resolve(&self, shortcut: &str) -> Result<ShortcutResolution, ConfigSourceError> {
        let path = Path::new(shortcut);
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigSourceError::NotFound {
                location: shortcut.to_string(),
            },
            _ => ConfigSourceError::Unreadable {
                location: shortcut.to_string(),
                reason: e.to_string(),
            },
        })?;
        let document: ShortcutDocument =
            toml::from_str(&content).map_err(|e| ConfigSourceError::Unreadable {
                location: shortcut.to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            shortcut,
            has_properties = document.console.is_some(),
            "shortcut resolved"
        );
        Ok(document.into_resolution())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
