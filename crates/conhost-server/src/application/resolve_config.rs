//! ConfigResolver: merges the configuration tiers into one effective
//! [`SessionConfig`].
//!
//! # Precedence (for beginners)
//!
//! Four sources contribute to a session's configuration.  Each later tier
//! overrides the fields the earlier ones set:
//!
//! ```text
//! 1. hardcoded defaults
//! 2. persistent store: global defaults, then the title-agnostic default record
//! 3. shortcut properties            (launch says "title is a shortcut")
//!    or the per-title store record  (any other launch)
//! 4. the caller's startup info      (only fields the caller flagged)
//! ```
//!
//! A final validation pass clamps the merged result into range.
//!
//! # Shortcut downgrade
//!
//! When the launch claims its title is a shortcut but the shortcut yields no
//! console property block (or cannot be read at all), resolution continues
//! exactly as if the claim had never been made: the "title is a shortcut"
//! flag is cleared and the per-title store record is used instead.
//!
//! A configuration source that cannot be read is never fatal.  The tier is
//! skipped and a warning is logged; the values from lower tiers stay in
//! effect.

use conhost_core::domain::title::{bound_to_utf16_units, translate_console_title};
use conhost_core::protocol::messages::TITLE_CAPACITY;
use conhost_core::{ConnectInfo, PartialConfig, SessionConfig, StartupFlags};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for configuration sources.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigSourceError {
    /// The source does not exist.
    #[error("{location} not found")]
    NotFound { location: String },

    /// The source exists but could not be read or parsed.
    #[error("{location} could not be read: {reason}")]
    Unreadable { location: String, reason: String },
}

/// The persistent configuration store.
///
/// Infrastructure implementation reads a TOML document; unit tests use the
/// generated `MockConfigStore`.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    /// Global-scope defaults.
    fn load_global_defaults(&self) -> Result<PartialConfig, ConfigSourceError>;

    /// The title-agnostic default record.
    fn load_default_record(&self) -> Result<PartialConfig, ConfigSourceError>;

    /// The record stored under `key` (a translated console title).  A title
    /// with no record yields an empty [`PartialConfig`].
    fn load_by_title(&self, key: &str) -> Result<PartialConfig, ConfigSourceError>;
}

/// What a shortcut resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcutResolution {
    /// Title the shortcut supplies, if any.
    pub title: Option<String>,
    /// Path of the icon the shortcut names, if any.
    pub icon_location: Option<String>,
    pub icon_index: i32,
    /// The embedded console property block.  `None` when the shortcut has
    /// none, which triggers the downgrade path.
    pub console_properties: Option<PartialConfig>,
}

/// Resolves a shortcut reference into its properties.
///
/// Infrastructure implementation reads a TOML shortcut document; unit tests
/// use the generated `MockShortcutResolver`.
#[cfg_attr(test, mockall::automock)]
pub trait ShortcutResolver: Send + Sync {
    fn resolve(&self, shortcut: &str) -> Result<ShortcutResolution, ConfigSourceError>;
}

/// Where the session's icon comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconReference {
    pub location: String,
    pub index: i32,
}

/// Output of [`ConfigResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    /// The validated, effective configuration.
    pub config: SessionConfig,
    /// The session title (the shortcut's title when one was resolved).
    pub title: String,
    pub icon: IconReference,
}

/// Merges the configuration tiers for new sessions.
pub struct ConfigResolver {
    store: Box<dyn ConfigStore>,
    shortcuts: Box<dyn ShortcutResolver>,
    oem_code_page: u32,
    system_root: Option<String>,
}

impl ConfigResolver {
    /// Creates a resolver.
    ///
    /// `oem_code_page` is both the hardcoded default code page and the
    /// replacement for unsupported code pages.  `system_root`, when set, is
    /// abbreviated to `%SystemRoot%` in per-title store keys.
    pub fn new(
        store: Box<dyn ConfigStore>,
        shortcuts: Box<dyn ShortcutResolver>,
        oem_code_page: u32,
        system_root: Option<String>,
    ) -> Self {
        Self {
            store,
            shortcuts,
            oem_code_page,
            system_root,
        }
    }

    /// Produces the effective configuration for the client described by
    /// `info`.
    ///
    /// Pure with respect to its sources: resolving the same request twice
    /// against unchanged sources yields identical results.
    pub fn resolve(&self, info: &ConnectInfo) -> ResolvedSession {
        let startup = &info.settings;
        let mut flags = startup.startup_flags;
        let mut title = info.title.to_string_lossy();
        let mut icon = None;

        // Tier 1.
        let mut config = SessionConfig::with_defaults(self.oem_code_page);

        // Tier 2.
        config = apply_source(config, "global defaults", self.store.load_global_defaults());
        config = apply_source(config, "default record", self.store.load_default_record());

        // Tier 3.
        let mut shortcut_loaded = false;
        if flags.title_is_link_name() {
            match self.shortcuts.resolve(&title) {
                Ok(resolution) => {
                    if let Some(location) = resolution.icon_location.filter(|l| !l.is_empty()) {
                        icon = Some(IconReference {
                            location,
                            index: resolution.icon_index,
                        });
                    }
                    if let Some(resolved) = resolution.title.filter(|t| !t.is_empty()) {
                        title = bound_to_utf16_units(&resolved, TITLE_CAPACITY - 1);
                    }
                    if let Some(properties) = resolution.console_properties {
                        config = config.apply_partial(&properties);
                        shortcut_loaded = true;
                    }
                }
                Err(e) => warn!(tier = "shortcut", "configuration source skipped: {e}"),
            }
        }

        if shortcut_loaded {
            // The shortcut's geometry wins over size requests that only ride
            // along with a shortcut launch.
            flags = flags.without(StartupFlags::USE_SIZE | StartupFlags::USE_COUNT_CHARS);
        } else {
            flags = flags.without(StartupFlags::TITLE_IS_LINK_NAME);
            let key = translate_console_title(&title, self.system_root.as_deref(), true);
            debug!(%key, "per-title lookup");
            config = apply_source(config, "per-title record", self.store.load_by_title(&key));
        }

        // Tier 4, then validation.
        let config = config
            .with_startup_flags(flags)
            .apply_startup_info(startup)
            .validate(self.oem_code_page);

        let icon = icon.unwrap_or_else(|| IconReference {
            location: info.app_name.to_string_lossy(),
            index: 0,
        });

        ResolvedSession {
            config,
            title,
            icon,
        }
    }
}

fn apply_source(
    config: SessionConfig,
    tier: &'static str,
    source: Result<PartialConfig, ConfigSourceError>,
) -> SessionConfig {
    match source {
        Ok(partial) => config.apply_partial(&partial),
        Err(e) => {
            warn!(tier, "configuration source skipped: {e}");
            config
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
