//! Terminal configuration: the effective [`SessionConfig`] and the
//! [`PartialConfig`] records contributed by each precedence tier.
//!
//! # Precedence tiers
//!
//! The effective configuration of a session is built by applying four
//! sources in ascending precedence (later overrides earlier):
//!
//! ```text
//! 1. hardcoded defaults            SessionConfig::with_defaults
//! 2. persistent store              apply_partial (global, then default record)
//! 3. shortcut / per-title record   apply_partial
//! 4. caller startup info           apply_startup_info
//! ```
//!
//! followed by a final [`SessionConfig::validate`] pass.
//!
//! Every tier is a pure function `(SessionConfig, &Source) -> SessionConfig`,
//! so the order in which individual fields are assigned inside a tier can
//! never matter, and resolving the same sources twice yields an identical
//! value.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::code_page::{is_supported_code_page, DEFAULT_OEM_CODE_PAGE};

// ── Limits used by validation ─────────────────────────────────────────────────

/// Largest screen-buffer extent accepted on either axis.
pub const MAX_SCREEN_BUFFER_EXTENT: i16 = 9999;

/// Smallest and largest cursor size, in percent of the cell height.
pub const MIN_CURSOR_SIZE: u32 = 1;
pub const MAX_CURSOR_SIZE: u32 = 100;

/// Largest number of commands kept per history buffer.
pub const MAX_HISTORY_BUFFER_SIZE: u32 = 999;

/// Largest number of history buffers.
pub const MAX_HISTORY_BUFFER_COUNT: u32 = 999;

/// `SW_SHOWNORMAL`.
pub const SHOW_NORMAL: u16 = 1;

// ── Coordinates ───────────────────────────────────────────────────────────────

/// A character-cell coordinate or extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: i16,
    pub y: i16,
}

impl Coord {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

// ── Startup flags ─────────────────────────────────────────────────────────────

/// Launch flags supplied by the process that started the client.
///
/// Each `USE_*` bit states that the launching process explicitly requested
/// the matching field, so that field is applied in the caller-override tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StartupFlags(pub u32);

impl StartupFlags {
    pub const USE_SHOW_WINDOW: u32 = 0x0000_0001;
    pub const USE_SIZE: u32 = 0x0000_0002;
    pub const USE_POSITION: u32 = 0x0000_0004;
    pub const USE_COUNT_CHARS: u32 = 0x0000_0008;
    pub const USE_FILL_ATTRIBUTE: u32 = 0x0000_0010;
    pub const USE_HOTKEY: u32 = 0x0000_0200;
    pub const TITLE_IS_LINK_NAME: u32 = 0x0000_0800;

    /// Returns `true` if every bit in `flags` is set.
    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    /// Returns a copy with `flags` set.
    pub fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }

    /// Returns a copy with `flags` cleared.
    pub fn without(self, flags: u32) -> Self {
        Self(self.0 & !flags)
    }

    /// `true` when the launch says the title is the path of a shortcut.
    pub fn title_is_link_name(self) -> bool {
        self.contains(Self::TITLE_IS_LINK_NAME)
    }
}

// ── Partial configuration ─────────────────────────────────────────────────────

/// The fields one configuration source supplies.  `None` means "this source
/// has no opinion"; the value from the lower tier is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_attribute: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup_fill_attribute: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_window: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_buffer_size: Option<Coord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<Coord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_origin: Option<Coord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_face: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<Coord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_buffer_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_buffer_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_no_dup: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quick_edit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_mode: Option<bool>,
}

impl PartialConfig {
    /// `true` when the source supplies no field at all.
    pub fn is_empty(&self) -> bool {
        *self == PartialConfig::default()
    }
}

// ── Effective configuration ───────────────────────────────────────────────────

/// The effective terminal configuration of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub code_page: u32,
    pub fill_attribute: u16,
    pub popup_fill_attribute: u16,
    pub show_window: u16,
    pub screen_buffer_size: Coord,
    pub window_size: Coord,
    pub window_origin: Coord,
    pub hotkey: u32,
    pub startup_flags: StartupFlags,
    pub cursor_size: u32,
    pub font_face: Option<String>,
    pub font_size: Coord,
    pub history_buffer_size: u32,
    pub history_buffer_count: u32,
    pub history_no_dup: bool,
    pub quick_edit: bool,
    pub insert_mode: bool,
    /// Face name in effect at launch; recorded by [`validate`](Self::validate)
    /// so a later font change can be detected.
    pub launch_face_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::with_defaults(DEFAULT_OEM_CODE_PAGE)
    }
}

impl SessionConfig {
    /// Tier 1: hardcoded engineering defaults, using `oem_code_page` as the
    /// platform code page.
    pub fn with_defaults(oem_code_page: u32) -> Self {
        Self {
            code_page: oem_code_page,
            fill_attribute: 0x07,
            popup_fill_attribute: 0xF5,
            show_window: SHOW_NORMAL,
            screen_buffer_size: Coord::new(120, 9001),
            window_size: Coord::new(120, 30),
            window_origin: Coord::new(0, 0),
            hotkey: 0,
            startup_flags: StartupFlags::default(),
            cursor_size: 25,
            font_face: None,
            font_size: Coord::new(0, 16),
            history_buffer_size: 50,
            history_buffer_count: 4,
            history_no_dup: false,
            quick_edit: true,
            insert_mode: true,
            launch_face_name: None,
        }
    }

    /// Tiers 2 and 3: overlays every field `partial` supplies.
    pub fn apply_partial(self, partial: &PartialConfig) -> Self {
        Self {
            code_page: partial.code_page.unwrap_or(self.code_page),
            fill_attribute: partial.fill_attribute.unwrap_or(self.fill_attribute),
            popup_fill_attribute: partial
                .popup_fill_attribute
                .unwrap_or(self.popup_fill_attribute),
            show_window: partial.show_window.unwrap_or(self.show_window),
            screen_buffer_size: partial.screen_buffer_size.unwrap_or(self.screen_buffer_size),
            window_size: partial.window_size.unwrap_or(self.window_size),
            window_origin: partial.window_origin.unwrap_or(self.window_origin),
            hotkey: partial.hotkey.unwrap_or(self.hotkey),
            cursor_size: partial.cursor_size.unwrap_or(self.cursor_size),
            font_face: partial.font_face.clone().or(self.font_face),
            font_size: partial.font_size.unwrap_or(self.font_size),
            history_buffer_size: partial
                .history_buffer_size
                .unwrap_or(self.history_buffer_size),
            history_buffer_count: partial
                .history_buffer_count
                .unwrap_or(self.history_buffer_count),
            history_no_dup: partial.history_no_dup.unwrap_or(self.history_no_dup),
            quick_edit: partial.quick_edit.unwrap_or(self.quick_edit),
            insert_mode: partial.insert_mode.unwrap_or(self.insert_mode),
            ..self
        }
    }

    /// Replaces the startup flags.
    pub fn with_startup_flags(self, startup_flags: StartupFlags) -> Self {
        Self {
            startup_flags,
            ..self
        }
    }

    /// Tier 4: applies the caller's startup info.
    ///
    /// Only fields whose `USE_*` bit is set in `self.startup_flags` are taken
    /// from `startup`.  The flags of `self` are used rather than those of
    /// `startup` because earlier tiers may have withdrawn a request (a
    /// shortcut launch clears `USE_SIZE | USE_COUNT_CHARS`).
    pub fn apply_startup_info(self, startup: &SessionConfig) -> Self {
        let flags = self.startup_flags;
        Self {
            show_window: pick(flags, StartupFlags::USE_SHOW_WINDOW, startup.show_window, self.show_window),
            window_size: pick(flags, StartupFlags::USE_SIZE, startup.window_size, self.window_size),
            window_origin: pick(flags, StartupFlags::USE_POSITION, startup.window_origin, self.window_origin),
            screen_buffer_size: pick(
                flags,
                StartupFlags::USE_COUNT_CHARS,
                startup.screen_buffer_size,
                self.screen_buffer_size,
            ),
            fill_attribute: pick(
                flags,
                StartupFlags::USE_FILL_ATTRIBUTE,
                startup.fill_attribute,
                self.fill_attribute,
            ),
            hotkey: pick(flags, StartupFlags::USE_HOTKEY, startup.hotkey, self.hotkey),
            ..self
        }
    }

    /// Final semantic validation: range clamping, mutual-consistency fixups,
    /// and replacement of an unsupported code page by `oem_code_page`.
    pub fn validate(self, oem_code_page: u32) -> Self {
        let screen_buffer_size = Coord::new(
            self.screen_buffer_size.x.clamp(1, MAX_SCREEN_BUFFER_EXTENT),
            self.screen_buffer_size.y.clamp(1, MAX_SCREEN_BUFFER_EXTENT),
        );
        // The window can never be larger than the buffer it views.
        let window_size = Coord::new(
            self.window_size.x.clamp(1, screen_buffer_size.x),
            self.window_size.y.clamp(1, screen_buffer_size.y),
        );

        let code_page = if is_supported_code_page(self.code_page) {
            self.code_page
        } else {
            debug!(
                requested = self.code_page,
                fallback = oem_code_page,
                "unsupported code page replaced"
            );
            oem_code_page
        };

        let font_face = self.font_face.filter(|face| !face.is_empty());
        let launch_face_name = font_face.clone().or(self.launch_face_name);

        Self {
            code_page,
            fill_attribute: self.fill_attribute & 0x00FF,
            popup_fill_attribute: self.popup_fill_attribute & 0x00FF,
            screen_buffer_size,
            window_size,
            cursor_size: self.cursor_size.clamp(MIN_CURSOR_SIZE, MAX_CURSOR_SIZE),
            history_buffer_size: self.history_buffer_size.min(MAX_HISTORY_BUFFER_SIZE),
            history_buffer_count: self.history_buffer_count.clamp(1, MAX_HISTORY_BUFFER_COUNT),
            font_face,
            launch_face_name,
            ..self
        }
    }
}

fn pick<T>(flags: StartupFlags, bit: u32, requested: T, current: T) -> T {
    if flags.contains(bit) {
        requested
    } else {
        current
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn startup_with(flags: u32) -> SessionConfig {
        SessionConfig {
            show_window: 7,
            window_size: Coord::new(200, 60),
            window_origin: Coord::new(15, 25),
            screen_buffer_size: Coord::new(200, 3000),
            fill_attribute: 0x1F,
            hotkey: 0x0741,
            startup_flags: StartupFlags(flags),
            ..SessionConfig::default()
        }
    }

    // ── StartupFlags ──────────────────────────────────────────────────────────

    #[test]
    fn test_startup_flags_with_and_without() {
        let flags = StartupFlags::default()
            .with(StartupFlags::USE_SIZE | StartupFlags::TITLE_IS_LINK_NAME);
        assert!(flags.contains(StartupFlags::USE_SIZE));
        assert!(flags.title_is_link_name());

        let cleared = flags.without(StartupFlags::TITLE_IS_LINK_NAME);
        assert!(!cleared.title_is_link_name());
        assert!(cleared.contains(StartupFlags::USE_SIZE));
    }

    // ── apply_partial ─────────────────────────────────────────────────────────

    #[test]
    fn test_apply_empty_partial_is_identity() {
        let base = SessionConfig::default();
        assert_eq!(base.clone().apply_partial(&PartialConfig::default()), base);
    }

    #[test]
    fn test_apply_partial_overrides_only_supplied_fields() {
        let partial = PartialConfig {
            code_page: Some(65001),
            font_face: Some("Consolas".to_string()),
            ..PartialConfig::default()
        };

        let merged = SessionConfig::default().apply_partial(&partial);

        assert_eq!(merged.code_page, 65001);
        assert_eq!(merged.font_face.as_deref(), Some("Consolas"));
        assert_eq!(merged.window_size, SessionConfig::default().window_size);
        assert_eq!(merged.fill_attribute, 0x07);
    }

    #[test]
    fn test_apply_partial_never_touches_startup_flags() {
        let base = SessionConfig::default().with_startup_flags(StartupFlags(0x0800));
        let merged = base.apply_partial(&PartialConfig {
            hotkey: Some(1),
            ..PartialConfig::default()
        });
        assert_eq!(merged.startup_flags, StartupFlags(0x0800));
    }

    // ── apply_startup_info ────────────────────────────────────────────────────

    #[test]
    fn test_startup_info_without_flags_changes_nothing() {
        let base = SessionConfig::default();
        let merged = base.clone().apply_startup_info(&startup_with(0));
        assert_eq!(merged, base);
    }

    #[test]
    fn test_startup_info_applies_each_flagged_field() {
        let all = StartupFlags::USE_SHOW_WINDOW
            | StartupFlags::USE_SIZE
            | StartupFlags::USE_POSITION
            | StartupFlags::USE_COUNT_CHARS
            | StartupFlags::USE_FILL_ATTRIBUTE
            | StartupFlags::USE_HOTKEY;
        let startup = startup_with(all);

        let merged = SessionConfig::default()
            .with_startup_flags(StartupFlags(all))
            .apply_startup_info(&startup);

        assert_eq!(merged.show_window, 7);
        assert_eq!(merged.window_size, Coord::new(200, 60));
        assert_eq!(merged.window_origin, Coord::new(15, 25));
        assert_eq!(merged.screen_buffer_size, Coord::new(200, 3000));
        assert_eq!(merged.fill_attribute, 0x1F);
        assert_eq!(merged.hotkey, 0x0741);
    }

    #[test]
    fn test_startup_info_uses_effective_flags_not_request_flags() {
        // The request asked for size, but an earlier tier withdrew it.
        let startup = startup_with(StartupFlags::USE_SIZE | StartupFlags::USE_HOTKEY);
        let merged = SessionConfig::default()
            .with_startup_flags(StartupFlags(StartupFlags::USE_HOTKEY))
            .apply_startup_info(&startup);

        assert_eq!(merged.window_size, SessionConfig::default().window_size);
        assert_eq!(merged.hotkey, 0x0741);
    }

    // ── validate ──────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_keeps_sane_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.clone().validate(437), cfg);
    }

    #[test]
    fn test_validate_clamps_zero_and_oversized_buffers() {
        let cfg = SessionConfig {
            screen_buffer_size: Coord::new(0, 20000),
            window_size: Coord::new(0, 0),
            ..SessionConfig::default()
        }
        .validate(437);

        assert_eq!(cfg.screen_buffer_size, Coord::new(1, MAX_SCREEN_BUFFER_EXTENT));
        assert_eq!(cfg.window_size, Coord::new(1, 1));
    }

    #[test]
    fn test_validate_shrinks_window_to_buffer() {
        let cfg = SessionConfig {
            screen_buffer_size: Coord::new(80, 25),
            window_size: Coord::new(120, 30),
            ..SessionConfig::default()
        }
        .validate(437);

        assert_eq!(cfg.window_size, Coord::new(80, 25));
    }

    #[test]
    fn test_validate_clamps_cursor_and_history() {
        let cfg = SessionConfig {
            cursor_size: 0,
            history_buffer_size: 5000,
            history_buffer_count: 0,
            ..SessionConfig::default()
        }
        .validate(437);

        assert_eq!(cfg.cursor_size, MIN_CURSOR_SIZE);
        assert_eq!(cfg.history_buffer_size, MAX_HISTORY_BUFFER_SIZE);
        assert_eq!(cfg.history_buffer_count, 1);

        let big = SessionConfig {
            cursor_size: 250,
            ..SessionConfig::default()
        }
        .validate(437);
        assert_eq!(big.cursor_size, MAX_CURSOR_SIZE);
    }

    #[test]
    fn test_validate_masks_fill_attributes() {
        let cfg = SessionConfig {
            fill_attribute: 0xAB1F,
            ..SessionConfig::default()
        }
        .validate(437);
        assert_eq!(cfg.fill_attribute, 0x1F);
    }

    #[test]
    fn test_validate_replaces_unsupported_code_page_with_oem() {
        let cfg = SessionConfig {
            code_page: 12345,
            ..SessionConfig::default()
        }
        .validate(850);
        assert_eq!(cfg.code_page, 850);
    }

    #[test]
    fn test_validate_records_launch_face_name() {
        let cfg = SessionConfig {
            font_face: Some("Lucida Console".to_string()),
            ..SessionConfig::default()
        }
        .validate(437);
        assert_eq!(cfg.launch_face_name.as_deref(), Some("Lucida Console"));

        let empty = SessionConfig {
            font_face: Some(String::new()),
            ..SessionConfig::default()
        }
        .validate(437);
        assert_eq!(empty.font_face, None);
        assert_eq!(empty.launch_face_name, None);
    }

    // ── serde ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_partial_config_deserializes_sparse_toml() {
        let toml_str = r#"
code_page = 65001
quick_edit = false
screen_buffer_size = { x = 100, y = 2000 }
"#;
        let partial: PartialConfig = toml::from_str(toml_str).expect("deserialize");

        assert_eq!(partial.code_page, Some(65001));
        assert_eq!(partial.quick_edit, Some(false));
        assert_eq!(partial.screen_buffer_size, Some(Coord::new(100, 2000)));
        assert_eq!(partial.hotkey, None);
        assert!(!partial.is_empty());
        assert!(PartialConfig::default().is_empty());
    }
}
