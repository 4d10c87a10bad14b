//! `TomlConfigStore`: the persistent configuration store as a TOML document.
//!
//! ```toml
//! [global]
//! code_page = 850
//!
//! [default]
//! cursor_size = 50
//! screen_buffer_size = { x = 120, y = 9001 }
//!
//! [titles."%SystemRoot%_system32_cmd.exe"]
//! fill_attribute = 0x1F
//! ```
//!
//! Every table is a [`PartialConfig`]: fields that are absent leave the
//! lower tier's value in place.  A title with no `[titles."…"]` entry is not
//! an error, it simply contributes nothing.
//!
//! The file is read on every lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use conhost_core::PartialConfig;
use serde::Deserialize;
use tracing::trace;

use crate::application::resolve_config::{ConfigSourceError, ConfigStore};

/// On-disk layout of the store.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoreDocument {
    global: PartialConfig,
    default: PartialConfig,
    titles: HashMap<String, PartialConfig>,
}

/// [`ConfigStore`] backed by one TOML file.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn read_document(&self) -> Result<StoreDocument, ConfigSourceError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigSourceError::NotFound {
                    location: self.location(),
                })
            }
            Err(e) => {
                return Err(ConfigSourceError::Unreadable {
                    location: self.location(),
                    reason: e.to_string(),
                })
            }
        };
        toml::from_str(&content).map_err(|e| ConfigSourceError::Unreadable {
            location: self.location(),
            reason: e.to_string(),
        })
    }
}

impl ConfigStore for TomlConfigStore {
    fn load_global_defaults(&self) -> Result<PartialConfig, ConfigSourceError> {
        Ok(self.read_document()?.global)
    }

    fn load_default_record(&self) -> Result<PartialConfig, ConfigSourceError> {
        Ok(self.read_document()?.default)
    }

    fn load_by_title(&self, key: &str) -> Result<PartialConfig, ConfigSourceError> {
        let mut document = self.read_document()?;
        let record = document.titles.remove(key);
        trace!(key, found = record.is_some(), "per-title record");
        Ok(record.unwrap_or_default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use conhost_core::Coord;
    use uuid::Uuid;

    /// Writes `content` to a fresh temp file and returns a store over it.
    fn store_with(content: &str) -> TomlConfigStore {
        let path = std::env::temp_dir().join(format!("conhost_store_{}.toml", Uuid::new_v4()));
        std::fs::write(&path, content).expect("write store");
        TomlConfigStore::new(path)
    }

    fn cleanup(store: &TomlConfigStore) {
        std::fs::remove_file(store.path()).ok();
    }

    const STORE: &str = r#"
[global]
code_page = 850

[default]
cursor_size = 50
screen_buffer_size = { x = 120, y = 9001 }

[titles."%SystemRoot%_system32_cmd.exe"]
fill_attribute = 31
"#;

    #[test]
    fn test_reads_each_table() {
        // Arrange
        let store = store_with(STORE);

        // Act
        let global = store.load_global_defaults().expect("global");
        let default = store.load_default_record().expect("default");
        let titled = store
            .load_by_title("%SystemRoot%_system32_cmd.exe")
            .expect("title");

        // Assert
        assert_eq!(global.code_page, Some(850));
        assert_eq!(default.cursor_size, Some(50));
        assert_eq!(default.screen_buffer_size, Some(Coord::new(120, 9001)));
        assert_eq!(titled.fill_attribute, Some(31));
        cleanup(&store);
    }

    #[test]
    fn test_unknown_title_contributes_nothing() {
        let store = store_with(STORE);

        let record = store.load_by_title("no such title").expect("lookup");

        assert!(record.is_empty());
        cleanup(&store);
    }

    #[test]
    fn test_missing_tables_are_empty() {
        let store = store_with("");

        assert!(store.load_global_defaults().expect("global").is_empty());
        assert!(store.load_default_record().expect("default").is_empty());
        cleanup(&store);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let path = std::env::temp_dir().join(format!("conhost_absent_{}.toml", Uuid::new_v4()));
        let store = TomlConfigStore::new(&path);

        let err = store.load_global_defaults().unwrap_err();

        assert_eq!(
            err,
            ConfigSourceError::NotFound {
                location: path.display().to_string()
            }
        );
    }

    #[test]
    fn test_malformed_file_is_unreadable() {
        let store = store_with("[global\ncode_page = ");

        let err = store.load_default_record().unwrap_err();

        assert!(matches!(err, ConfigSourceError::Unreadable { .. }), "got {err:?}");
        cleanup(&store);
    }

    #[test]
    fn test_edits_are_seen_on_next_lookup() {
        // Arrange
        let store = store_with("[global]\ncode_page = 850\n");
        assert_eq!(store.load_global_defaults().unwrap().code_page, Some(850));

        // Act
        std::fs::write(store.path(), "[global]\ncode_page = 65001\n").unwrap();

        // Assert
        assert_eq!(store.load_global_defaults().unwrap().code_page, Some(65001));
        cleanup(&store);
    }
}
