//! Storage infrastructure: TOML-backed files.
//!
//! - `config` – the server's own settings file (`server.toml`).
//! - `console_store` – the persistent configuration store consulted by the
//!   configuration resolver (global defaults, default record, per-title
//!   records).
//! - `shortcut` – shortcut documents whose path is given as the console
//!   title when a client is launched from a shortcut.
//!
//! The store and shortcut files are re-read on every lookup, so edits take
//! effect for the next session without a restart.

pub mod config;
pub mod console_store;
pub mod shortcut;
