//! Domain entities for the console host.
//!
//! This module contains pure configuration logic with no infrastructure
//! dependencies: no file system, no threads, no device channel.  The server
//! crate depends on it; it never depends on the server crate.

/// Effective configuration and the per-tier partial records.
///
/// See [`config::SessionConfig`] for the main type.
pub mod config;

pub mod code_page;
pub mod title;
