//! Application layer of the console host server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The *application* layer sits between the pure configuration domain in
//! `conhost_core` and the OS-facing adapters in `infrastructure`.  Code in
//! this layer:
//!
//! - **Orchestrates** domain values to fulfil a request (e.g. "a client
//!   connected: resolve its configuration and publish a session").
//! - **Depends on abstractions** (traits) for every external collaborator, so
//!   configuration stores, the device channel, and the window host can be
//!   replaced in tests.
//! - **Contains no file system access and no socket I/O.**
//!
//! # Sub-modules
//!
//! - **`resolve_config`** – Merges the four configuration tiers into one
//!   effective `SessionConfig`, including the shortcut downgrade path.
//!
//! - **`session`** – The shared `Session`, its `ProcessRecord`s, and the
//!   `SessionLock` that every reader and writer goes through.
//!
//! - **`bootstrap`** – Creates a session for the first connecting client and
//!   performs the input-thread handshake.
//!
//! - **`dispatch`** – Routes decoded API requests to session operations and
//!   builds the replies.
//!
//! - **`service_loop`** – Reads requests from the device channel, dispatches
//!   them, and writes replies until the channel disconnects.

pub mod bootstrap;
pub mod dispatch;
pub mod resolve_config;
pub mod service_loop;
pub mod session;
