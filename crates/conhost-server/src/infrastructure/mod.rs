//! Infrastructure layer of the console host server.
//!
//! Contains OS-facing adapters: the device channel, TOML-backed
//! configuration sources, display-scaling negotiation, the window host, and
//! the rendering backend.
//!
//! **Dependency rule**: this layer may depend on `conhost_core` and implement
//! traits declared by `application`, but the traits it declares itself must
//! not mention application types.

pub mod channel;
pub mod display;
pub mod render;
pub mod storage;
pub mod window;
