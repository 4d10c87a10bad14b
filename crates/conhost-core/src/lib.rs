//! # conhost-core
//!
//! Shared library for the console host server containing the device-channel
//! wire protocol, the connection-request validator, and the terminal
//! configuration domain.
//!
//! It has zero dependencies on OS APIs, threads, or sockets, so everything in
//! here can be unit-tested on any platform.
//!
//! # Architecture overview
//!
//! A console host is a long-lived server process.  Client processes attach to
//! it through a kernel-mediated device channel, send a connection request,
//! and from then on issue an indefinite stream of API requests against one
//! shared terminal session.
//!
//! This crate is the foundation both sides of that channel agree on:
//!
//! - **`protocol`** – How bytes travel over the device channel.  Requests and
//!   replies are framed with a small fixed header; the connection request is a
//!   fixed-size record with bounded, null-terminated text fields that must be
//!   validated before anything else looks at it.
//!
//! - **`domain`** – The effective terminal configuration (`SessionConfig`),
//!   the partial configuration records each precedence tier contributes
//!   (`PartialConfig`), and the pure functions that merge and validate them.

pub mod domain;
pub mod protocol;

pub use domain::config::{Coord, PartialConfig, SessionConfig, StartupFlags};
pub use protocol::codec::{decode_request, encode_reply, encode_request, ProtocolError};
pub use protocol::connect::{decode_connect_info, ConnectInfo, MalformedRequest};
pub use protocol::messages::{ApiKind, ApiReply, ApiRequest, StatusCode};
