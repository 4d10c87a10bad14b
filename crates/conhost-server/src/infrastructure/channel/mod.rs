//! Device-channel infrastructure.
//!
//! The device channel is the transport client requests arrive on and replies
//! leave by.  One read and at most one write happen per service-loop
//! iteration, always from the I/O thread.
//!
//! # Testability
//!
//! The `DeviceChannel` trait lets tests drive the service loop with a
//! scripted sequence of requests and failures ([`mock::ScriptedChannel`])
//! instead of a live transport.

use thiserror::Error;

pub mod mock;
pub mod stream;

/// Error type for device-channel operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer closed the channel.  Nothing more will ever arrive.
    #[error("device channel peer disconnected")]
    Disconnected,

    /// Any other failure.  The channel is still usable.
    #[error("transient device channel error: {0}")]
    Transient(String),
}

/// Trait abstracting the device channel.
///
/// The production implementation frames requests over a byte stream
/// ([`stream::StreamChannel`]); tests use [`mock::ScriptedChannel`].
pub trait DeviceChannel: Send {
    /// Blocks until the next complete request frame is available.
    fn read_request(&mut self) -> Result<Vec<u8>, ChannelError>;

    /// Sends one complete reply frame.
    fn write_reply(&mut self, reply: &[u8]) -> Result<(), ChannelError>;
}
