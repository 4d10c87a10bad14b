//! Device channel over a blocking byte stream.
//!
//! Every frame, in both directions, is preceded by its length as a
//! little-endian `u32`:
//!
//! ```text
//! [frame_len:4][frame:frame_len]
//! ```
//!
//! The server binary wraps the accepted TCP connection in a
//! [`StreamChannel`]; tests can use any `Read + Write` type.

use std::io::{self, Read, Write};

use conhost_core::protocol::messages::{MAX_PAYLOAD_SIZE, REQUEST_HEADER_SIZE};
use tracing::{trace, warn};

use super::{ChannelError, DeviceChannel};

/// Largest frame accepted from the peer.
pub const MAX_FRAME_SIZE: usize = REQUEST_HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// A [`DeviceChannel`] that frames requests and replies over a byte stream.
pub struct StreamChannel<S> {
    stream: S,
}

impl<S: Read + Write + Send> StreamChannel<S> {
    /// Wraps `stream`.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write + Send> DeviceChannel for StreamChannel<S> {
    fn read_request(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).map_err(classify)?;
        let len = u32::from_le_bytes(len_buf) as usize;

        if len > MAX_FRAME_SIZE {
            // Drain the oversized frame so the next read starts on a boundary.
            let skipped = io::copy(&mut (&mut self.stream).take(len as u64), &mut io::sink())
                .map_err(classify)?;
            if skipped < len as u64 {
                return Err(ChannelError::Disconnected);
            }
            warn!(len, "oversized frame discarded");
            return Err(ChannelError::Transient(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_SIZE}-byte limit"
            )));
        }

        let mut frame = vec![0u8; len];
        self.stream.read_exact(&mut frame).map_err(classify)?;
        trace!(len, "request frame received");
        Ok(frame)
    }

    fn write_reply(&mut self, reply: &[u8]) -> Result<(), ChannelError> {
        let len = u32::try_from(reply.len())
            .map_err(|_| ChannelError::Transient("reply too large to frame".to_string()))?;
        self.stream.write_all(&len.to_le_bytes()).map_err(classify)?;
        self.stream.write_all(reply).map_err(classify)?;
        self.stream.flush().map_err(classify)
    }
}

/// Maps an I/O error onto the disconnect/transient split.
fn classify(e: io::Error) -> ChannelError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => ChannelError::Disconnected,
        _ => ChannelError::Transient(e.to_string()),
    }
}
