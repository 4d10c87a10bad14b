//! Scripted device channel for testing.
//!
//! Allows tests to queue request frames and channel failures without a live
//! transport, and to inspect every reply the service loop wrote.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{ChannelError, DeviceChannel};

/// A mock implementation of [`DeviceChannel`] that replays a script.
///
/// Clones share the same script and reply log, so a test can keep one handle
/// while the service loop owns another.  Once the script is exhausted every
/// read reports [`ChannelError::Disconnected`].
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    script: Arc<Mutex<VecDeque<Result<Vec<u8>, ChannelError>>>>,
    replies: Arc<Mutex<Vec<Vec<u8>>>>,
    reads: Arc<Mutex<usize>>,
}

impl ScriptedChannel {
    /// Creates a channel with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request frame.
    pub fn push_request(&self, frame: Vec<u8>) {
        self.script.lock().expect("lock poisoned").push_back(Ok(frame));
    }

    /// Queues a read failure.
    pub fn push_error(&self, error: ChannelError) {
        self.script.lock().expect("lock poisoned").push_back(Err(error));
    }

    /// Returns every reply written so far, oldest first.
    pub fn replies(&self) -> Vec<Vec<u8>> {
        self.replies.lock().expect("lock poisoned").clone()
    }

    /// Returns how many times [`DeviceChannel::read_request`] was called.
    pub fn read_count(&self) -> usize {
        *self.reads.lock().expect("lock poisoned")
    }

    /// Returns how many scripted entries have not been read yet.
    pub fn remaining(&self) -> usize {
        self.script.lock().expect("lock poisoned").len()
    }
}

impl DeviceChannel for ScriptedChannel {
    fn read_request(&mut self) -> Result<Vec<u8>, ChannelError> {
        *self.reads.lock().expect("lock poisoned") += 1;
        self.script
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or(Err(ChannelError::Disconnected))
    }

    fn write_reply(&mut self, reply: &[u8]) -> Result<(), ChannelError> {
        self.replies.lock().expect("lock poisoned").push(reply.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_channel_replays_in_order() {
        // Arrange
        let mut channel = ScriptedChannel::new();
        channel.push_request(vec![1]);
        channel.push_error(ChannelError::Transient("busy".to_string()));
        channel.push_request(vec![2]);

        // Act / Assert
        assert_eq!(channel.read_request(), Ok(vec![1]));
        assert!(matches!(channel.read_request(), Err(ChannelError::Transient(_))));
        assert_eq!(channel.read_request(), Ok(vec![2]));
        assert_eq!(channel.read_count(), 3);
    }

    #[test]
    fn test_exhausted_script_reports_disconnect() {
        let mut channel = ScriptedChannel::new();
        assert_eq!(channel.read_request(), Err(ChannelError::Disconnected));
    }

    #[test]
    fn test_clones_share_reply_log() {
        // Arrange
        let observer = ScriptedChannel::new();
        let mut owned = observer.clone();

        // Act
        owned.write_reply(&[0xAA, 0xBB]).expect("write");

        // Assert
        assert_eq!(observer.replies(), vec![vec![0xAA, 0xBB]]);
    }
}
