//! In-memory transport for driving connections without sockets.

use std::collections::VecDeque;
use std::convert::Infallible;

use teleproto_mtproto::transport::Transport;

/// Collects every packet sent through it.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: VecDeque<Vec<u8>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the packets sent so far, oldest first.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.sent.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

impl Transport for MemoryTransport {
    type Error = Infallible;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        self.sent.push_back(packet.to_vec());
        Ok(())
    }
}
