//! Per-connection session state: the session id binding, message ids and
//! sequence numbers.

use std::fmt;

use crate::message::{MessageId, MessageIdGenerator, MessageIdMode};

/// The peer used a different session id than the one already bound.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionMismatch {
    /// Bound session id.
    pub expected: u64,
    /// Session id carried by the packet.
    pub got: u64,
}

impl fmt::Display for SessionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session id {:#x} does not match bound session {:#x}", self.got, self.expected)
    }
}

impl std::error::Error for SessionMismatch {}

/// Tracks per-connection MTProto session state.
///
/// A client picks its session id up front; a server learns it from the
/// first packet that decrypts and refuses any other afterwards.
#[derive(Clone, Debug, Default)]
pub struct Session {
    id: Option<u64>,
    msg_ids: MessageIdGenerator,
    /// Content-related messages sent so far.
    content_count: u32,
    last_seq_no: u32,
    last_received: MessageId,
}

impl Session {
    /// A session with no id yet (server side).
    pub fn new() -> Self {
        Self::default()
    }

    /// A session with a fresh random id (client side).
    pub fn random() -> Self {
        Self::with_id(u64::from_le_bytes(crate::random_bytes()))
    }

    /// A session already bound to `id`.
    pub fn with_id(id: u64) -> Self {
        Self { id: Some(id), ..Self::default() }
    }

    /// The bound session id, if any.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Binds to `id` on first use; afterwards only `id` is accepted.
    /// Returns `true` if this call did the binding.
    pub fn bind(&mut self, id: u64) -> Result<bool, SessionMismatch> {
        match self.id {
            None => {
                self.id = Some(id);
                Ok(true)
            }
            Some(expected) if expected == id => Ok(false),
            Some(expected) => Err(SessionMismatch { expected, got: id }),
        }
    }

    /// Allocate a new message id.
    pub fn next_msg_id(&mut self, mode: MessageIdMode) -> MessageId {
        self.msg_ids.next(mode)
    }

    /// Message id generator, e.g. to apply a clock correction.
    pub fn msg_ids(&mut self) -> &mut MessageIdGenerator {
        &mut self.msg_ids
    }

    /// Current clock correction, in seconds.
    pub fn time_offset(&self) -> i64 {
        self.msg_ids.time_offset()
    }

    /// Sequence number for the next outgoing message: `2n + 1` for
    /// content-related messages (which then bump `n`), `2n` otherwise.
    pub fn next_seq_no(&mut self, content_related: bool) -> u32 {
        let seq = if content_related {
            let seq = self.content_count * 2 + 1;
            self.content_count += 1;
            seq
        } else {
            self.content_count * 2
        };
        self.last_seq_no = seq;
        seq
    }

    /// The most recently assigned sequence number.
    pub fn last_seq_no(&self) -> u32 {
        self.last_seq_no
    }

    /// Records an incoming message id; returns `false` for ids at or below
    /// the newest seen so far.
    pub fn note_received(&mut self, msg_id: MessageId) -> bool {
        if msg_id <= self.last_received {
            return false;
        }
        self.last_received = msg_id;
        true
    }

    /// Newest incoming message id.
    pub fn last_received(&self) -> MessageId {
        self.last_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_once() {
        let mut s = Session::new();
        assert_eq!(s.bind(7), Ok(true));
        assert_eq!(s.bind(7), Ok(false));
        assert_eq!(s.bind(8), Err(SessionMismatch { expected: 7, got: 8 }));
        assert_eq!(s.id(), Some(7));
    }

    #[test]
    fn sequence_numbers() {
        let mut s = Session::with_id(1);
        assert_eq!(s.next_seq_no(false), 0);
        assert_eq!(s.next_seq_no(true), 1);
        assert_eq!(s.next_seq_no(true), 3);
        assert_eq!(s.next_seq_no(false), 4);
        assert_eq!(s.next_seq_no(true), 5);
        assert_eq!(s.last_seq_no(), 5);
    }

    #[test]
    fn received_ids_must_grow() {
        let mut s = Session::new();
        assert!(s.note_received(MessageId(8)));
        assert!(!s.note_received(MessageId(8)));
        assert!(!s.note_received(MessageId(4)));
        assert!(s.note_received(MessageId(12)));
    }
}
