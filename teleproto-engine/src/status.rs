//! Connection status machine.
//!
//! ```text
//! Disconnected → Connecting → Connected → HasDhKey → Signed
//!       └────────────┴────────────┴───────────┴─────────┴──→ Failed
//! ```
//!
//! Forward steps cannot be skipped or repeated. `Failed` is reachable from
//! anywhere and is terminal: the caller must open a new connection.

use tokio::sync::watch;
use tracing::{info, warn};

use crate::errors::ConnectionError;

/// Where a connection is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    /// No transport yet.
    Disconnected,
    /// The transport is being opened.
    Connecting,
    /// Bytes can flow; no auth key yet.
    Connected,
    /// The auth key is ready; RPCs may be sent.
    HasDhKey,
    /// The auth key is bound to a user.
    Signed,
    /// Something went wrong; reconnect.
    Failed,
}

impl Status {
    /// The only status this one may advance to, besides `Failed`.
    pub fn next(self) -> Option<Status> {
        match self {
            Self::Disconnected => Some(Self::Connecting),
            Self::Connecting => Some(Self::Connected),
            Self::Connected => Some(Self::HasDhKey),
            Self::HasDhKey => Some(Self::Signed),
            Self::Signed | Self::Failed => None,
        }
    }

    /// Whether encrypted RPCs can be sent.
    pub fn has_key(self) -> bool {
        matches!(self, Self::HasDhKey | Self::Signed)
    }
}

/// Who caused a status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusReason {
    /// Initial state.
    None,
    /// This side decided.
    Local,
    /// The peer did something.
    Remote,
    /// A deadline passed.
    Timeout,
}

/// A status together with the reason it was entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub status: Status,
    pub reason: StatusReason,
}

/// Holds a connection's status and notifies subscribers on every change.
#[derive(Debug)]
pub struct StatusTracker {
    tx: watch::Sender<StatusChange>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusChange { status: Status::Disconnected, reason: StatusReason::None });
        Self { tx }
    }

    pub fn current(&self) -> StatusChange {
        *self.tx.borrow()
    }

    pub fn status(&self) -> Status {
        self.current().status
    }

    /// A receiver that sees every later change.
    pub fn subscribe(&self) -> watch::Receiver<StatusChange> {
        self.tx.subscribe()
    }

    /// Moves one step forward.
    pub fn advance(&self, to: Status, reason: StatusReason) -> Result<(), ConnectionError> {
        let from = self.status();
        if from == Status::Failed {
            return Err(ConnectionError::Failed);
        }
        if from.next() != Some(to) {
            return Err(ConnectionError::InvalidTransition { from, to });
        }
        info!("[teleproto] status {from:?} → {to:?} ({reason:?})");
        self.tx.send_replace(StatusChange { status: to, reason });
        Ok(())
    }

    /// Enters `Failed`. Repeated failures keep the first reason.
    pub fn fail(&self, reason: StatusReason) {
        let from = self.status();
        if from == Status::Failed {
            return;
        }
        warn!("[teleproto] status {from:?} → Failed ({reason:?})");
        self.tx.send_replace(StatusChange { status: Status::Failed, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_only() {
        let tracker = StatusTracker::new();
        assert!(matches!(
            tracker.advance(Status::HasDhKey, StatusReason::Local),
            Err(ConnectionError::InvalidTransition { from: Status::Disconnected, to: Status::HasDhKey })
        ));
        tracker.advance(Status::Connecting, StatusReason::Local).unwrap();
        tracker.advance(Status::Connected, StatusReason::Remote).unwrap();
        assert!(tracker.advance(Status::Connected, StatusReason::Remote).is_err());
        tracker.advance(Status::HasDhKey, StatusReason::Remote).unwrap();
        tracker.advance(Status::Signed, StatusReason::Remote).unwrap();
        assert_eq!(tracker.status(), Status::Signed);
        assert!(tracker.advance(Status::Disconnected, StatusReason::Local).is_err());
    }

    #[test]
    fn failed_is_terminal() {
        let tracker = StatusTracker::new();
        let mut rx = tracker.subscribe();
        tracker.fail(StatusReason::Timeout);
        tracker.fail(StatusReason::Local);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), StatusChange { status: Status::Failed, reason: StatusReason::Timeout });
        assert!(matches!(tracker.advance(Status::Connecting, StatusReason::Local), Err(ConnectionError::Failed)));
    }
}
