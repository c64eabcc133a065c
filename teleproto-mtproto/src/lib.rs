//! MTProto 1.0 protocol state, framing and key exchange.
//!
//! This crate handles:
//! * Message ids and plaintext messages ([`message`])
//! * Rotating server salts ([`salt`])
//! * Session binding and sequence numbers ([`session`])
//! * Encrypted framing of messages under an auth key ([`encrypted`])
//! * Service envelopes: `rpc_result`, containers, gzip ([`envelope`])
//! * Both sides of the DH key exchange ([`authentication`], [`dh_server`])
//! * Byte-stream framing and connection-level error packets ([`transport`])
//!
//! Everything here is sans-IO: bring your own socket.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod authentication;
pub mod dh_server;
pub mod encrypted;
pub mod envelope;
pub mod message;
pub mod salt;
pub mod session;
pub mod transport;

pub use encrypted::{EncryptedSession, IncomingMessage, Role};
pub use message::{MessageId, MessageIdGenerator, MessageIdMode, PlainMessage};
pub use salt::{SaltConfig, SaltWindow, ServerSalt};
pub use session::Session;
pub use transport::TransportErrorCode;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub fn unix_time() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    buf
}
