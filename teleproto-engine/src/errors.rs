//! Error types for teleproto-engine.

use std::{fmt, io};

use teleproto_mtproto::authentication;
use teleproto_mtproto::dh_server;
use teleproto_mtproto::encrypted::FramingError;
use teleproto_mtproto::envelope::EnvelopeError;
use teleproto_mtproto::transport::FrameError;
use teleproto_mtproto::TransportErrorCode;
use teleproto_tl_types::{enums, types};

use crate::status::Status;

// ─── RpcError ─────────────────────────────────────────────────────────────────

/// A structured error one peer returns for a call.
///
/// A numeric suffix in the wire message is split off into
/// [`RpcError::argument`].
///
/// # Example
/// `PHONE_MIGRATE_2` → `RpcError { code: 303, reason: "PHONE_MIGRATE", argument: Some(2), .. }`
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// HTTP-like error type (303, 400, 401, 420, 500, ...).
    pub code: i32,
    /// Upper-case category with digits removed.
    pub reason: String,
    /// Numeric suffix extracted from the message, if any.
    pub argument: Option<u32>,
    /// The full wire message.
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.reason)?;
        if let Some(v) = self.argument {
            write!(f, " (argument: {v})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

impl RpcError {
    /// An error without an argument.
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self { code, message: reason.clone(), reason, argument: None }
    }

    /// An error whose wire message is `REASON_argument`.
    pub fn with_argument(code: i32, reason: impl Into<String>, argument: u32) -> Self {
        let reason = reason.into();
        Self { code, message: format!("{reason}_{argument}"), reason, argument: Some(argument) }
    }

    /// `400` with `reason`.
    pub fn bad_request(reason: &str) -> Self {
        Self::new(400, reason)
    }

    /// `401 AUTH_KEY_UNREGISTERED`: the call needs a signed-in key.
    pub fn unauthorized() -> Self {
        Self::new(401, "AUTH_KEY_UNREGISTERED")
    }

    /// Parse a wire message like `"FLOOD_WAIT_30"`.
    pub fn from_wire(code: i32, message: &str) -> Self {
        if let Some(idx) = message.rfind('_') {
            let suffix = &message[idx + 1..];
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(v) = suffix.parse::<u32>() {
                    return Self {
                        code,
                        reason: message[..idx].to_string(),
                        argument: Some(v),
                        message: message.to_string(),
                    };
                }
            }
        }
        Self::new(code, message)
    }

    /// Match on the reason, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("FLOOD_WAIT")`: exact match
    /// - `err.is("PHONE_CODE_*")`: starts-with match
    /// - `err.is("*_INVALID")`: ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.reason.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.reason.ends_with(suffix)
        } else {
            self.reason == pattern
        }
    }

    /// The TL form, `rpc_error#2144ca19`.
    pub fn to_tl(&self) -> enums::RpcError {
        enums::RpcError::RpcError(types::RpcError { error_code: self.code, error_message: self.message.clone() })
    }
}

impl From<enums::RpcError> for RpcError {
    fn from(e: enums::RpcError) -> Self {
        let enums::RpcError::RpcError(e) = e;
        Self::from_wire(e.error_code, &e.error_message)
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error a pending call resolves with.
#[derive(Debug)]
pub enum InvocationError {
    /// The peer answered with an RPC error.
    Rpc(RpcError),
    /// The server rejected the message itself (`bad_msg_notification`).
    BadMessage { code: i32 },
    /// The connection failed with a bare error code.
    Transport(TransportErrorCode),
    /// The reply could not be decoded.
    Deserialize(teleproto_tl_types::deserialize::Error),
    /// A service envelope was malformed.
    Envelope(EnvelopeError),
    /// No auth key yet; finish the key exchange first.
    NotReady,
    /// The connection went away before the reply arrived.
    Dropped,
    /// Network / I/O failure.
    Io(io::Error),
    /// The driver gave up waiting.
    Timeout,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(e) => write!(f, "{e}"),
            Self::BadMessage { code } => write!(f, "message rejected by server (code {code})"),
            Self::Transport(code) => write!(f, "{code}"),
            Self::Deserialize(e) => write!(f, "deserialize error: {e}"),
            Self::Envelope(e) => write!(f, "{e}"),
            Self::NotReady => write!(f, "no auth key yet"),
            Self::Dropped => write!(f, "request dropped"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Timeout => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<io::Error> for InvocationError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<RpcError> for InvocationError {
    fn from(e: RpcError) -> Self {
        Self::Rpc(e)
    }
}

impl From<teleproto_tl_types::deserialize::Error> for InvocationError {
    fn from(e: teleproto_tl_types::deserialize::Error) -> Self {
        Self::Deserialize(e)
    }
}

impl From<EnvelopeError> for InvocationError {
    fn from(e: EnvelopeError) -> Self {
        Self::Envelope(e)
    }
}

impl InvocationError {
    /// Returns `true` if this is the named RPC error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(e) => e.is(pattern),
            _ => false,
        }
    }
}

// ─── ConnectionError ──────────────────────────────────────────────────────────

/// Errors that end (or refuse to change) a connection's status.
#[derive(Debug)]
pub enum ConnectionError {
    /// The client side of the key exchange failed.
    Handshake(authentication::Error),
    /// The server side of the key exchange failed.
    ServerHandshake(dh_server::Error),
    /// An encrypted packet failed to open.
    Framing(FramingError),
    /// The byte stream is not valid framing.
    Frame(FrameError),
    /// The peer sent a bare error code.
    Transport(TransportErrorCode),
    /// An encrypted packet used a key the server does not know.
    UnknownAuthKey { key_id: u64 },
    /// A plaintext packet arrived after the key exchange.
    UnexpectedPlaintext,
    /// Bytes arrived before `connect`.
    NotConnected,
    /// Status changes only move forward one step at a time.
    InvalidTransition { from: Status, to: Status },
    /// The connection already failed; reconnect.
    Failed,
    /// The transport refused a packet.
    Send(String),
    /// Network / I/O failure.
    Io(io::Error),
    /// The key exchange took too long.
    Timeout,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake(e) => write!(f, "key exchange failed: {e}"),
            Self::ServerHandshake(e) => write!(f, "key exchange failed: {e}"),
            Self::Framing(e) => write!(f, "framing error: {e}"),
            Self::Frame(e) => write!(f, "transport framing error: {e}"),
            Self::Transport(code) => write!(f, "{code}"),
            Self::UnknownAuthKey { key_id } => write!(f, "unknown auth key {key_id:016x}"),
            Self::UnexpectedPlaintext => write!(f, "plaintext packet after key exchange"),
            Self::NotConnected => write!(f, "not connected"),
            Self::InvalidTransition { from, to } => write!(f, "cannot move from {from:?} to {to:?}"),
            Self::Failed => write!(f, "connection has failed"),
            Self::Send(e) => write!(f, "send failed: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Timeout => write!(f, "key exchange timed out"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<authentication::Error> for ConnectionError {
    fn from(e: authentication::Error) -> Self {
        Self::Handshake(e)
    }
}

impl From<dh_server::Error> for ConnectionError {
    fn from(e: dh_server::Error) -> Self {
        Self::ServerHandshake(e)
    }
}

impl From<FramingError> for ConnectionError {
    fn from(e: FramingError) -> Self {
        Self::Framing(e)
    }
}

impl From<FrameError> for ConnectionError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

// ─── TransferError ────────────────────────────────────────────────────────────

/// Errors from [`crate::FileTransfer`].
#[derive(Debug)]
pub enum TransferError {
    /// Chunk sizes must be a positive multiple of 1024 and at most 512 KiB.
    InvalidChunkSize { size: usize },
    /// Every byte has already been transferred.
    Finished,
    /// An upload chunk was not the expected length.
    UnexpectedChunk { expected: usize, got: usize },
    /// The operation needs an upload descriptor but this is a download (or
    /// the other way round).
    WrongDirection,
    /// The uploaded parts do not hash to the announced checksum.
    ChecksumMismatch,
    /// The call carrying a chunk failed.
    Invocation(InvocationError),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChunkSize { size } => write!(f, "invalid chunk size {size}"),
            Self::Finished => write!(f, "transfer already finished"),
            Self::UnexpectedChunk { expected, got } => write!(f, "chunk of {got} bytes, expected {expected}"),
            Self::WrongDirection => write!(f, "wrong transfer direction"),
            Self::ChecksumMismatch => write!(f, "md5 checksum mismatch"),
            Self::Invocation(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TransferError {}

impl From<InvocationError> for TransferError {
    fn from(e: InvocationError) -> Self {
        Self::Invocation(e)
    }
}
