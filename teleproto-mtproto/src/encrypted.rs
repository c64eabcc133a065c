//! Encrypted MTProto 1.0 framing (post auth-key).
//!
//! Once a key exchange has finished, construct an [`EncryptedSession`] and
//! use it to seal every outgoing message and open every incoming one.

use std::fmt;

use teleproto_crypto::{AuthKey, DecryptError, Direction, HEADER_LEN, decrypt_message, encrypt_message};

use crate::message::{MessageId, MessageIdMode, read_u64};
use crate::session::{Session, SessionMismatch};

/// Errors that can occur when opening a packet.
#[derive(Clone, Debug, PartialEq)]
pub enum FramingError {
    /// The crypto layer rejected the packet (key id, msg_key or length).
    Crypto(DecryptError),
    /// Session-id mismatch (possible replay or wrong connection).
    Session(SessionMismatch),
    /// An outgoing body that is not a whole number of 4-byte words.
    UnalignedBody { len: usize },
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::Session(e) => write!(f, "{e}"),
            Self::UnalignedBody { len } => write!(f, "body of {len} bytes is not 4-byte aligned"),
        }
    }
}

impl std::error::Error for FramingError {}

impl From<DecryptError> for FramingError {
    fn from(e: DecryptError) -> Self {
        Self::Crypto(e)
    }
}

impl From<SessionMismatch> for FramingError {
    fn from(e: SessionMismatch) -> Self {
        Self::Session(e)
    }
}

/// Which end of the connection this session sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Sends client-to-server packets.
    Client,
    /// Sends server-to-client packets.
    Server,
}

impl Role {
    fn outgoing(self) -> Direction {
        match self {
            Self::Client => Direction::ClientToServer,
            Self::Server => Direction::ServerToClient,
        }
    }

    fn incoming(self) -> Direction {
        match self {
            Self::Client => Direction::ServerToClient,
            Self::Server => Direction::ClientToServer,
        }
    }
}

/// The header fields and body of a successfully opened packet.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingMessage {
    /// Salt the sender used.
    pub salt: u64,
    /// The sender's session id.
    pub session_id: u64,
    /// Message identifier.
    pub msg_id: MessageId,
    /// Sequence number.
    pub seq_no: u32,
    /// TL-serialized body.
    pub body: Vec<u8>,
    /// This packet bound a previously unbound session.
    pub new_session: bool,
}

/// MTProto 1.0 encrypted session state.
///
/// Wraps an `AuthKey` and the per-session counters. Use
/// [`EncryptedSession::seal`] to encrypt outgoing messages and
/// [`EncryptedSession::open`] to decrypt incoming packets.
#[derive(Clone, Debug)]
pub struct EncryptedSession {
    auth_key: AuthKey,
    role: Role,
    session: Session,
}

impl EncryptedSession {
    /// A session for `role` over `auth_key`.
    pub fn new(auth_key: AuthKey, role: Role, session: Session) -> Self {
        Self { auth_key, role, session }
    }

    /// Client side: a fresh random session id.
    pub fn client(auth_key: AuthKey) -> Self {
        Self::new(auth_key, Role::Client, Session::random())
    }

    /// Server side: the session id is learnt from the first packet.
    pub fn server(auth_key: AuthKey) -> Self {
        Self::new(auth_key, Role::Server, Session::new())
    }

    /// The auth key.
    pub fn auth_key(&self) -> &AuthKey {
        &self.auth_key
    }

    /// This end's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Session counters.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Session counters, mutably.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Allocates a message id and sequence number for `body` and encrypts it.
    ///
    /// Layout of the plaintext before encryption:
    /// ```text
    /// salt:       u64
    /// session_id: u64
    /// msg_id:     u64
    /// seq_no:     u32
    /// body_len:   u32
    /// body:       [u8; body_len]
    /// ```
    ///
    /// TL bodies are always word-aligned; anything else is refused before a
    /// message id is spent.
    pub fn seal(
        &mut self,
        salt: u64,
        body: &[u8],
        content_related: bool,
        mode: MessageIdMode,
    ) -> Result<(Vec<u8>, MessageId), FramingError> {
        check_aligned(body)?;
        let msg_id = self.session.next_msg_id(mode);
        let seq_no = self.session.next_seq_no(content_related);
        Ok((self.seal_with(salt, msg_id, seq_no, body)?, msg_id))
    }

    /// Encrypts `body` under an already allocated id and sequence number.
    pub fn seal_with(&self, salt: u64, msg_id: MessageId, seq_no: u32, body: &[u8]) -> Result<Vec<u8>, FramingError> {
        check_aligned(body)?;
        let mut plain = Vec::with_capacity(HEADER_LEN + body.len());
        plain.extend(salt.to_le_bytes());
        plain.extend(self.session.id().unwrap_or_default().to_le_bytes());
        plain.extend(msg_id.0.to_le_bytes());
        plain.extend(seq_no.to_le_bytes());
        plain.extend((body.len() as u32).to_le_bytes());
        plain.extend_from_slice(body);
        Ok(encrypt_message(&plain, &self.auth_key, self.role.outgoing()))
    }

    /// Decrypts a packet sent by the peer and checks its session id.
    pub fn open(&mut self, packet: &[u8]) -> Result<IncomingMessage, FramingError> {
        let plain = decrypt_message(packet, &self.auth_key, self.role.incoming())?;

        let salt = read_u64(&plain[..8]);
        let session_id = read_u64(&plain[8..16]);
        let msg_id = MessageId(read_u64(&plain[16..24]));
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&plain[24..28]);

        let new_session = self.session.bind(session_id)?;
        Ok(IncomingMessage {
            salt,
            session_id,
            msg_id,
            seq_no: u32::from_le_bytes(seq),
            body: plain[HEADER_LEN..].to_vec(),
            new_session,
        })
    }
}

fn check_aligned(body: &[u8]) -> Result<(), FramingError> {
    if body.len() % 4 != 0 {
        return Err(FramingError::UnalignedBody { len: body.len() });
    }
    Ok(())
}
