//! Message identifiers and plaintext (pre-key) messages.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A 64-bit MTProto message identifier.
///
/// The upper 32 bits are Unix seconds, the lower 32 bits a fraction of the
/// second. The two least significant bits say who sent the message:
/// `00` client, `01` server reply, `11` server-initiated.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Unix seconds the id was minted at.
    pub fn unix_secs(self) -> u64 {
        self.0 >> 32
    }

    /// Whether the low bits mark a client-originated message.
    pub fn is_client(self) -> bool {
        self.0 & 0b11 == 0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Who mints an id and why.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageIdMode {
    /// A client message; low bits `00`.
    Client,
    /// A server message answering a client message; low bits `01`.
    ServerReply,
    /// A server message nobody asked for; low bits `11`.
    ServerInitiative,
}

impl MessageIdMode {
    fn bits(self) -> u64 {
        match self {
            Self::Client => 0b00,
            Self::ServerReply => 0b01,
            Self::ServerInitiative => 0b11,
        }
    }

    /// Smallest increment that keeps the mode's parity: client ids stay
    /// divisible by 4, server ids stay odd.
    fn step(self) -> u64 {
        match self {
            Self::Client => 4,
            Self::ServerReply | Self::ServerInitiative => 2,
        }
    }
}

/// Mints strictly increasing message ids for one connection.
#[derive(Clone, Debug, Default)]
pub struct MessageIdGenerator {
    last: u64,
    time_offset: i64,
}

impl MessageIdGenerator {
    /// A generator with no clock correction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds added to the local clock (server time minus local time).
    pub fn set_time_offset(&mut self, offset: i64) {
        self.time_offset = offset;
    }

    /// The current clock correction.
    pub fn time_offset(&self) -> i64 {
        self.time_offset
    }

    /// The last id handed out, or 0.
    pub fn last(&self) -> MessageId {
        MessageId(self.last)
    }

    /// Next id for `mode` at the current (corrected) time.
    pub fn next(&mut self, mode: MessageIdMode) -> MessageId {
        let ts = timestamp(SystemTime::now(), self.time_offset);
        self.next_at(mode, ts)
    }

    /// Next id for `mode` at the 32.32 fixed-point time `ts`.
    ///
    /// If the candidate does not exceed the previous id it is bumped by the
    /// mode's step until it does.
    pub fn next_at(&mut self, mode: MessageIdMode, ts: u64) -> MessageId {
        let step = mode.step();
        let mut id = (ts & !0b11) | mode.bits();
        if id <= self.last {
            id += step * ((self.last - id) / step + 1);
        }
        self.last = id;
        MessageId(id)
    }
}

/// `time` as 32.32 fixed-point Unix seconds, shifted by `offset` seconds.
pub fn timestamp(time: SystemTime, offset: i64) -> u64 {
    let now = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = (now.as_secs() as i64).saturating_add(offset).max(0) as u64;
    let frac = (u64::from(now.subsec_nanos()) << 32) / 1_000_000_000;
    (secs << 32) | frac
}

/// Errors from [`PlainMessage::from_bytes`].
#[derive(Clone, Debug, PartialEq)]
pub enum PlainMessageError {
    /// Fewer than the 20 header bytes.
    TooShort { len: usize },
    /// `auth_key_id` was not zero; the packet is encrypted.
    Encrypted { key_id: u64 },
    /// The declared length disagrees with the packet.
    LengthMismatch { declared: usize, actual: usize },
}

impl fmt::Display for PlainMessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "plaintext message of {len} bytes is too short"),
            Self::Encrypted { key_id } => write!(f, "expected plaintext message, got auth key {key_id:#x}"),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "plaintext message declares {declared} bytes but carries {actual}")
            }
        }
    }
}

impl std::error::Error for PlainMessageError {}

/// A message sent before an auth key exists (the key exchange).
#[derive(Clone, Debug, PartialEq)]
pub struct PlainMessage {
    /// Message identifier.
    pub msg_id: MessageId,
    /// The serialized TL body.
    pub body: Vec<u8>,
}

impl PlainMessage {
    /// Wire format:
    ///
    /// ```text
    /// auth_key_id:long  (0 for plaintext)
    /// message_id:long
    /// message_data_length:int
    /// message_data:bytes
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(20 + self.body.len());
        buf.extend(0u64.to_le_bytes());
        buf.extend(self.msg_id.0.to_le_bytes());
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(&self.body);
        buf
    }

    /// Parses the wire format produced by [`PlainMessage::to_bytes`].
    pub fn from_bytes(packet: &[u8]) -> Result<Self, PlainMessageError> {
        if packet.len() < 20 {
            return Err(PlainMessageError::TooShort { len: packet.len() });
        }
        let key_id = read_u64(&packet[..8]);
        if key_id != 0 {
            return Err(PlainMessageError::Encrypted { key_id });
        }
        let msg_id = MessageId(read_u64(&packet[8..16]));
        let mut len = [0u8; 4];
        len.copy_from_slice(&packet[16..20]);
        let declared = u32::from_le_bytes(len) as usize;
        let actual = packet.len() - 20;
        if declared != actual {
            return Err(PlainMessageError::LengthMismatch { declared, actual });
        }
        Ok(Self { msg_id, body: packet[20..].to_vec() })
    }
}

/// `auth_key_id` of a raw packet, 0 for plaintext messages.
pub fn packet_key_id(packet: &[u8]) -> Option<u64> {
    packet.get(..8).map(read_u64)
}

pub(crate) fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_reply_vector() {
        let mut ids = MessageIdGenerator::new();
        assert_eq!(ids.next_at(MessageIdMode::ServerReply, 0x1234567891), MessageId(0x1234567891));
        assert_eq!(ids.next_at(MessageIdMode::ServerInitiative, 0x1234567893), MessageId(0x1234567893));
        assert_eq!(ids.next_at(MessageIdMode::ServerReply, 0x1234567891), MessageId(0x1234567895));
        assert_eq!(ids.next_at(MessageIdMode::ServerReply, 0x1234567891), MessageId(0x1234567897));
        assert_eq!(ids.next_at(MessageIdMode::ServerReply, 0x1234567891), MessageId(0x1234567899));
    }

    #[test]
    fn client_ids_are_multiples_of_four() {
        let mut ids = MessageIdGenerator::new();
        let mut last = MessageId(0);
        for _ in 0..2000 {
            let id = ids.next_at(MessageIdMode::Client, 0x5e0b_700a_0000_0007);
            assert!(id > last);
            assert_eq!(id.0 & 0b11, 0);
            last = id;
        }
    }

    #[test]
    fn server_ids_stay_odd() {
        let mut ids = MessageIdGenerator::new();
        let mut last = MessageId(0);
        for _ in 0..2000 {
            let id = ids.next_at(MessageIdMode::ServerReply, 0x5e0b_700a_0000_0000);
            assert!(id > last);
            assert_eq!(id.0 & 1, 1);
            last = id;
        }
    }

    #[test]
    fn clock_going_backwards() {
        let mut ids = MessageIdGenerator::new();
        let first = ids.next_at(MessageIdMode::Client, 0x6000_0000_0000_0000);
        let second = ids.next_at(MessageIdMode::Client, 0x5000_0000_0000_0000);
        assert!(second > first);
        assert!(second.is_client());
    }

    #[test]
    fn time_offset_moves_seconds() {
        let t = UNIX_EPOCH + std::time::Duration::from_millis(1_500);
        let ts = timestamp(t, 10);
        assert_eq!(ts >> 32, 11);
        assert_eq!(ts & 0xffff_ffff, 1 << 31);
    }

    #[test]
    fn plain_message_round_trip() {
        let msg = PlainMessage { msg_id: MessageId(0x5e0b_700a_0000_0004), body: vec![1, 2, 3, 4] };
        let bytes = msg.to_bytes();
        assert_eq!(&bytes[..8], &[0; 8]);
        assert_eq!(PlainMessage::from_bytes(&bytes), Ok(msg));
        assert_eq!(packet_key_id(&bytes), Some(0));
    }

    #[test]
    fn plain_message_errors() {
        assert_eq!(PlainMessage::from_bytes(&[0; 19]), Err(PlainMessageError::TooShort { len: 19 }));
        let mut bytes = PlainMessage { msg_id: MessageId(4), body: vec![0; 8] }.to_bytes();
        bytes.pop();
        assert_eq!(
            PlainMessage::from_bytes(&bytes),
            Err(PlainMessageError::LengthMismatch { declared: 8, actual: 7 })
        );
        bytes[0] = 1;
        assert_eq!(PlainMessage::from_bytes(&bytes), Err(PlainMessageError::Encrypted { key_id: 1 }));
    }
}
