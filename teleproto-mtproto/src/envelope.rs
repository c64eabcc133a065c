//! Service envelopes that carry other messages: `rpc_result`,
//! `msg_container` and `gzip_packed`.
//!
//! Their payload is an arbitrary object, so they are encoded by hand rather
//! than through the generated types.

use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use teleproto_tl_types::{Cursor, Deserializable, Serializable, deserialize};

use crate::message::MessageId;

/// `rpc_result#f35c6d01 req_msg_id:long result:Object`.
pub const RPC_RESULT_ID: u32 = 0xf35c6d01;
/// `msg_container#73f1f8dc messages:vector<message>`.
pub const MSG_CONTAINER_ID: u32 = 0x73f1f8dc;
/// `gzip_packed#3072cfa1 packed_data:bytes`.
pub const GZIP_PACKED_ID: u32 = 0x3072cfa1;
/// Replies longer than this are considered for compression.
pub const GZIP_THRESHOLD: usize = 128;
/// Bytes the `gzip_packed` wrapper adds at least.
const GZIP_OVERHEAD: usize = 8;
/// Inflated payloads above this are refused.
const MAX_UNPACKED: u64 = 16 * 1024 * 1024;

/// Errors from parsing envelopes.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvelopeError {
    /// The envelope's TL layout was broken.
    Decode(deserialize::Error),
    /// The body did not start with the expected constructor.
    UnexpectedConstructor { expected: u32, got: u32 },
    /// A container declared an impossible message count or length.
    InvalidContainer,
    /// `gzip_packed` data failed to inflate.
    Gzip(String),
    /// `gzip_packed` data inflates past the accepted size.
    TooLarge { limit: u64 },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "envelope decode: {e}"),
            Self::UnexpectedConstructor { expected, got } => {
                write!(f, "expected constructor {expected:#010x}, got {got:#010x}")
            }
            Self::InvalidContainer => write!(f, "malformed message container"),
            Self::Gzip(e) => write!(f, "gzip: {e}"),
            Self::TooLarge { limit } => write!(f, "gzip payload inflates past {limit} bytes"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl From<deserialize::Error> for EnvelopeError {
    fn from(e: deserialize::Error) -> Self {
        Self::Decode(e)
    }
}

/// Constructor id at the start of `body`.
pub fn constructor_id(body: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = body.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn expect_id(cursor: &mut Cursor, expected: u32) -> Result<(), EnvelopeError> {
    let got = u32::deserialize(cursor)?;
    if got != expected {
        return Err(EnvelopeError::UnexpectedConstructor { expected, got });
    }
    Ok(())
}

/// `rpc_result` answering `req_msg_id` with the already encoded `result`.
pub fn rpc_result(req_msg_id: MessageId, result: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + result.len());
    RPC_RESULT_ID.serialize(&mut buf);
    req_msg_id.0.serialize(&mut buf);
    buf.extend_from_slice(result);
    buf
}

/// Splits an `rpc_result` into the request id and the encoded result.
pub fn parse_rpc_result(body: &[u8]) -> Result<(MessageId, &[u8]), EnvelopeError> {
    let mut cursor = Cursor::from_slice(body);
    expect_id(&mut cursor, RPC_RESULT_ID)?;
    let req_msg_id = u64::deserialize(&mut cursor)?;
    Ok((MessageId(req_msg_id), cursor.read_to_end()?))
}

/// One message inside a `msg_container`.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainedMessage {
    /// Message identifier.
    pub msg_id: MessageId,
    /// Sequence number.
    pub seq_no: u32,
    /// TL-serialized body.
    pub body: Vec<u8>,
}

/// Packs several messages into one `msg_container` body.
pub fn container(messages: &[ContainedMessage]) -> Vec<u8> {
    let mut buf = Vec::new();
    MSG_CONTAINER_ID.serialize(&mut buf);
    (messages.len() as u32).serialize(&mut buf);
    for msg in messages {
        msg.msg_id.0.serialize(&mut buf);
        msg.seq_no.serialize(&mut buf);
        (msg.body.len() as u32).serialize(&mut buf);
        buf.extend_from_slice(&msg.body);
    }
    buf
}

/// Unpacks a `msg_container`. Containers may not nest.
pub fn parse_container(body: &[u8]) -> Result<Vec<ContainedMessage>, EnvelopeError> {
    let mut cursor = Cursor::from_slice(body);
    expect_id(&mut cursor, MSG_CONTAINER_ID)?;
    let count = i32::deserialize(&mut cursor)?;
    if count < 0 || count as usize > cursor.remaining() / 16 {
        return Err(EnvelopeError::InvalidContainer);
    }

    let mut messages = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let msg_id = MessageId(u64::deserialize(&mut cursor)?);
        let seq_no = u32::deserialize(&mut cursor)?;
        let len = u32::deserialize(&mut cursor)? as usize;
        if len % 4 != 0 {
            return Err(EnvelopeError::InvalidContainer);
        }
        let body = cursor.read_slice(len)?.to_vec();
        if constructor_id(&body) == Some(MSG_CONTAINER_ID) {
            return Err(EnvelopeError::InvalidContainer);
        }
        messages.push(ContainedMessage { msg_id, seq_no, body });
    }
    Ok(messages)
}

/// Wraps `data` in `gzip_packed`.
pub fn gzip_packed(data: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(|e| EnvelopeError::Gzip(e.to_string()))?;
    let packed = encoder.finish().map_err(|e| EnvelopeError::Gzip(e.to_string()))?;

    let mut buf = Vec::with_capacity(packed.len() + 8);
    GZIP_PACKED_ID.serialize(&mut buf);
    packed.serialize(&mut buf);
    Ok(buf)
}

/// Inflates a `gzip_packed` body.
pub fn gzip_unpacked(body: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let mut cursor = Cursor::from_slice(body);
    expect_id(&mut cursor, GZIP_PACKED_ID)?;
    let packed = Vec::<u8>::deserialize(&mut cursor)?;

    let mut out = Vec::new();
    GzDecoder::new(&packed[..])
        .take(MAX_UNPACKED + 1)
        .read_to_end(&mut out)
        .map_err(|e| EnvelopeError::Gzip(e.to_string()))?;
    if out.len() as u64 > MAX_UNPACKED {
        return Err(EnvelopeError::TooLarge { limit: MAX_UNPACKED });
    }
    Ok(out)
}

/// `body` itself, or its inflated content if it is `gzip_packed`.
pub fn unwrap_gzip(body: &[u8]) -> Result<Cow<'_, [u8]>, EnvelopeError> {
    if constructor_id(body) == Some(GZIP_PACKED_ID) {
        gzip_unpacked(body).map(Cow::Owned)
    } else {
        Ok(Cow::Borrowed(body))
    }
}

/// Compresses `body` when it is longer than `threshold` and compression
/// saves more than the wrapper overhead; otherwise returns it unchanged.
pub fn maybe_compress(body: Vec<u8>, threshold: usize) -> Vec<u8> {
    if body.len() <= threshold {
        return body;
    }
    match gzip_packed(&body) {
        Ok(packed) if packed.len() + GZIP_OVERHEAD < body.len() => packed,
        _ => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_result_layout() {
        let body = rpc_result(MessageId(0x1122), &[1, 2, 3, 4]);
        assert_eq!(&body[..4], &RPC_RESULT_ID.to_le_bytes());
        let (id, result) = parse_rpc_result(&body).unwrap();
        assert_eq!(id, MessageId(0x1122));
        assert_eq!(result, &[1, 2, 3, 4]);
        assert!(matches!(
            parse_rpc_result(&[0; 12]),
            Err(EnvelopeError::UnexpectedConstructor { expected: RPC_RESULT_ID, got: 0 })
        ));
    }

    #[test]
    fn containers() {
        let messages = vec![
            ContainedMessage { msg_id: MessageId(4), seq_no: 1, body: vec![1, 0, 0, 0] },
            ContainedMessage { msg_id: MessageId(8), seq_no: 3, body: vec![2, 0, 0, 0, 3, 0, 0, 0] },
        ];
        let body = container(&messages);
        assert_eq!(parse_container(&body).unwrap(), messages);

        let nested = container(&[ContainedMessage { msg_id: MessageId(12), seq_no: 0, body }]);
        assert_eq!(parse_container(&nested), Err(EnvelopeError::InvalidContainer));

        let mut lying = container(&messages);
        lying[4] = 200;
        assert_eq!(parse_container(&lying), Err(EnvelopeError::InvalidContainer));
    }

    #[test]
    fn compressible_reply_is_packed() {
        let reply = vec![0u8; 132];
        let sent = maybe_compress(reply.clone(), GZIP_THRESHOLD);
        assert_eq!(constructor_id(&sent), Some(GZIP_PACKED_ID));
        assert!(sent.len() + 8 < reply.len());
        assert_eq!(unwrap_gzip(&sent).unwrap().into_owned(), reply);
    }

    #[test]
    fn incompressible_reply_is_sent_raw() {
        let reply: Vec<u8> = (0..132u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let sent = maybe_compress(reply.clone(), GZIP_THRESHOLD);
        assert_eq!(sent, reply);
        assert_eq!(unwrap_gzip(&sent).unwrap().into_owned(), reply);
    }

    #[test]
    fn short_reply_is_never_packed() {
        let reply = vec![0u8; GZIP_THRESHOLD];
        assert_eq!(maybe_compress(reply.clone(), GZIP_THRESHOLD), reply);
    }

    #[test]
    fn corrupt_gzip() {
        let mut body = Vec::new();
        GZIP_PACKED_ID.serialize(&mut body);
        vec![1u8, 2, 3].serialize(&mut body);
        assert!(matches!(gzip_unpacked(&body), Err(EnvelopeError::Gzip(_))));
    }

    #[test]
    fn oversized_gzip_is_refused() {
        let limit = MAX_UNPACKED as usize;
        let at_limit = gzip_packed(&vec![0u8; limit]).unwrap();
        assert_eq!(gzip_unpacked(&at_limit).unwrap().len(), limit);

        let over = gzip_packed(&vec![0u8; limit + 4096]).unwrap();
        assert_eq!(gzip_unpacked(&over), Err(EnvelopeError::TooLarge { limit: MAX_UNPACKED }));
        assert!(unwrap_gzip(&over).is_err());
    }
}
