//! Pluggable transport layer.
//!
//! Implement [`Transport`] over TCP, a channel, or an in-memory buffer to
//! carry MTProto packets. Incoming bytes are pushed into the protocol by the
//! caller; the protocol pushes outgoing packets into the transport.

use std::collections::VecDeque;
use std::fmt;

/// Where outgoing packets go.
pub trait Transport {
    /// The error type returned by send operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send one complete packet to the peer.
    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error>;
}

// ─── Connection-level error packet ───────────────────────────────────────────

/// A bare 4-byte little-endian error code sent outside any encryption,
/// when there is no usable session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorCode {
    /// `-404`: the auth key is unknown to the server.
    InvalidAuthKey,
    /// `-429`: too many connections or requests.
    Flood,
    /// Any other code; kept so it can be re-encoded unchanged.
    Other(i32),
}

impl TransportErrorCode {
    /// Maps a wire value to a code.
    pub fn from_code(code: i32) -> Self {
        match code {
            -404 => Self::InvalidAuthKey,
            -429 => Self::Flood,
            other => Self::Other(other),
        }
    }

    /// The wire value.
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidAuthKey => -404,
            Self::Flood => -429,
            Self::Other(code) => code,
        }
    }

    /// The 4-byte packet.
    pub fn to_bytes(self) -> [u8; 4] {
        self.code().to_le_bytes()
    }

    /// Parses a packet that is exactly 4 bytes long.
    pub fn from_bytes(packet: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = packet.try_into().ok()?;
        Some(Self::from_code(i32::from_le_bytes(bytes)))
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAuthKey => write!(f, "invalid auth key (-404)"),
            Self::Flood => write!(f, "flood (-429)"),
            Self::Other(code) => write!(f, "transport error {code}"),
        }
    }
}

// ─── Abridged framing ─────────────────────────────────────────────────────────

/// Byte a client sends once to select abridged framing.
pub const ABRIDGED_MARKER: u8 = 0xef;

/// Largest packet accepted by the decoder.
pub const MAX_PACKET_LEN: usize = 16 * 1024 * 1024;

/// `[length/4 as 1 or 4 bytes][payload]`.
pub fn encode_abridged(data: &[u8]) -> Vec<u8> {
    let len = data.len() / 4;
    let mut out = Vec::with_capacity(4 + data.len());
    if len < 127 {
        out.push(len as u8);
    } else {
        out.push(0x7f);
        out.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
    }
    out.extend_from_slice(data);
    out
}

/// Wraps a `Transport` and applies the [MTProto Abridged] framing.
///
/// The client side sends `0xef` on first use, then each packet is
/// `[length/4 as 1 or 4 bytes][payload]`.
///
/// [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
pub struct AbridgedTransport<T: Transport> {
    inner: T,
    init_sent: bool,
}

impl<T: Transport> AbridgedTransport<T> {
    /// Client side: the marker goes out before the first packet.
    pub fn new(inner: T) -> Self {
        Self { inner, init_sent: false }
    }

    /// Server side: no marker.
    pub fn without_marker(inner: T) -> Self {
        Self { inner, init_sent: true }
    }

    /// Access the underlying transport.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Transport> Transport for AbridgedTransport<T> {
    type Error = T::Error;

    fn send(&mut self, packet: &[u8]) -> Result<(), T::Error> {
        let mut framed = Vec::with_capacity(packet.len() + 5);
        if !self.init_sent {
            framed.push(ABRIDGED_MARKER);
            self.init_sent = true;
        }
        framed.extend(encode_abridged(packet));
        self.inner.send(&framed)
    }
}

/// One unit read off the stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// An MTProto packet.
    Packet(Vec<u8>),
    /// A connection-level error code.
    Error(TransportErrorCode),
}

/// The byte stream is not abridged framing.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameError {
    /// The first byte was not [`ABRIDGED_MARKER`].
    MissingMarker { got: u8 },
    /// A frame longer than [`MAX_PACKET_LEN`].
    TooLarge { len: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMarker { got } => write!(f, "expected abridged marker 0xef, got {got:#04x}"),
            Self::TooLarge { len } => write!(f, "frame of {len} bytes is too large"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Incremental abridged decoder: push bytes as they arrive, pull frames.
#[derive(Clone, Debug)]
pub struct AbridgedDecoder {
    buffer: VecDeque<u8>,
    expect_marker: bool,
}

impl AbridgedDecoder {
    /// Decoder for the server side, which first reads the marker.
    pub fn server() -> Self {
        Self { buffer: VecDeque::new(), expect_marker: true }
    }

    /// Decoder for the client side.
    pub fn client() -> Self {
        Self { buffer: VecDeque::new(), expect_marker: false }
    }

    /// Appends received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// The next complete frame, if one has fully arrived.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.expect_marker {
            let Some(&first) = self.buffer.front() else {
                return Ok(None);
            };
            if first != ABRIDGED_MARKER {
                return Err(FrameError::MissingMarker { got: first });
            }
            self.buffer.pop_front();
            self.expect_marker = false;
        }

        let Some(&first) = self.buffer.front() else {
            return Ok(None);
        };
        // High bit is the quick-ack flag.
        let (header, words) = match first & 0x7f {
            0x7f => {
                if self.buffer.len() < 4 {
                    return Ok(None);
                }
                let len = u32::from_le_bytes([self.buffer[1], self.buffer[2], self.buffer[3], 0]);
                (4, len as usize)
            }
            short => (1, short as usize),
        };
        let len = words * 4;
        if len > MAX_PACKET_LEN {
            return Err(FrameError::TooLarge { len });
        }
        if self.buffer.len() < header + len {
            return Ok(None);
        }

        self.buffer.drain(..header);
        let payload: Vec<u8> = self.buffer.drain(..len).collect();
        Ok(Some(match TransportErrorCode::from_bytes(&payload) {
            Some(code) => Frame::Error(code),
            None => Frame::Packet(payload),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sink(Vec<u8>);

    impl Transport for Sink {
        type Error = std::convert::Infallible;

        fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
            self.0.extend_from_slice(packet);
            Ok(())
        }
    }

    #[test]
    fn error_codes_round_trip() {
        for code in [-404i32, -429, -444, 0, 7] {
            let parsed = TransportErrorCode::from_bytes(&code.to_le_bytes()).unwrap();
            assert_eq!(parsed.code(), code);
            assert_eq!(parsed.to_bytes(), code.to_le_bytes());
        }
        assert_eq!(TransportErrorCode::from_code(-404), TransportErrorCode::InvalidAuthKey);
        assert_eq!(TransportErrorCode::from_code(-429), TransportErrorCode::Flood);
        assert_eq!(TransportErrorCode::from_bytes(&[0; 5]), None);
    }

    #[test]
    fn abridged_stream_round_trip() {
        let mut transport = AbridgedTransport::new(Sink::default());
        let small = vec![1u8; 8];
        let large = vec![2u8; 127 * 4];
        transport.send(&small).unwrap();
        transport.send(&large).unwrap();
        transport.send(&(-404i32).to_le_bytes()).unwrap();

        let bytes = transport.inner_mut().0.clone();
        assert_eq!(bytes[0], ABRIDGED_MARKER);
        assert_eq!(bytes[1], 2);

        let mut decoder = AbridgedDecoder::server();
        // Byte by byte, to exercise partial frames.
        let mut frames = Vec::new();
        for b in bytes {
            decoder.push(&[b]);
            while let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(
            frames,
            vec![Frame::Packet(small), Frame::Packet(large), Frame::Error(TransportErrorCode::InvalidAuthKey)]
        );
    }

    #[test]
    fn missing_marker() {
        let mut decoder = AbridgedDecoder::server();
        decoder.push(&[0x02, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decoder.next_frame(), Err(FrameError::MissingMarker { got: 2 }));
    }

    #[test]
    fn oversized_frame() {
        let mut decoder = AbridgedDecoder::client();
        decoder.push(&[0x7f, 0xff, 0xff, 0xff]);
        assert!(matches!(decoder.next_frame(), Err(FrameError::TooLarge { .. })));
    }
}
