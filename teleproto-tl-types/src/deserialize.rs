//! The [`Deserializable`] trait, the sticky-error [`Cursor`] and primitive impls.

use std::fmt;

/// Errors that can occur while decoding.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The buffer ended before the value did.
    UnexpectedEof,
    /// A constructor id no variant of the expected type uses.
    UnexpectedConstructor {
        /// The id that was read.
        id: u32,
    },
    /// A `string` that is not UTF-8.
    InvalidUtf8,
    /// A negative or impossible vector length.
    InvalidLength {
        /// The length that was read.
        len: i32,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::UnexpectedConstructor { id } => write!(f, "unexpected constructor id: {id:#010x}"),
            Self::InvalidUtf8 => write!(f, "string is not valid utf-8"),
            Self::InvalidLength { len } => write!(f, "invalid vector length: {len}"),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for decoding.
pub type Result<T> = std::result::Result<T, Error>;

/// A read cursor over a byte slice with a sticky error flag.
///
/// The first failure is recorded; every read after that returns the same
/// error without touching the buffer. Callers decode a whole logical message
/// and check once at the end rather than after every field.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    error: Option<Error>,
}

impl<'a> Cursor<'a> {
    /// A cursor positioned at the start of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, error: None }
    }

    /// Bytes consumed so far.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether a previous read failed.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The recorded failure, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Records `error` unless an earlier one is already set, and returns the
    /// error that is now sticky.
    pub fn fail(&mut self, error: Error) -> Error {
        self.error.get_or_insert(error).clone()
    }

    fn check(&self) -> Result<()> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Borrows the next `len` bytes.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.check()?;
        match self.buf.get(self.pos..self.pos.saturating_add(len)) {
            Some(slice) => {
                self.pos += len;
                Ok(slice)
            }
            None => Err(self.fail(Error::UnexpectedEof)),
        }
    }

    /// Reads one byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    /// Fills `out` completely.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(self.read_slice(out.len())?);
        Ok(())
    }

    /// Takes everything left.
    pub fn read_to_end(&mut self) -> Result<&'a [u8]> {
        self.read_slice(self.remaining())
    }

    /// Looks at the next constructor id without consuming it.
    pub fn peek_u32(&self) -> Result<u32> {
        self.check()?;
        match self.buf.get(self.pos..self.pos + 4) {
            Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            None => Err(Error::UnexpectedEof),
        }
    }

    /// Splits off a cursor over the next `len` bytes and skips past them.
    ///
    /// Decoding a message body through the sub-cursor keeps a bad length
    /// or a greedy [`crate::Blob`] from reading into its neighbours.
    pub fn take(&mut self, len: usize) -> Result<Cursor<'a>> {
        Ok(Cursor::from_slice(self.read_slice(len)?))
    }
}

/// Alias used by generated code.
pub type Buffer<'a, 'b> = &'a mut Cursor<'b>;

/// Reads a value in TL binary form.
pub trait Deserializable: Sized {
    /// Reads `Self` from `buf`, advancing it.
    fn deserialize(buf: Buffer) -> Result<Self>;

    /// Decodes from the front of `bytes`, ignoring anything after the value.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut Cursor::from_slice(bytes))
    }

    /// Decodes from the front of `bytes` and reports how many were consumed.
    fn from_bytes_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = Cursor::from_slice(bytes);
        let value = Self::deserialize(&mut cursor)?;
        Ok((value, cursor.pos()))
    }
}

impl Deserializable for bool {
    fn deserialize(buf: Buffer) -> Result<Self> {
        match u32::deserialize(buf)? {
            0x997275b5 => Ok(true),
            0xbc799737 => Ok(false),
            id => Err(buf.fail(Error::UnexpectedConstructor { id })),
        }
    }
}

macro_rules! le_deserializable {
    ($($ty:ty),*) => {$(
        impl Deserializable for $ty {
            fn deserialize(buf: Buffer) -> Result<Self> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                buf.read_exact(&mut bytes)?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }
    )*};
}

le_deserializable!(i32, u32, i64, u64, f64);

impl<const N: usize> Deserializable for [u8; N] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut out = [0u8; N];
        buf.read_exact(&mut out)?;
        Ok(out)
    }
}

impl Deserializable for Vec<u8> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let first = buf.read_byte()?;
        let (header, len) = if first == 0xfe {
            let b = buf.read_slice(3)?;
            (4, usize::from(b[0]) | usize::from(b[1]) << 8 | usize::from(b[2]) << 16)
        } else {
            (1, usize::from(first))
        };
        let data = buf.read_slice(len)?.to_vec();
        buf.read_slice((4 - (header + len) % 4) % 4)?;
        Ok(data)
    }
}

impl Deserializable for String {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let bytes = Vec::<u8>::deserialize(buf)?;
        String::from_utf8(bytes).map_err(|_| buf.fail(Error::InvalidUtf8))
    }
}

fn read_items<T: Deserializable>(buf: Buffer) -> Result<Vec<T>> {
    let len = i32::deserialize(buf)?;
    // Every item takes at least four bytes on the wire.
    if len < 0 || len as usize > buf.remaining() / 4 {
        return Err(buf.fail(Error::InvalidLength { len }));
    }
    (0..len).map(|_| T::deserialize(buf)).collect()
}

/// Boxed `Vector<T>`. A different leading id marks the stream failed and
/// yields an error rather than a partially built vector.
impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let id = u32::deserialize(buf)?;
        if id != crate::VECTOR_ID {
            return Err(buf.fail(Error::UnexpectedConstructor { id }));
        }
        read_items(buf)
    }
}

impl<T: Deserializable> Deserializable for crate::RawVec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        read_items(buf).map(crate::RawVec)
    }
}

impl Deserializable for crate::Blob {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(crate::Blob(buf.read_to_end()?.to_vec()))
    }
}
