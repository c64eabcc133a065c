//! The [`Serializable`] trait and its primitive implementations.

/// Writes `self` in TL binary form.
pub trait Serializable {
    /// Appends the encoding of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Encodes into a fresh vector.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(&mut out);
        out
    }
}

/// `boolTrue#997275b5` / `boolFalse#bc799737`.
impl Serializable for bool {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let id: u32 = if *self { 0x997275b5 } else { 0xbc799737 };
        id.serialize(buf);
    }
}

macro_rules! le_serializable {
    ($($ty:ty),*) => {$(
        impl Serializable for $ty {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                buf.extend(self.to_le_bytes());
            }
        }
    )*};
}

le_serializable!(i32, u32, i64, u64, f64);

impl<const N: usize> Serializable for [u8; N] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

/// Longest byte string the 24-bit length prefix can describe.
pub const MAX_BYTES_LEN: usize = (1 << 24) - 1;

/// Length-prefixed bytes, zero-padded to a multiple of four.
///
/// Up to 253 bytes use a single length byte; longer values use `0xfe`
/// followed by a 24-bit little-endian length. Values longer than
/// [`MAX_BYTES_LEN`] cannot be encoded; callers must chunk them.
impl Serializable for [u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        debug_assert!(len <= MAX_BYTES_LEN, "{len} bytes do not fit a TL length prefix");
        let header = if len < 254 {
            buf.extend([len as u8]);
            1
        } else {
            buf.extend([0xfe, len as u8, (len >> 8) as u8, (len >> 16) as u8]);
            4
        };
        buf.extend(self.iter().copied());
        let padding = (4 - (header + len) % 4) % 4;
        buf.extend(std::iter::repeat_n(0u8, padding));
    }
}

impl Serializable for &[u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (**self).serialize(buf);
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf);
    }
}

impl Serializable for str {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

/// Boxed `Vector<T>`: `0x1cb5c415`, a count, then the items.
impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        crate::VECTOR_ID.serialize(buf);
        serialize_items(self, buf);
    }
}

impl<T: Serializable> Serializable for crate::RawVec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        serialize_items(&self.0, buf);
    }
}

fn serialize_items<T: Serializable>(items: &[T], buf: &mut impl Extend<u8>) {
    (items.len() as i32).serialize(buf);
    for item in items {
        item.serialize(buf);
    }
}

impl Serializable for crate::Blob {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.0.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_BYTES_LEN, Serializable};

    #[test]
    fn string_headers() {
        assert_eq!("".to_bytes(), [0, 0, 0, 0]);
        assert_eq!("abc".to_bytes(), [3, b'a', b'b', b'c']);
        let long = vec![7u8; 254].to_bytes();
        assert_eq!(&long[..4], &[0xfe, 254, 0, 0]);
        assert_eq!(long.len(), 260);
    }

    #[test]
    fn longest_encodable_string() {
        let max = vec![0u8; MAX_BYTES_LEN].to_bytes();
        assert_eq!(&max[..4], &[0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(max.len() % 4, 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "do not fit a TL length prefix")]
    fn overlong_string_is_caught() {
        vec![0u8; MAX_BYTES_LEN + 1].to_bytes();
    }
}
