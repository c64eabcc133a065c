//! RSA as used by the MTProto 1.0 key exchange.
//!
//! The client sends `RSA(SHA1(data) ++ data ++ random)` to the server; the
//! payload is always 255 bytes so it stays below any 2048-bit modulus.

use std::fmt;

use num_bigint::BigUint;

use crate::bigint::to_fixed_be;
use crate::sha1;

/// Length of the padded block fed to the modular exponentiation.
pub const PADDED_LEN: usize = 255;

/// Bytes of random padding the caller must supply to [`encrypt_hashed`].
pub const RANDOM_LEN: usize = PADDED_LEN - 20;

/// Errors from the RSA helpers.
#[derive(Clone, Debug, PartialEq)]
pub enum RsaError {
    /// The plaintext plus its hash does not fit the padded block.
    DataTooLarge { len: usize },
    /// A ciphertext had the wrong size.
    InvalidLength { len: usize },
    /// The ciphertext, read as a number, is not below the modulus.
    OutOfRange,
}

impl fmt::Display for RsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataTooLarge { len } => write!(f, "{len} bytes do not fit in an RSA block"),
            Self::InvalidLength { len } => write!(f, "RSA ciphertext of {len} bytes (expected 256)"),
            Self::OutOfRange => write!(f, "RSA ciphertext is not below the modulus"),
        }
    }
}

impl std::error::Error for RsaError {}

/// An RSA public key (n, e).
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    n: BigUint,
    e: BigUint,
}

impl Key {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
        })
    }

    /// `SHA1(bytes(n) ++ bytes(e))[12..20]` read as a little-endian `i64`,
    /// where `bytes` is the TL string encoding of the big-endian number.
    pub fn fingerprint(&self) -> i64 {
        let mut buf = tl_bytes(&self.n.to_bytes_be());
        buf.extend(tl_bytes(&self.e.to_bytes_be()));
        let sha = sha1!(&buf);
        let mut id = [0u8; 8];
        id.copy_from_slice(&sha[12..20]);
        i64::from_le_bytes(id)
    }
}

/// An RSA private key, held by the server.
#[derive(Clone)]
pub struct PrivateKey {
    public: Key,
    d: BigUint,
}

impl PrivateKey {
    /// Parse decimal `n`, `e` and `d` strings.
    pub fn new(n: &str, e: &str, d: &str) -> Option<Self> {
        Some(Self {
            public: Key::new(n, e)?,
            d: BigUint::parse_bytes(d.as_bytes(), 10)?,
        })
    }

    #[cfg_attr(not(feature = "dev-keys"), allow(dead_code))]
    pub(crate) fn from_parts(n: BigUint, e: BigUint, d: BigUint) -> Self {
        Self { public: Key { n, e }, d }
    }

    pub fn public_key(&self) -> &Key {
        &self.public
    }

    pub fn fingerprint(&self) -> i64 {
        self.public.fingerprint()
    }

    /// Reverses [`encrypt_hashed`], returning the 255-byte padded block:
    /// a SHA-1 digest followed by the data and its random tail. The caller
    /// knows where the data ends and checks the digest over it.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RsaError> {
        if ciphertext.len() != 256 {
            return Err(RsaError::InvalidLength { len: ciphertext.len() });
        }
        let c = BigUint::from_bytes_be(ciphertext);
        if c >= self.public.n {
            return Err(RsaError::OutOfRange);
        }
        let m = c.modpow(&self.d, &self.public.n);
        to_fixed_be(&m, PADDED_LEN).map_err(|_| RsaError::OutOfRange)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(fingerprint={})", self.fingerprint())
    }
}

/// RSA-encrypt `data` prefixed by its SHA-1 and padded with `random`.
///
/// `data` must be at most [`RANDOM_LEN`] bytes; only the bytes of `random`
/// needed to fill the block are used.
pub fn encrypt_hashed(data: &[u8], key: &Key, random: &[u8; RANDOM_LEN]) -> Result<Vec<u8>, RsaError> {
    if data.len() > RANDOM_LEN {
        return Err(RsaError::DataTooLarge { len: data.len() });
    }

    let mut block = Vec::with_capacity(PADDED_LEN);
    block.extend_from_slice(&sha1!(data));
    block.extend_from_slice(data);
    block.extend_from_slice(&random[..PADDED_LEN - block.len()]);

    let encrypted = BigUint::from_bytes_be(&block).modpow(&key.e, &key.n);
    to_fixed_be(&encrypted, 256).map_err(|_| RsaError::OutOfRange)
}

fn tl_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    if data.len() < 254 {
        out.push(data.len() as u8);
    } else {
        out.push(254);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes()[..3]);
    }
    out.extend_from_slice(data);
    out.resize(out.len().next_multiple_of(4), 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tl_bytes_padding() {
        assert_eq!(tl_bytes(&[1, 2, 3]), [3, 1, 2, 3]);
        assert_eq!(tl_bytes(&[1, 2, 3, 4]), [4, 1, 2, 3, 4, 0, 0, 0]);
        let long = tl_bytes(&[7; 256]);
        assert_eq!(&long[..4], &[254, 0, 1, 0]);
        assert_eq!(long.len(), 260);
    }

    #[test]
    fn oversized_data_is_rejected() {
        let key = Key::new("3233", "17").unwrap();
        assert_eq!(
            encrypt_hashed(&[0; RANDOM_LEN + 1], &key, &[0; RANDOM_LEN]),
            Err(RsaError::DataTooLarge { len: RANDOM_LEN + 1 })
        );
    }

    #[test]
    fn decimal_parsing() {
        assert!(Key::new("12x", "3").is_none());
        assert!(PrivateKey::new("3233", "17", "").is_none());
    }
}
