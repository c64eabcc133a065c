//! The 2048-bit authorization key shared after the DH exchange.

use crate::sha1;

/// A 256-byte authorization key with its derived identifiers.
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    pub(crate) aux_hash: [u8; 8],
    pub(crate) key_id: [u8; 8],
}

impl AuthKey {
    /// Wraps raw key material (`g_ab` left-padded to 256 bytes).
    pub fn from_bytes(data: [u8; 256]) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id }
    }

    /// Like [`AuthKey::from_bytes`], for a slice that must be 256 bytes long.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        Some(Self::from_bytes(data.try_into().ok()?))
    }

    /// Raw key material.
    pub fn to_bytes(&self) -> [u8; 256] {
        self.data
    }

    /// Lower 64 bits of SHA-1(key), as carried in every encrypted packet.
    pub fn key_id(&self) -> [u8; 8] {
        self.key_id
    }

    /// [`AuthKey::key_id`] as the little-endian integer used for lookups.
    pub fn id(&self) -> u64 {
        u64::from_le_bytes(self.key_id)
    }

    /// `new_nonce_hash{number}` for `dh_gen_ok`/`retry`/`fail`:
    /// SHA1(new_nonce ++ number ++ aux_hash)[4..20].
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let sha = sha1!(new_nonce, [number], self.aux_hash);
        let mut out = [0u8; 16];
        out.copy_from_slice(&sha[4..]);
        out
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={:016x})", self.id())
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for AuthKey {}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AuthKey {
        AuthKey::from_bytes(std::array::from_fn(|i| i as u8))
    }

    #[test]
    fn identifiers() {
        let key = key();
        assert_eq!(key.key_id(), [0x32, 0xd1, 0x58, 0x6e, 0xa4, 0x57, 0xdf, 0xc8]);
        assert_eq!(key.id() as i64, -3972359982579920590);
        assert_eq!(key.aux_hash, [0x49, 0x16, 0xd6, 0xbd, 0xb7, 0xf7, 0x8e, 0x68]);
    }

    #[test]
    fn nonce_hash() {
        let new_nonce: [u8; 32] = std::array::from_fn(|i| (i + 100) as u8);
        let expected = [
            0x63, 0x2f, 0xf5, 0xab, 0x12, 0xd1, 0x32, 0xe9, 0xf2, 0x4d, 0xf2, 0x75, 0xdf, 0x47, 0x3a, 0x09,
        ];
        assert_eq!(key().calc_new_nonce_hash(&new_nonce, 1), expected);
    }

    #[test]
    fn slice_length_is_checked() {
        assert!(AuthKey::from_slice(&[0; 255]).is_none());
        assert_eq!(AuthKey::from_slice(&key().to_bytes()), Some(key()));
    }
}
