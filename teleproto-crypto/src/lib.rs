//! Cryptographic primitives for MTProto 1.0.
//!
//! Provides:
//! - AES-256-IGE encryption/decryption
//! - SHA-1 / SHA-256 hash macros
//! - Pollard-rho pq factorization and pq generation
//! - RSA (public encryption, private decryption, fingerprints)
//! - The Diffie-Hellman group and checked modular exponentiation
//! - `AuthKey`, the 256-byte shared key
//! - MTProto 1.0 message keys and per-direction key/IV derivation
//! - DH nonce to temporary key derivation

#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod aes;
mod auth_key;
pub mod bigint;
#[cfg(feature = "dev-keys")]
#[cfg_attr(docsrs, doc(cfg(feature = "dev-keys")))]
pub mod dev;
pub mod dh;
mod factorize;
pub mod rsa;
mod sha;

pub use auth_key::AuthKey;
pub use bigint::{BigNumError, mod_exp, mod_exp_hex};
pub use dh::DhParams;
pub use factorize::{factorize, generate_pq, is_prime};

#[doc(hidden)]
pub mod hash {
    pub use crate::sha::{sha1_parts, sha256_parts};
}

// ─── MTProto 1.0 encrypt / decrypt ───────────────────────────────────────────

/// Size of `salt ++ session_id ++ msg_id ++ seq_no ++ length`.
pub const HEADER_LEN: usize = 32;

/// Errors from [`decrypt_message`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptError {
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the packet does not match our key.
    AuthKeyMismatch,
    /// The `msg_key` in the packet does not match the decrypted content.
    MessageKeyMismatch,
    /// The declared body length is impossible for this packet.
    InvalidLength { len: u32 },
}

impl std::fmt::Display for DecryptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
            Self::InvalidLength { len } => write!(f, "invalid message length {len}"),
        }
    }
}

impl std::error::Error for DecryptError {}

/// Which peer produced a packet. Selects the offset into the auth key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// `SHA1(plaintext)[4..20]`, over header and body without padding.
pub fn message_key(plaintext: &[u8]) -> [u8; 16] {
    let sha = sha1!(plaintext);
    let mut key = [0u8; 16];
    key.copy_from_slice(&sha[4..]);
    key
}

fn derive_key_iv(auth_key: &AuthKey, msg_key: &[u8; 16], x: usize) -> ([u8; 32], [u8; 32]) {
    let ak = &auth_key.data;
    let sha_a = sha1!(msg_key, &ak[x..x + 32]);
    let sha_b = sha1!(&ak[32 + x..48 + x], msg_key, &ak[48 + x..64 + x]);
    let sha_c = sha1!(&ak[64 + x..96 + x], msg_key);
    let sha_d = sha1!(msg_key, &ak[96 + x..128 + x]);

    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&sha_a[..8]);
    key[8..20].copy_from_slice(&sha_b[8..]);
    key[20..].copy_from_slice(&sha_c[4..16]);

    let mut iv = [0u8; 32];
    iv[..12].copy_from_slice(&sha_a[8..]);
    iv[12..20].copy_from_slice(&sha_b[..8]);
    iv[20..24].copy_from_slice(&sha_c[16..]);
    iv[24..].copy_from_slice(&sha_d[..8]);

    (key, iv)
}

/// AES key and IV for packets sent by the client.
pub fn client_to_server_key_iv(auth_key: &AuthKey, msg_key: &[u8; 16]) -> ([u8; 32], [u8; 32]) {
    derive_key_iv(auth_key, msg_key, 0)
}

/// AES key and IV for packets sent by the server.
pub fn server_to_client_key_iv(auth_key: &AuthKey, msg_key: &[u8; 16]) -> ([u8; 32], [u8; 32]) {
    derive_key_iv(auth_key, msg_key, 8)
}

fn key_iv(auth_key: &AuthKey, msg_key: &[u8; 16], direction: Direction) -> ([u8; 32], [u8; 32]) {
    match direction {
        Direction::ClientToServer => client_to_server_key_iv(auth_key, msg_key),
        Direction::ServerToClient => server_to_client_key_iv(auth_key, msg_key),
    }
}

/// Encrypts `plaintext` (header and body) into
/// `auth_key_id ++ msg_key ++ ciphertext`, padding with random bytes.
pub fn encrypt_message(plaintext: &[u8], auth_key: &AuthKey, direction: Direction) -> Vec<u8> {
    let mut rnd = [0u8; 15];
    getrandom::getrandom(&mut rnd).expect("getrandom failed");
    do_encrypt_message(plaintext, auth_key, direction, &rnd)
}

pub(crate) fn do_encrypt_message(
    plaintext: &[u8],
    auth_key: &AuthKey,
    direction: Direction,
    padding: &[u8; 15],
) -> Vec<u8> {
    let msg_key = message_key(plaintext);
    let (key, iv) = key_iv(auth_key, &msg_key, direction);

    let pad = (16 - plaintext.len() % 16) % 16;
    let mut buffer = Vec::with_capacity(24 + plaintext.len() + pad);
    buffer.extend_from_slice(&auth_key.key_id);
    buffer.extend_from_slice(&msg_key);
    buffer.extend_from_slice(plaintext);
    buffer.extend_from_slice(&padding[..pad]);

    aes::ige_encrypt(&mut buffer[24..], &key, &iv);
    buffer
}

/// Decrypts a packet produced by [`encrypt_message`] for `direction`.
///
/// Returns the plaintext header and body with the padding removed.
pub fn decrypt_message(packet: &[u8], auth_key: &AuthKey, direction: Direction) -> Result<Vec<u8>, DecryptError> {
    if packet.len() < 24 + HEADER_LEN || (packet.len() - 24) % 16 != 0 {
        return Err(DecryptError::InvalidBuffer);
    }
    if auth_key.key_id != packet[..8] {
        return Err(DecryptError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&packet[8..24]);

    let (key, iv) = key_iv(auth_key, &msg_key, direction);
    let mut plain = packet[24..].to_vec();
    aes::ige_decrypt(&mut plain, &key, &iv);

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&plain[28..32]);
    let len = u32::from_le_bytes(len_bytes);
    let room = plain.len() - HEADER_LEN;
    if len as usize > room || room - len as usize >= 16 || len % 4 != 0 {
        return Err(DecryptError::InvalidLength { len });
    }

    plain.truncate(HEADER_LEN + len as usize);
    if message_key(&plain) != msg_key {
        return Err(DecryptError::MessageKeyMismatch);
    }
    Ok(plain)
}

/// Derive `(key, iv)` from nonces for the handshake's encrypted DH answer
/// and the client's DH parameters.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap()).collect()
    }

    fn auth_key() -> AuthKey {
        AuthKey::from_bytes(std::array::from_fn(|i| i as u8))
    }

    fn plaintext() -> Vec<u8> {
        let mut p = Vec::new();
        p.extend(0x1122334455667788u64.to_le_bytes());
        p.extend(0x0102030405060708u64.to_le_bytes());
        p.extend(0x5e0b700a00000000u64.to_le_bytes());
        p.extend(1u32.to_le_bytes());
        p.extend(8u32.to_le_bytes());
        p.extend(0u8..8);
        p
    }

    #[test]
    fn message_key_vector() {
        assert_eq!(message_key(&plaintext()).to_vec(), hex("7da21309fa93be196a49a05915ff2e53"));
    }

    #[test]
    fn directional_key_iv_vectors() {
        let mk: [u8; 16] = std::array::from_fn(|i| i as u8);
        let (key, iv) = client_to_server_key_iv(&auth_key(), &mk);
        assert_eq!(key.to_vec(), hex("17d7295ca9213d1ab656acdb1ad48b2ea7f3a8f7095098d5508b900bbd5fccfc"));
        assert_eq!(iv.to_vec(), hex("2d7d16a65a84108e9805656caa474501cc580aa2edc33abfd0bfad785464d1c6"));

        let (key, iv) = server_to_client_key_iv(&auth_key(), &mk);
        assert_eq!(key.to_vec(), hex("bb17b07eb91110647098b069bd1a9b6fe5c4bcc3c31f8e67e831d07a61085f68"));
        assert_eq!(iv.to_vec(), hex("5197fc1e25b41fe36f18b5a3a8b2b36cb2cb061f1f157b3514fe42e74fb58359"));
    }

    #[test]
    fn encrypt_vectors() {
        let packet = do_encrypt_message(&plaintext(), &auth_key(), Direction::ClientToServer, &[0; 15]);
        assert_eq!(
            packet,
            hex("32d1586ea457dfc87da21309fa93be196a49a05915ff2e53ee6a1236a516922dd95a7d63276a6dbc\
                 3e37eb41346b35e7c0532bfd4d8b8ab7e40e523eac42027e83ee13610f9d6b05")
        );
        let packet = do_encrypt_message(&plaintext(), &auth_key(), Direction::ServerToClient, &[0; 15]);
        assert_eq!(
            packet,
            hex("32d1586ea457dfc87da21309fa93be196a49a05915ff2e533befceb04c2673bd1c2fafeb0d919130\
                 fbfacd92e1d3cf5e4ac11212474c75c4f189f5c681cb710f66d7d6d411cc482d")
        );
    }

    #[test]
    fn decrypt_round_trip() {
        let packet = encrypt_message(&plaintext(), &auth_key(), Direction::ServerToClient);
        assert_eq!(decrypt_message(&packet, &auth_key(), Direction::ServerToClient).unwrap(), plaintext());
    }

    #[test]
    fn wrong_direction_is_rejected() {
        let packet = encrypt_message(&plaintext(), &auth_key(), Direction::ClientToServer);
        assert!(decrypt_message(&packet, &auth_key(), Direction::ServerToClient).is_err());
    }

    #[test]
    fn tampering_is_detected() {
        let mut packet = do_encrypt_message(&plaintext(), &auth_key(), Direction::ClientToServer, &[0; 15]);
        packet[8] ^= 1;
        assert!(decrypt_message(&packet, &auth_key(), Direction::ClientToServer).is_err());

        let other = AuthKey::from_bytes([7; 256]);
        let packet = encrypt_message(&plaintext(), &auth_key(), Direction::ClientToServer);
        assert_eq!(
            decrypt_message(&packet, &other, Direction::ClientToServer),
            Err(DecryptError::AuthKeyMismatch)
        );
        assert_eq!(
            decrypt_message(&packet[..40], &auth_key(), Direction::ClientToServer),
            Err(DecryptError::InvalidBuffer)
        );
    }

    #[test]
    fn nonce_schedule_vector() {
        let server_nonce: [u8; 16] = std::array::from_fn(|i| i as u8);
        let new_nonce: [u8; 32] = std::array::from_fn(|i| (i + 100) as u8);
        let (key, iv) = generate_key_data_from_nonce(&server_nonce, &new_nonce);
        assert_eq!(key.to_vec(), hex("e95c7c3ec6aeeae100f21acfd4a819230989731d44b134a83a2e9ca0ce56c585"));
        assert_eq!(iv.to_vec(), hex("da23077ca3f27dec3969124214fdeeacbd8c9de3143ab8ba9423116e64656667"));
    }
}
