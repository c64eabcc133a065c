//! AES-256 in Infinite Garble Extension (IGE) mode.
//!
//! The 32-byte IV holds the previous ciphertext block (first half) and
//! the previous plaintext block (second half).

use aes::Aes256;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};

fn xor_into(dst: &mut [u8; 16], a: &[u8], b: &[u8]) {
    for ((d, x), y) in dst.iter_mut().zip(a).zip(b) {
        *d = x ^ y;
    }
}

/// Encrypts `buffer` in place. `buffer.len()` must be a multiple of 16.
pub fn ige_encrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    debug_assert_eq!(buffer.len() % 16, 0);
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher: [u8; 16] = [0; 16];
    let mut prev_plain: [u8; 16] = [0; 16];
    prev_cipher.copy_from_slice(&iv[..16]);
    prev_plain.copy_from_slice(&iv[16..]);

    for block in buffer.chunks_exact_mut(16) {
        let mut plain = [0u8; 16];
        plain.copy_from_slice(block);

        let mut work = [0u8; 16];
        xor_into(&mut work, &plain, &prev_cipher);
        let mut ga = GenericArray::from(work);
        cipher.encrypt_block(&mut ga);
        xor_into(&mut work, &ga, &prev_plain);

        block.copy_from_slice(&work);
        prev_cipher = work;
        prev_plain = plain;
    }
}

/// Decrypts `buffer` in place. `buffer.len()` must be a multiple of 16.
pub fn ige_decrypt(buffer: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) {
    debug_assert_eq!(buffer.len() % 16, 0);
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher: [u8; 16] = [0; 16];
    let mut prev_plain: [u8; 16] = [0; 16];
    prev_cipher.copy_from_slice(&iv[..16]);
    prev_plain.copy_from_slice(&iv[16..]);

    for block in buffer.chunks_exact_mut(16) {
        let mut ciphertext = [0u8; 16];
        ciphertext.copy_from_slice(block);

        let mut work = [0u8; 16];
        xor_into(&mut work, &ciphertext, &prev_plain);
        let mut ga = GenericArray::from(work);
        cipher.decrypt_block(&mut ga);
        xor_into(&mut work, &ga, &prev_cipher);

        block.copy_from_slice(&work);
        prev_cipher = ciphertext;
        prev_plain = work;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_iv() -> ([u8; 32], [u8; 32]) {
        (std::array::from_fn(|i| i as u8), std::array::from_fn(|i| (i + 32) as u8))
    }

    #[test]
    fn known_answer() {
        let (key, iv) = key_iv();
        let mut data: Vec<u8> = (0..48).collect();
        ige_encrypt(&mut data, &key, &iv);
        let expected = "42e66e1a756cccf5b27acc47523ad074ee39bf54e3db37bbdf415df6b400fca977f708327c9e9341cc3dc8efd31e7646";
        let hex: String = data.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, expected);

        ige_decrypt(&mut data, &key, &iv);
        assert_eq!(data, (0..48).collect::<Vec<u8>>());
    }
}
