//! Diffie-Hellman group used by the key exchange.

use num_bigint::BigUint;

use crate::bigint::{BigNumError, from_hex, to_fixed_be};

const TELEGRAM_PRIME: &str = "\
c71caeb9c6b1c9048e6c522f70f13f73980d40238e3e21c14934d037563d930f\
48198a0aa7c14058229493d22530f4dbfa336f6e0ac925139543aed44cce7c37\
20fd51f69458705ac68cd4fe6b6b13abdc9746512969328454f18faf8c595f64\
2477fe96bb2a941d5bcd1d4ac8cc49880708fa9b378e3c4f3a9060bee67cf9a4\
a4a695811051907e162753b56b0f6b410dba74d8a84b2a14b3144e0ef1284754\
fd17ed950d5965b4b9dd46582db1178d169c6bc465b0d6ff9ca3928fef5b9ae4\
e418fc15e83ebea0f87fa9ff5eed70050ded2849f47bf959d956850ce929851f\
0d8115f635b105ee2e4e15d04b2454bf6f4fadf034b10403119cd8e3b92fcc5b";

/// A 2048-bit safe prime and its generator.
#[derive(Clone, Debug, PartialEq)]
pub struct DhParams {
    pub prime: BigUint,
    pub g: u32,
}

impl DhParams {
    /// Builds the group from hexadecimal prime text.
    pub fn from_hex(prime: &str, g: u32) -> Result<Self, BigNumError> {
        Ok(Self { prime: from_hex(prime)?, g })
    }

    /// Big-endian prime, 256 bytes.
    pub fn prime_bytes(&self) -> Vec<u8> {
        self.prime.to_bytes_be()
    }

    /// `g ^ secret mod p`, left-padded to 256 bytes.
    pub fn public_value(&self, secret: &[u8]) -> Result<Vec<u8>, BigNumError> {
        let v = BigUint::from(self.g).modpow(&BigUint::from_bytes_be(secret), &self.prime);
        to_fixed_be(&v, 256)
    }

    /// `peer ^ secret mod p`, left-padded to 256 bytes.
    pub fn shared_secret(&self, peer: &[u8], secret: &[u8]) -> Result<[u8; 256], BigNumError> {
        let v = BigUint::from_bytes_be(peer).modpow(&BigUint::from_bytes_be(secret), &self.prime);
        let mut out = [0u8; 256];
        out.copy_from_slice(&to_fixed_be(&v, 256)?);
        Ok(out)
    }

    /// Whether `value` lies in `(2^1984, p - 2^1984)`, which also implies
    /// `1 < value < p - 1`.
    pub fn is_safe_value(&self, value: &[u8]) -> bool {
        let value = BigUint::from_bytes_be(value);
        let margin = BigUint::from(1u32) << (2048 - 64);
        if self.prime <= &margin + &margin {
            return false;
        }
        margin < value && value < &self.prime - &margin
    }
}

impl Default for DhParams {
    fn default() -> Self {
        Self {
            prime: BigUint::parse_bytes(TELEGRAM_PRIME.as_bytes(), 16).unwrap_or_default(),
            g: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_group() {
        let dh = DhParams::default();
        assert_eq!(dh.prime.bits(), 2048);
        assert_eq!(dh.prime_bytes().len(), 256);
        assert_eq!(dh.g, 3);
    }

    #[test]
    fn both_sides_agree() {
        let dh = DhParams::default();
        let a = [0x5au8; 256];
        let b = [0xa5u8; 256];
        let g_a = dh.public_value(&a).unwrap();
        let g_b = dh.public_value(&b).unwrap();
        assert!(dh.is_safe_value(&g_a));
        assert!(dh.is_safe_value(&g_b));
        assert_eq!(dh.shared_secret(&g_b, &a).unwrap(), dh.shared_secret(&g_a, &b).unwrap());
    }

    #[test]
    fn unsafe_values() {
        let dh = DhParams::default();
        assert!(!dh.is_safe_value(&[1]));
        assert!(!dh.is_safe_value(&dh.prime_bytes()));
        assert!(DhParams::from_hex("xyz", 3).is_err());
    }
}
