//! Big-number helpers over `num-bigint`.
//!
//! Malformed input is reported as [`BigNumError`] instead of silently
//! producing zero.

use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;

/// Invalid big-number input.
#[derive(Clone, Debug, PartialEq)]
pub enum BigNumError {
    /// Hex text was empty or had a non-hex digit.
    InvalidHex,
    /// The modulus was zero (or empty).
    ZeroModulus,
    /// A value did not fit the requested width.
    TooLarge {
        /// Width that was asked for.
        width: usize,
    },
}

impl fmt::Display for BigNumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHex => write!(f, "invalid hexadecimal number"),
            Self::ZeroModulus => write!(f, "modulus is zero"),
            Self::TooLarge { width } => write!(f, "number does not fit in {width} bytes"),
        }
    }
}

impl std::error::Error for BigNumError {}

/// Parses big-endian hex text (no `0x` prefix, whitespace ignored).
pub fn from_hex(hex: &str) -> Result<BigUint, BigNumError> {
    let digits: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() {
        return Err(BigNumError::InvalidHex);
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).ok_or(BigNumError::InvalidHex)
}

/// `base ^ exp mod modulus` over big-endian byte strings. The result is
/// left-padded to the modulus length.
pub fn mod_exp(base: &[u8], exp: &[u8], modulus: &[u8]) -> Result<Vec<u8>, BigNumError> {
    let m = BigUint::from_bytes_be(modulus);
    if m.is_zero() {
        return Err(BigNumError::ZeroModulus);
    }
    let r = BigUint::from_bytes_be(base).modpow(&BigUint::from_bytes_be(exp), &m);
    to_fixed_be(&r, modulus.len())
}

/// [`mod_exp`] with hexadecimal operands.
pub fn mod_exp_hex(base: &str, exp: &str, modulus: &str) -> Result<Vec<u8>, BigNumError> {
    let m = from_hex(modulus)?;
    if m.is_zero() {
        return Err(BigNumError::ZeroModulus);
    }
    let r = from_hex(base)?.modpow(&from_hex(exp)?, &m);
    to_fixed_be(&r, m.to_bytes_be().len())
}

/// Big-endian bytes of `n`, left-padded with zeros to `width`.
pub fn to_fixed_be(n: &BigUint, width: usize) -> Result<Vec<u8>, BigNumError> {
    let bytes = n.to_bytes_be();
    if bytes.len() > width {
        return Err(BigNumError::TooLarge { width });
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values() {
        assert_eq!(mod_exp(&[4], &[13], &[1, 241]).unwrap(), vec![1, 189]); // 4^13 mod 497 = 445
        assert_eq!(mod_exp_hex("4", "d", "1f1").unwrap(), vec![1, 189]);
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert_eq!(mod_exp(&[2], &[3], &[]), Err(BigNumError::ZeroModulus));
        assert_eq!(mod_exp(&[2], &[3], &[0, 0]), Err(BigNumError::ZeroModulus));
        assert_eq!(mod_exp_hex("zz", "1", "7"), Err(BigNumError::InvalidHex));
        assert_eq!(mod_exp_hex("", "1", "7"), Err(BigNumError::InvalidHex));
    }

    #[test]
    fn fixed_width() {
        let n = BigUint::from(0x0102u32);
        assert_eq!(to_fixed_be(&n, 4).unwrap(), [0, 0, 1, 2]);
        assert_eq!(to_fixed_be(&n, 1), Err(BigNumError::TooLarge { width: 1 }));
    }
}
