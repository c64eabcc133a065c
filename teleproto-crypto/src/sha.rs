//! Digests over concatenated slices. The key derivations hash two to four
//! pieces at a time, so the macros take any number of `AsRef<[u8]>` parts.

use sha1::Sha1;
use sha2::Sha256;
use sha2::digest::Digest;

#[doc(hidden)]
pub fn digest_parts<D: Digest, const N: usize>(parts: &[&[u8]]) -> [u8; N] {
    let mut h = D::new();
    for part in parts {
        h.update(part);
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&h.finalize());
    out
}

#[doc(hidden)]
pub fn sha1_parts(parts: &[&[u8]]) -> [u8; 20] {
    digest_parts::<Sha1, 20>(parts)
}

#[doc(hidden)]
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    digest_parts::<Sha256, 32>(parts)
}

/// SHA-1 of the arguments, concatenated.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ ) => {
        $crate::hash::sha1_parts(&[ $( ::core::convert::AsRef::<[u8]>::as_ref(&$x) ),+ ])
    };
}

/// SHA-256 of the arguments, concatenated.
#[macro_export]
macro_rules! sha256 {
    ( $( $x:expr ),+ ) => {
        $crate::hash::sha256_parts(&[ $( ::core::convert::AsRef::<[u8]>::as_ref(&$x) ),+ ])
    };
}
