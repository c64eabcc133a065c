/// CRC32 constructor id of a declaration that carries no explicit `#id`.
///
/// The checksum covers the whole declaration (without `;`) with runs of
/// whitespace collapsed to a single space.
pub(crate) fn tl_id(declaration: &str) -> u32 {
    let normalised = declaration
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    crc32(normalised.as_bytes())
}

// ISO 3309, reflected polynomial.
fn crc32(data: &[u8]) -> u32 {
    !data.iter().fold(u32::MAX, |crc, &byte| {
        (0..8).fold(crc ^ u32::from(byte), |c, _| {
            if c & 1 == 1 { (c >> 1) ^ 0xEDB8_8320 } else { c >> 1 }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::tl_id;

    #[test]
    fn derived_ids() {
        assert_eq!(tl_id("boolFalse = Bool"), 0xbc799737);
        assert_eq!(tl_id("boolTrue   =   Bool"), 0x997275b5);
    }
}
