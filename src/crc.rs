// CRC-32 (ISO-HDLC): reflected polynomial 0xEDB88320, init/final xor
// 0xFFFFFFFF. Covers `len ‖ payload` only, never the symbol padding.

/// Compute the frame CRC-32 over `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_of_single_zero_byte_matches_spec_example() {
        // spec.md §8 scenario 2: CRC of [0x00] = 0xD202EF8D.
        assert_eq!(crc32(&[0x00]), 0xD202_EF8D);
    }

    #[test]
    fn crc_of_empty_input_is_zero() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn single_bit_flip_changes_crc() {
        let original = [0x05u8, b'h', b'e', b'l', b'l', b'o'];
        let original_crc = crc32(&original);
        for byte_idx in 0..original.len() {
            for bit in 0..8u8 {
                let mut flipped = original;
                flipped[byte_idx] ^= 1 << bit;
                assert_ne!(
                    crc32(&flipped),
                    original_crc,
                    "byte {byte_idx} bit {bit} flip did not change CRC"
                );
            }
        }
    }
}
