//! Machine-status (alert bit-field) decoder: decode through the codec,
//! then walk bit positions starting at byte offset 1 (byte 0 is the key
//! echo), MSB-first within each byte.

use bluefrog_codec::enc_dec;
use tracing::warn;

/// Decodes a raw Machine-Status frame into the set of asserted alert bit
/// indices.
///
/// The first decoded byte is the key echo. A mismatch is logged and the
/// frame dropped (`None`), not a hard error — some machine firmware
/// revisions omit the echo.
#[must_use]
pub fn decode_alerts(raw: &[u8], key: u8) -> Option<Vec<usize>> {
    if raw.is_empty() {
        return Some(Vec::new());
    }
    let decoded = enc_dec(raw, key);
    if decoded[0] != key {
        warn!(
            echoed = decoded[0],
            expected = key,
            "machine-status frame key echo mismatch, dropping frame"
        );
        return None;
    }
    Some(asserted_bits(&decoded))
}

/// Walks the decoded buffer, MSB-first, starting after the key-echo byte.
fn asserted_bits(decoded: &[u8]) -> Vec<usize> {
    let bit_count = decoded.len().saturating_sub(1) * 8;
    (0..bit_count)
        .filter(|&i| {
            let byte_off = (i >> 3) + 1;
            let bit_off = 7 - (i & 7);
            (decoded[byte_off] >> bit_off) & 1 == 1
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_bit_of_second_byte_is_bit_zero() {
        let key = 0x11;
        let decoded = [key, 0x80, 0x00];
        let raw = enc_dec(&decoded, key);
        let bits = decode_alerts(&raw, key).unwrap();
        assert_eq!(bits, vec![0]);
    }

    #[test]
    fn key_mismatch_drops_frame() {
        let raw = enc_dec(&[0x99, 0x80, 0x00], 0x11);
        assert_eq!(decode_alerts(&raw, 0x11), None);
    }

    #[test]
    fn multiple_bits_across_bytes() {
        let key = 0x42;
        // bit 0 (first bit of byte[1]) and bit 15 (last bit of byte[2]).
        let decoded = [key, 0x80, 0x01];
        let raw = enc_dec(&decoded, key);
        assert_eq!(decode_alerts(&raw, key).unwrap(), vec![0, 15]);
    }
}
