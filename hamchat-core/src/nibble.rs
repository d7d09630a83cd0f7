//! Legacy packed-byte payloads: Hamming(7,4) per nibble.
//!
//! Each byte becomes two 7-bit codewords (high nibble first), the bit stream
//! is packed MSB first and zero-padded to a byte boundary. This is the payload
//! of the older length-prefixed binary transport; the chat relay itself uses
//! the whole-message code in [`crate::hamming`].
//!
//! Hamming(7,4) is the `m = 4` case of the general code, so the layout is the
//! same: `[p1, p2, d1, p4, d2, d3, d4]`.

use crate::bits::BitString;
use crate::hamming;

const CODEWORD_BITS: usize = 7;
const GROUP_BITS: usize = 2 * CODEWORD_BITS;

/// Encode the low 4 bits of `nibble` (d1 = bit 3).
pub fn encode_nibble(nibble: u8) -> [bool; CODEWORD_BITS] {
    let data: BitString = (0..4).rev().map(|i| (nibble >> i) & 1 == 1).collect();
    let code = hamming::encode_bits(&data);
    let mut out = [false; CODEWORD_BITS];
    for (slot, bit) in out.iter_mut().zip(code.iter()) {
        *slot = bit;
    }
    out
}

/// Decode one codeword. Returns the data nibble and the corrected position
/// (1..=7), or 0 when the codeword was clean.
pub fn decode_nibble(codeword: [bool; CODEWORD_BITS]) -> (u8, usize) {
    let mut code: BitString = codeword.into_iter().collect();
    let position = hamming::syndrome(&code);
    if position != 0 {
        code.flip(position - 1);
    }
    let nibble = hamming::data_bits(&code)
        .iter()
        .fold(0u8, |acc, bit| (acc << 1) | u8::from(bit));
    (nibble, position)
}

/// Encode bytes into packed Hamming(7,4) codewords, 14 bits per input byte.
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let bits: BitString = data
        .iter()
        .flat_map(|&byte| {
            let mut pair = encode_nibble(byte >> 4).to_vec();
            pair.extend(encode_nibble(byte & 0x0F));
            pair
        })
        .collect();
    bits.to_packed_bytes()
}

/// Decode packed Hamming(7,4) data. Returns the bytes and the absolute,
/// 1-indexed bit positions that were corrected. A trailing partial group
/// (padding) is ignored.
pub fn decode_bytes(encoded: &[u8]) -> (Vec<u8>, Vec<usize>) {
    let bits: Vec<bool> = BitString::from_bytes(encoded).iter().collect();
    let mut out = Vec::with_capacity(bits.len() / GROUP_BITS);
    let mut corrected = Vec::new();

    for (group, chunk) in bits.chunks_exact(GROUP_BITS).enumerate() {
        let base = group * GROUP_BITS;
        let mut high = [false; CODEWORD_BITS];
        let mut low = [false; CODEWORD_BITS];
        high.copy_from_slice(&chunk[..CODEWORD_BITS]);
        low.copy_from_slice(&chunk[CODEWORD_BITS..]);

        let (hi, hi_err) = decode_nibble(high);
        let (lo, lo_err) = decode_nibble(low);
        if hi_err != 0 {
            corrected.push(base + hi_err);
        }
        if lo_err != 0 {
            corrected.push(base + CODEWORD_BITS + lo_err);
        }
        out.push((hi << 4) | lo);
    }
    (out, corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_layout_matches_textbook() {
        // d = 1011 -> p1 = 0, p2 = 1, p4 = 0
        let code = encode_nibble(0b1011);
        assert_eq!(code, [false, true, true, false, false, true, true]);
    }

    #[test]
    fn every_single_flip_in_a_nibble_is_corrected() {
        for nibble in 0u8..16 {
            let clean = encode_nibble(nibble);
            assert_eq!(decode_nibble(clean), (nibble, 0));
            for pos in 0..7 {
                let mut code = clean;
                code[pos] = !code[pos];
                assert_eq!(decode_nibble(code), (nibble, pos + 1));
            }
        }
    }

    #[test]
    fn bytes_roundtrip_and_size() {
        let data = b"Hello";
        let encoded = encode_bytes(data);
        // 5 bytes * 14 bits = 70 bits -> 9 bytes
        assert_eq!(encoded.len(), 9);
        let (decoded, corrected) = decode_bytes(&encoded);
        assert_eq!(decoded, data);
        assert!(corrected.is_empty());
    }

    #[test]
    fn flipped_bit_reported_at_absolute_position() {
        let mut encoded = encode_bytes(b"Hi");
        // bit 10 of the stream (1-indexed), second codeword of the first byte
        encoded[1] ^= 0b0100_0000;
        let (decoded, corrected) = decode_bytes(&encoded);
        assert_eq!(decoded, b"Hi");
        assert_eq!(corrected, vec![10]);
    }

    #[test]
    fn empty_input() {
        assert!(encode_bytes(&[]).is_empty());
        assert_eq!(decode_bytes(&[]), (vec![], vec![]));
    }
}
