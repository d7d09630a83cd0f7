//! Bit strings: text to bits (8 bits per byte, MSB first), the ASCII '0'/'1'
//! rendering used on the wire, and MSB-first packing into bytes.

use std::fmt;
use std::str::FromStr;

use bitvec::prelude::*;

/// Ordered sequence of bits. Indexing is 0-based; the Hamming code talks about
/// 1-based positions and converts at its boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitString(BitVec<u8, Msb0>);

impl BitString {
    pub fn new() -> Self {
        Self(BitVec::new())
    }

    /// `len` zero bits.
    pub fn zeros(len: usize) -> Self {
        Self(BitVec::repeat(false, len))
    }

    /// Every byte expanded to 8 bits, most significant bit first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BitVec::from_slice(bytes))
    }

    /// UTF-8 bytes of `text`, 8 bits each. Length is always a multiple of 8.
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Inverse of [`to_packed_bytes`](Self::to_packed_bytes): keep the first `bit_len` bits of `bytes`.
    pub fn from_packed_bytes(bytes: &[u8], bit_len: usize) -> Result<Self, ParseBitsError> {
        let mut bits = BitVec::<u8, Msb0>::from_slice(bytes);
        if bit_len > bits.len() {
            return Err(ParseBitsError::TooShort {
                needed: bit_len,
                available: bits.len(),
            });
        }
        bits.truncate(bit_len);
        Ok(Self(bits))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.0.get(index).map(|bit| *bit)
    }

    /// Panics if `index` is out of range, like slice indexing.
    pub fn set(&mut self, index: usize, value: bool) {
        self.0.set(index, value);
    }

    pub fn push(&mut self, value: bool) {
        self.0.push(value);
    }

    /// Invert the bit at `index`. Returns false (and changes nothing) if out of range.
    pub fn flip(&mut self, index: usize) -> bool {
        match self.0.get_mut(index) {
            Some(mut bit) => {
                *bit = !*bit;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().by_vals()
    }

    /// Group into bytes, MSB first. `None` unless the length is a multiple of 8.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.0.len() % 8 != 0 {
            return None;
        }
        Some(
            self.0
                .chunks(8)
                .map(|chunk| {
                    chunk
                        .iter()
                        .by_vals()
                        .fold(0u8, |acc, bit| (acc << 1) | u8::from(bit))
                })
                .collect(),
        )
    }

    /// Pack MSB first, zero-padding the final byte.
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let mut bits = self.0.clone();
        bits.resize(self.0.len().div_ceil(8) * 8, false);
        bits.into_vec()
    }
}

impl FromIterator<bool> for BitString {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for BitString {
    type Err = ParseBitsError;

    /// Parse the ASCII rendering; anything other than '0' or '1' is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .enumerate()
            .map(|(index, c)| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                found => Err(ParseBitsError::InvalidDigit { index, found }),
            })
            .collect()
    }
}

/// Error building a bit string from text or packed bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseBitsError {
    #[error("invalid bit {found:?} at index {index}")]
    InvalidDigit { index: usize, found: char },
    #[error("need {needed} bits but only {available} available")]
    TooShort { needed: usize, available: usize },
}
