//! Systematic Hamming SEC code over arbitrary-length bit strings.
//!
//! Positions are 1-indexed. Powers of two (1, 2, 4, 8, ...) hold parity bits,
//! every other position holds a data bit in ascending order. A codeword of
//! `m` data bits carries `r = required_parity_bits(m)` parity bits.
//!
//! Decoding cross-checks the parity count *present* in a codeword of length `n`
//! (powers of two <= n) against the count `encode` would have *required* for
//! the implied `m`; a mismatch means no encoder could have produced that length.
//!
//! Two flipped bits are not detected reliably: their syndrome is the XOR of
//! the two positions, which either points past the end of the codeword
//! ([`DecodeError::Unrepairable`]) or at a third, innocent bit that gets
//! "corrected" and returned as a normal single-bit fix.

use tracing::debug;

use crate::bits::BitString;

/// Smallest `r >= 1` with `2^r >= m + r + 1`. For `m == 0` this is 2, so the
/// empty message still has a non-empty codeword ("00").
pub fn required_parity_bits(m: usize) -> usize {
    if m == 0 {
        return 2;
    }
    let mut r = 1;
    while (1usize << r) < m + r + 1 {
        r += 1;
    }
    r
}

/// Number of parity positions in a codeword of length `n`: the powers of two <= n.
pub fn parity_bits_present(n: usize) -> usize {
    (usize::BITS - n.leading_zeros()) as usize
}

/// Encode the UTF-8 bytes of `message`.
pub fn encode(message: &str) -> BitString {
    encode_bits(&BitString::from_text(message))
}

/// Encode an arbitrary data bit string into `m + required_parity_bits(m)` bits.
pub fn encode_bits(data: &BitString) -> BitString {
    let m = data.len();
    let r = required_parity_bits(m);
    let n = m + r;
    let mut code = BitString::zeros(n);

    let mut data_bits = data.iter();
    for pos in (1..=n).filter(|p| !p.is_power_of_two()) {
        if let Some(bit) = data_bits.next() {
            code.set(pos - 1, bit);
        }
    }

    for i in 0..r {
        let parity_pos = 1usize << i;
        let value = parity_over(&code, parity_pos, Some(parity_pos));
        code.set(parity_pos - 1, value);
    }
    code
}

/// XOR of every bit whose 1-indexed position has `mask` set, optionally skipping one position.
fn parity_over(code: &BitString, mask: usize, skip: Option<usize>) -> bool {
    code.iter()
        .enumerate()
        .map(|(i, bit)| (i + 1, bit))
        .filter(|&(pos, _)| pos & mask != 0 && Some(pos) != skip)
        .fold(false, |acc, (_, bit)| acc ^ bit)
}

/// Syndrome over the parity checks present in `codeword`: 0 when every check
/// passes, otherwise the sum of `2^i` over failing checks `i`.
pub fn syndrome(codeword: &BitString) -> usize {
    let r = parity_bits_present(codeword.len());
    (0..r)
        .map(|i| 1usize << i)
        .filter(|&mask| parity_over(codeword, mask, None))
        .sum()
}

/// Data bits of a codeword (every non-power-of-two position, ascending).
pub(crate) fn data_bits(codeword: &BitString) -> BitString {
    codeword
        .iter()
        .enumerate()
        .filter(|(i, _)| !(i + 1).is_power_of_two())
        .map(|(_, bit)| bit)
        .collect()
}

/// Successful decode. `error_position` is set when a single bit was flipped back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub message: String,
    pub syndrome: usize,
    pub error_position: Option<usize>,
}

impl Decoded {
    pub fn error_detected(&self) -> bool {
        self.syndrome != 0
    }

    pub fn error_corrected(&self) -> bool {
        self.error_position.is_some()
    }

    /// Always true: anything unrepairable comes back as a [`DecodeError`].
    pub fn repairable(&self) -> bool {
        true
    }
}

/// Decode a codeword, correcting at most one flipped bit.
///
/// Data bytes are turned back into text lossily, so a miscorrected double
/// error still yields a (wrong) message instead of failing.
pub fn decode(codeword: &BitString) -> Result<Decoded, DecodeError> {
    let n = codeword.len();
    if n == 0 {
        return Err(DecodeError::EmptyInput);
    }

    let present = parity_bits_present(n);
    let m = n
        .checked_sub(present)
        .ok_or(DecodeError::StructurallyInvalid {
            len: n,
            present,
            required: None,
        })?;
    let required = required_parity_bits(m);
    if required != present {
        debug!(len = n, present, required, "codeword length cannot come from encode");
        return Err(DecodeError::StructurallyInvalid {
            len: n,
            present,
            required: Some(required),
        });
    }

    let syndrome = syndrome(codeword);
    let mut corrected = codeword.clone();
    let error_position = match syndrome {
        0 => None,
        s if s <= n => {
            corrected.flip(s - 1);
            debug!(position = s, len = n, "corrected single-bit error");
            Some(s)
        }
        s => {
            debug!(syndrome = s, len = n, "syndrome outside codeword");
            return Err(DecodeError::Unrepairable { syndrome: s, len: n });
        }
    };

    let data = data_bits(&corrected);
    let bytes = data
        .to_bytes()
        .ok_or(DecodeError::Alignment { bits: data.len() })?;
    Ok(Decoded {
        message: String::from_utf8_lossy(&bytes).into_owned(),
        syndrome,
        error_position,
    })
}

/// Why a codeword could not be decoded. None of these are repairable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty codeword")]
    EmptyInput,
    #[error("invalid code structure: length {len} has {present} parity bits, expected {required:?}")]
    StructurallyInvalid {
        len: usize,
        present: usize,
        required: Option<usize>,
    },
    #[error("syndrome {syndrome} out of bounds for codeword length {len}")]
    Unrepairable { syndrome: usize, len: usize },
    #[error("{bits} data bits do not form whole bytes")]
    Alignment { bits: usize },
}

impl DecodeError {
    pub fn is_repairable(&self) -> bool {
        false
    }

    /// Syndrome when one was computed before giving up.
    pub fn syndrome(&self) -> Option<usize> {
        match self {
            DecodeError::Unrepairable { syndrome, .. } => Some(*syndrome),
            _ => None,
        }
    }
}
