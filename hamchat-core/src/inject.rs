//! Relay-side bit error injection, used to exercise the correction path.

use rand::seq::index;
use rand::Rng;

use crate::bits::BitString;

/// What the injector did to one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionKind {
    None,
    Single,
    Double,
}

/// Diagnostics for one forwarded payload. Never sent to peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRecord {
    pub kind: InjectionKind,
    /// 1-indexed, ascending.
    pub positions: Vec<usize>,
}

impl InjectionRecord {
    pub fn clean() -> Self {
        Self {
            kind: InjectionKind::None,
            positions: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.kind == InjectionKind::None
    }
}

/// Flips one or two random bits per payload.
///
/// The double-error roll comes first; the single-error roll only happens if it
/// did not fire. Payloads shorter than two bits skip the double roll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorInjector {
    p_single: f64,
    p_double: f64,
}

impl ErrorInjector {
    pub fn new(p_single: f64, p_double: f64) -> Result<Self, InjectorError> {
        check_probability("p_single", p_single)?;
        check_probability("p_double", p_double)?;
        Ok(Self { p_single, p_double })
    }

    /// Never touches a payload.
    pub fn disabled() -> Self {
        Self {
            p_single: 0.0,
            p_double: 0.0,
        }
    }

    pub fn p_single(&self) -> f64 {
        self.p_single
    }

    pub fn p_double(&self) -> f64 {
        self.p_double
    }

    /// Possibly corrupt `codeword` in place.
    pub fn inject<R: Rng>(&self, codeword: &mut BitString, rng: &mut R) -> InjectionRecord {
        let len = codeword.len();
        if len >= 2 && rng.gen_bool(self.p_double) {
            let mut positions: Vec<usize> = index::sample(rng, len, 2)
                .into_iter()
                .map(|i| i + 1)
                .collect();
            positions.sort_unstable();
            flip_positions(codeword, &positions);
            return InjectionRecord {
                kind: InjectionKind::Double,
                positions,
            };
        }
        if len >= 1 && rng.gen_bool(self.p_single) {
            let position = rng.gen_range(0..len) + 1;
            flip_positions(codeword, &[position]);
            return InjectionRecord {
                kind: InjectionKind::Single,
                positions: vec![position],
            };
        }
        InjectionRecord::clean()
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), InjectorError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InjectorError::Probability { name, value })
    }
}

/// Flip the given 1-indexed positions. Out-of-range positions are skipped and returned.
pub fn flip_positions(codeword: &mut BitString, positions: &[usize]) -> Vec<usize> {
    positions
        .iter()
        .copied()
        .filter(|&pos| pos == 0 || !codeword.flip(pos - 1))
        .collect()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InjectorError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
}
