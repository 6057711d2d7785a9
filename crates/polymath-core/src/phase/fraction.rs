//! Ratio bookkeeping for the phase wrapper
//!
//! Everything here is derived once when the ratio changes so the per-sample
//! path only multiplies and adds.

use crate::error::PhaseError;

/// Greatest common divisor
pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple (0 if either term is 0)
pub fn lcm(a: u32, b: u32) -> u32 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}

/// Precomputed constants for one `numerator/denominator` ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionState {
    numerator: u32,
    denominator: u32,
    swapped: bool,
    /// Ramp multiplier, `numerator / denominator`
    in_mult: f64,
    /// Inverse multiplier, `denominator / numerator`
    de_norm: f64,
    /// Sub-cycles before the remapped ramp realigns with the input
    lcm: u32,
    /// Carry added per input wrap (fractional part of `in_mult`)
    increment: f64,
}

impl FractionState {
    /// Derive the constants for `numerator/denominator`
    ///
    /// With `swap` the terms are exchanged first. Both terms must be > 0.
    pub fn new(numerator: u32, denominator: u32, swap: bool) -> Result<Self, PhaseError> {
        if numerator == 0 || denominator == 0 {
            return Err(PhaseError::NonPositiveRatio {
                numerator,
                denominator,
            });
        }
        let (numerator, denominator) = if swap {
            (denominator, numerator)
        } else {
            (numerator, denominator)
        };

        let lcm = lcm(numerator, denominator);
        let nu_mult = (lcm / denominator) as f64;
        let in_mult = numerator as f64 * nu_mult / lcm as f64;
        let whole = in_mult.floor();
        let carry = if in_mult > whole { 1.0 } else { 0.0 };
        let increment = 1.0 - (whole + carry - in_mult);

        Ok(Self {
            numerator,
            denominator,
            swapped: swap,
            in_mult,
            de_norm: 1.0 / in_mult,
            lcm,
            increment,
        })
    }

    /// Effective numerator (after swapping)
    #[inline]
    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    /// Effective denominator (after swapping)
    #[inline]
    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    #[inline]
    pub fn swapped(&self) -> bool {
        self.swapped
    }

    #[inline]
    pub fn in_mult(&self) -> f64 {
        self.in_mult
    }

    #[inline]
    pub fn de_norm(&self) -> f64 {
        self.de_norm
    }

    #[inline]
    pub fn lcm(&self) -> u32 {
        self.lcm
    }

    #[inline]
    pub fn increment(&self) -> f64 {
        self.increment
    }

    /// Whether the remapped ramp runs at least as fast as the input
    #[inline]
    pub fn expands(&self) -> bool {
        self.numerator >= self.denominator
    }
}

impl Default for FractionState {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
            swapped: false,
            in_mult: 1.0,
            de_norm: 1.0,
            lcm: 4,
            increment: 1.0,
        }
    }
}
