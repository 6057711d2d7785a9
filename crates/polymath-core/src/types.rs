//! Common types for polymath
//!
//! Capacity constants, rhythmic fractions and the addressing types shared by
//! the sequence tables, the transport and the command queue.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of sequence slots
pub const SLOTS: usize = 128;

/// Number of derived variations stored per slot (the original is not counted)
pub const VARIATIONS: usize = 6;

/// Maximum number of events in one sequence
pub const MAXSEQ: usize = 2048;

/// Maximum number of groups in one sequence
pub const GROUPS: usize = 256;

/// Number of accent channels carried by every event
pub const ACCENT_CHANNELS: usize = 8;

/// Ramp sample type (32-bit float, matching the host signal format)
pub type Sample = f32;

/// A rhythmic ratio: `numerator` events of length `1/denominator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Both terms must be strictly positive to describe a group
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Phase length of the whole fraction
    #[inline]
    pub fn size(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Convert a pair of host floats, truncating toward zero
    ///
    /// Negative or non-finite terms map to zero so they fail [`Fraction::is_valid`]
    /// and get reported by the builder rather than wrapping around.
    pub fn from_host(numerator: f32, denominator: f32) -> Self {
        Self {
            numerator: host_count(numerator),
            denominator: host_count(denominator),
        }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

fn host_count(value: f32) -> u32 {
    if value.is_finite() && value > 0.0 {
        value as u32
    } else {
        0
    }
}

/// Address of one sequence inside the bank
///
/// Variation 0 is the slot's original sequence; 1..=VARIATIONS are the
/// derived copies built by scrambling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceRef {
    pub slot: usize,
    pub variation: usize,
}

impl SequenceRef {
    pub const fn new(slot: usize, variation: usize) -> Self {
        Self { slot, variation }
    }

    /// The original sequence of `slot`
    pub const fn original(slot: usize) -> Self {
        Self { slot, variation: 0 }
    }

    #[inline]
    pub fn is_original(&self) -> bool {
        self.variation == 0
    }
}

impl fmt::Display for SequenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_original() {
            write!(f, "slot {}", self.slot)
        } else {
            write!(f, "slot {} variation {}", self.slot, self.variation)
        }
    }
}

/// One accent channel: a parameter value and an event value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccentPair {
    pub param: f32,
    pub event: f32,
}

impl AccentPair {
    /// Value of a channel that was never written
    pub const UNSET: AccentPair = AccentPair {
        param: -1.0,
        event: 0.0,
    };

    /// Value written by a slot initialisation
    pub const ZERO: AccentPair = AccentPair {
        param: 0.0,
        event: 0.0,
    };
}

impl Default for AccentPair {
    fn default() -> Self {
        Self::UNSET
    }
}

/// Table dimensions, fixed for the lifetime of a bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capacity {
    pub slots: usize,
    pub variations: usize,
    pub max_events: usize,
    pub max_groups: usize,
}

impl Capacity {
    /// Original plus variations
    #[inline]
    pub fn sequences_per_slot(&self) -> usize {
        self.variations + 1
    }

    /// Total number of addressable sequences
    #[inline]
    pub fn sequence_count(&self) -> usize {
        self.slots * self.sequences_per_slot()
    }

    /// Linear index of a sequence in header-sized arrays
    #[inline]
    pub fn sequence_index(&self, seq: SequenceRef) -> usize {
        seq.slot * self.sequences_per_slot() + seq.variation
    }

    #[inline]
    pub fn contains(&self, seq: SequenceRef) -> bool {
        seq.slot < self.slots && seq.variation <= self.variations
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            slots: SLOTS,
            variations: VARIATIONS,
            max_events: MAXSEQ,
            max_groups: GROUPS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_from_host_truncates() {
        assert_eq!(Fraction::from_host(3.9, 8.0), Fraction::new(3, 8));
        assert!(!Fraction::from_host(-2.0, 4.0).is_valid());
        assert!(!Fraction::from_host(f32::NAN, 4.0).is_valid());
    }

    #[test]
    fn test_sequence_index_is_unique() {
        let cap = Capacity {
            slots: 3,
            variations: 2,
            max_events: 4,
            max_groups: 2,
        };
        let mut seen = std::collections::HashSet::new();
        for slot in 0..cap.slots {
            for variation in 0..=cap.variations {
                assert!(seen.insert(cap.sequence_index(SequenceRef::new(slot, variation))));
            }
        }
        assert_eq!(seen.len(), cap.sequence_count());
    }

    #[test]
    fn test_unset_accent() {
        let pair = AccentPair::default();
        assert_eq!(pair.param, -1.0);
        assert_eq!(pair.event, 0.0);
    }
}
