//! Sequencer error types

use std::fmt;

use thiserror::Error;

use crate::types::Fraction;

/// Stage of the variation pipeline that rejected a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Copy,
    SwapList,
    Scramble,
    Regroup,
    Offsets,
}

impl BuildPhase {
    pub fn name(&self) -> &'static str {
        match self {
            BuildPhase::Copy => "copy",
            BuildPhase::SwapList => "swap-list",
            BuildPhase::Scramble => "scramble",
            BuildPhase::Regroup => "regroup",
            BuildPhase::Offsets => "offsets",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors reported by control-path sequencer operations
///
/// None of these ever cross into the audio path: a failed command leaves the
/// engine state as it was (or marks a half-built variation unusable).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequencerError {
    #[error("slot must be a whole number from 0 to {max}, got {slot}")]
    InvalidSlot { slot: usize, max: usize },

    #[error("variation must be 0 (the original) or a whole number from 1 to {max}, got {variation}")]
    InvalidVariation { variation: usize, max: usize },

    #[error("cannot {action} the original")]
    OriginalProtected { action: &'static str },

    #[error("slot {slot} variation {variation} has not been filled yet")]
    Unfilled { slot: usize, variation: usize },

    #[error("values not greater than 0: {0}")]
    NonPositiveFraction(Fraction),

    #[error("{what} capacity of {limit} exceeded")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("group must exist in sequence (group {group}, sequence has {groups})")]
    MissingGroup { group: usize, groups: usize },

    #[error("location is after the group (location {location}, group has {events} events)")]
    LocationAfterGroup { location: usize, events: usize },

    #[error("join length must be greater than 0")]
    EmptyJoin,

    #[error("location + length is greater than the numerator ({end} > {events})")]
    JoinOverrun { end: usize, events: usize },

    #[error("joins total is not equal to numerator ({total} != {expected})")]
    JoinTotalMismatch { total: usize, expected: usize },

    #[error("group rows cover {covered} of {numerator} subdivisions")]
    GroupCoverage { covered: u32, numerator: u32 },

    #[error("{phase} failed at event {index}")]
    BuildFailed { phase: BuildPhase, index: usize },

    #[error("groupScramble mode {0}: not yet implemented")]
    NotImplemented(u8),

    #[error("unknown group scramble mode {0}")]
    UnknownMode(u8),

    #[error("unknown field code {0}")]
    UnknownField(i32),

    #[error("accent channel must be from 1 to 8, got {0}")]
    InvalidAccentChannel(usize),

    #[error("bpm must be a positive number")]
    InvalidBpm,

    #[error("cannot move an element beyond the sequence (length {len}, location {location}, shift {shift})")]
    MoveOutOfRange {
        len: usize,
        location: usize,
        shift: isize,
    },
}

/// Result type for sequencer control operations
pub type SequencerResult<T> = Result<T, SequencerError>;

/// Errors reported by the phase wrapper
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhaseError {
    #[error("values not greater than 0: {numerator}/{denominator}")]
    NonPositiveRatio { numerator: u32, denominator: u32 },

    #[error("de-normalize mode must be 0, 1, 2 or 3, got {0}")]
    InvalidMode(u8),
}
