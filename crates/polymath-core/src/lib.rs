//! Polymath Core - isorhythmic phase remapping and polyrhythmic sequencing

pub mod config;
pub mod engine;
pub mod error;
pub mod phase;
pub mod sequence;
pub mod types;

pub use error::{PhaseError, SequencerError, SequencerResult};
pub use types::*;
