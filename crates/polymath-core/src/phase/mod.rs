//! Phase wrapper
//!
//! Turns a host ramp into a ratio-scaled ramp. Independent of the sequencer:
//! it shares only the sample type and the config layer.

mod fraction;
mod remapper;

pub use fraction::{gcd, lcm, FractionState};
pub use remapper::{DenormMode, PhaseRemapper};
