//! Phase wrapper settings

use serde::{Deserialize, Serialize};

use crate::phase::DenormMode;

/// Startup state of a [`PhaseRemapper`](crate::phase::PhaseRemapper)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub numerator: u32,
    pub denominator: u32,
    /// Exchange numerator and denominator
    pub swap: bool,
    pub de_normalize: DenormMode,
    /// Re-align the sub-cycle counter at the wrap after a ratio or mode change
    pub wait_phase: bool,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
            swap: false,
            de_normalize: DenormMode::Raw,
            wait_phase: false,
        }
    }
}
