//! Phase remapper - ratio-scaled ramp that stays aligned across wraps
//!
//! The input ramp is multiplied by `numerator/denominator`. Each time the
//! input wraps, a sub-cycle counter advances modulo `lcm(num, den)` and the
//! fractional carry `counter * increment` is added back, so the remapped
//! ramp keeps running smoothly instead of restarting at every input cycle.
//!
//! ```text
//! input  /|/|/|/|          3/2:  /|/ /|/ /|/        (three output cycles
//!                                 realign with every two input cycles)
//! ```

use serde::{Deserialize, Serialize};

use crate::config::PhaseConfig;
use crate::error::PhaseError;
use crate::types::Sample;

use super::fraction::FractionState;

/// Output rescaling applied after wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenormMode {
    /// Wrapped phase as is
    #[default]
    Raw,
    /// Scale by whichever of `in_mult` and `1/in_mult` is ≥ 1
    Expand,
    /// Scale by whichever of `in_mult` and `1/in_mult` is ≤ 1
    Contract,
    /// Reset on every wrap and clamp the output to 1
    Clamped,
}

impl DenormMode {
    pub fn from_code(code: u8) -> Result<Self, PhaseError> {
        match code {
            0 => Ok(DenormMode::Raw),
            1 => Ok(DenormMode::Expand),
            2 => Ok(DenormMode::Contract),
            3 => Ok(DenormMode::Clamped),
            other => Err(PhaseError::InvalidMode(other)),
        }
    }
}

/// Ratio-scaled phase generator driven by an input ramp
#[derive(Debug, Clone)]
pub struct PhaseRemapper {
    fraction: FractionState,
    /// Terms as the host gave them, before any swap
    requested: (u32, u32),
    mode: DenormMode,
    /// Re-align on the next wrap once a re-normalise is armed
    wait_phase: bool,
    renorm_pending: bool,
    reset_next: bool,
    cycle: u32,
    offset: f64,
    prev: f64,
}

impl PhaseRemapper {
    pub fn new() -> Self {
        Self {
            fraction: FractionState::default(),
            requested: (4, 4),
            mode: DenormMode::default(),
            wait_phase: false,
            renorm_pending: false,
            reset_next: false,
            cycle: 0,
            offset: 0.0,
            prev: 0.0,
        }
    }

    pub fn from_config(config: &PhaseConfig) -> Result<Self, PhaseError> {
        let mut remapper = Self::new();
        remapper.set_fraction(config.numerator, config.denominator, Some(config.swap))?;
        remapper.set_de_normalize(config.de_normalize);
        remapper.set_wait_phase(config.wait_phase);
        Ok(remapper)
    }

    #[inline]
    pub fn fraction(&self) -> &FractionState {
        &self.fraction
    }

    #[inline]
    pub fn mode(&self) -> DenormMode {
        self.mode
    }

    /// Current sub-cycle offset
    #[inline]
    pub fn offset(&self) -> f32 {
        self.offset as f32
    }

    #[inline]
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Change the ratio
    ///
    /// `swap` updates the persistent swap flag when given. An invalid ratio
    /// leaves the previous one in place. With `wait_phase` set the counter
    /// re-aligns at the next wrap.
    pub fn set_fraction(
        &mut self,
        numerator: u32,
        denominator: u32,
        swap: Option<bool>,
    ) -> Result<(), PhaseError> {
        let swap = swap.unwrap_or(self.fraction.swapped());
        let fraction = FractionState::new(numerator, denominator, swap)?;
        self.fraction = fraction;
        self.requested = (numerator, denominator);
        self.renorm_pending = true;
        log::debug!(
            "phase: ratio {}/{} (in_mult {:.4}, lcm {})",
            fraction.numerator(),
            fraction.denominator(),
            fraction.in_mult(),
            fraction.lcm()
        );
        Ok(())
    }

    /// Toggle the swap flag, re-deriving the current ratio
    pub fn set_swap(&mut self, swap: bool) {
        if swap == self.fraction.swapped() {
            return;
        }
        let (n, d) = self.requested;
        if let Ok(fraction) = FractionState::new(n, d, swap) {
            self.fraction = fraction;
            self.renorm_pending = true;
        }
    }

    pub fn set_de_normalize(&mut self, mode: DenormMode) {
        let was_clamped = self.mode == DenormMode::Clamped;
        let is_clamped = mode == DenormMode::Clamped;
        if is_clamped && !was_clamped {
            self.cycle = 0;
            self.offset = 0.0;
            self.renorm_pending = false;
        } else if was_clamped && !is_clamped {
            self.renorm_pending = true;
        }
        self.mode = mode;
    }

    pub fn set_wait_phase(&mut self, wait: bool) {
        self.wait_phase = wait;
    }

    /// Restart the sub-cycle counter at the next wrap
    pub fn reset_next_phase(&mut self) {
        self.reset_next = true;
    }

    /// Remap one block; returns the sub-cycle offset at the end of the block
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) -> f32 {
        for (x, out) in input.iter().zip(output.iter_mut()) {
            *out = self.process_sample(*x);
        }
        self.offset as f32
    }

    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let f = self.fraction;
        let clamped = self.mode == DenormMode::Clamped && f.expands();
        let scaled = input as f64 * f.in_mult();

        if scaled < self.prev {
            if self.wait_phase && self.renorm_pending {
                self.restart();
                self.renorm_pending = false;
            } else if self.reset_next {
                self.restart();
                self.reset_next = false;
            } else if clamped {
                self.restart();
            } else {
                let lcm = f.lcm().max(1);
                self.cycle = (self.cycle + 1) % lcm;
                let carry = self.cycle as f64 * f.increment();
                self.offset = carry - carry.floor();
            }
        }
        self.prev = scaled;

        let shifted = scaled + self.offset;
        let wrapped = if clamped {
            shifted.min(1.0)
        } else {
            shifted - shifted.floor()
        };

        let out = if f.expands() {
            match self.mode {
                DenormMode::Raw => wrapped,
                DenormMode::Expand => wrapped * f.in_mult(),
                DenormMode::Contract | DenormMode::Clamped => wrapped * f.de_norm(),
            }
        } else {
            match self.mode {
                DenormMode::Raw => wrapped,
                DenormMode::Expand => wrapped * f.de_norm(),
                DenormMode::Contract => wrapped * f.in_mult(),
                DenormMode::Clamped => (wrapped * f.de_norm()).min(1.0),
            }
        };
        out as Sample
    }

    fn restart(&mut self) {
        self.cycle = 0;
        self.offset = 0.0;
    }
}

impl Default for PhaseRemapper {
    fn default() -> Self {
        Self::new()
    }
}
