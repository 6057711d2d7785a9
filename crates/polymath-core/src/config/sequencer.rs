//! Sequencer settings
//!
//! Defaults reproduce a freshly created sequencer: 60 bpm, 80% preview
//! point, normalised event phase, single-channel output.

use serde::{Deserialize, Serialize};

use crate::sequence::{ScrambleMethod, DEFAULT_SIZE_FRAC, DEFAULT_SIZE_THRESHOLD};
use crate::types::{Capacity, ACCENT_CHANNELS};

/// Default tempo
pub const DEFAULT_BPM: f32 = 60.0;

/// Default upcoming-event preview point, in percent of the current event
pub const DEFAULT_PRE_CHANGE_PERCENT: f32 = 80.0;

/// Beats per bar used for duration lists
const BEATS_PER_BAR: f32 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Smallest leftover phase that still gets its own remainder group
    pub size_threshold: f32,
    /// Share of the finest event size used by the auto threshold
    pub size_frac: f32,
    pub auto_threshold: bool,
    pub bpm: f32,
    /// Percent of the current event after which the next one is previewed
    pub pre_change_percent: f32,
    /// Alternate event phase between the main and alternate outputs
    pub alt_out: bool,
    /// Accent channels included in previews (1..=8)
    pub alt_len: usize,
    /// Normalise event phase to 0..1 (otherwise raw phase since event start)
    pub multiply: bool,
    pub scramble_method: ScrambleMethod,
    /// Scramble RNG seed; unset means seeded from the clock
    pub seed: Option<u64>,
    pub capacity: Capacity,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            size_frac: DEFAULT_SIZE_FRAC,
            auto_threshold: false,
            bpm: DEFAULT_BPM,
            pre_change_percent: DEFAULT_PRE_CHANGE_PERCENT,
            alt_out: false,
            alt_len: 1,
            multiply: true,
            scramble_method: ScrambleMethod::Unique,
            seed: None,
            capacity: Capacity::default(),
        }
    }
}

impl SequencerConfig {
    /// Preview point as a fraction of the event, clamped to 1..99 percent
    pub fn pre_change(&self) -> f32 {
        clamp_pre_change(self.pre_change_percent)
    }

    /// Accent channels carried by previews
    pub fn alt_len(&self) -> usize {
        self.alt_len.clamp(1, ACCENT_CHANNELS)
    }

    /// Bar length in milliseconds at the configured tempo
    ///
    /// A non-positive tempo falls back to the default.
    pub fn bar_ms(&self) -> f32 {
        bar_ms(self.bpm)
    }
}

/// Bar length in milliseconds, falling back to the default tempo
pub fn bar_ms(bpm: f32) -> f32 {
    let bpm = if bpm > 0.0 && bpm.is_finite() { bpm } else { DEFAULT_BPM };
    60_000.0 / bpm * BEATS_PER_BAR
}

/// Convert a preview percentage to a fraction of the event
pub fn clamp_pre_change(percent: f32) -> f32 {
    let percent = if percent.is_nan() {
        DEFAULT_PRE_CHANGE_PERCENT
    } else {
        percent.clamp(1.0, 99.0)
    };
    percent / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SequencerConfig::default();
        assert_eq!(config.bpm, 60.0);
        assert!(config.multiply);
        assert!(!config.alt_out);
        assert_eq!(config.capacity, Capacity::default());
        assert!((config.pre_change() - 0.8).abs() < 1e-6);
        assert_eq!(config.bar_ms(), 4000.0);
    }

    #[test]
    fn test_clamps() {
        let config = SequencerConfig {
            pre_change_percent: 150.0,
            alt_len: 20,
            bpm: -3.0,
            ..SequencerConfig::default()
        };
        assert!((config.pre_change() - 0.99).abs() < 1e-6);
        assert_eq!(config.alt_len(), 8);
        assert_eq!(config.bar_ms(), 4000.0);
        assert!((clamp_pre_change(0.0) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_yaml_uses_snake_case_method() {
        let config: SequencerConfig =
            serde_yaml::from_str("scramble_method: allow_repeats\nbpm: 120\n").unwrap();
        assert_eq!(config.scramble_method, ScrambleMethod::AllowRepeats);
        assert_eq!(config.bar_ms(), 2000.0);
        assert_eq!(config.size_frac, DEFAULT_SIZE_FRAC);
    }
}
