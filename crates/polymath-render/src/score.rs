//! YAML score: slots to build, a clock to drive them and timed cues
//!
//! ```yaml
//! sequencer: { bpm: 120, seed: 7 }
//! phase: { numerator: 3, denominator: 2 }
//! clock: { sample_rate: 48000, ramp_hz: 0.5, block_size: 64, seconds: 8 }
//! slots:
//!   - slot: 0
//!     groups: [[4, 4], [3, 8]]
//!     joins: [{ group: 0, location: 1, length: 2 }]
//!     variations: [{ variation: 1, probability: 0.5 }]
//! cues:
//!   - { at: 2.0, action: jump_to, slot: 0, variation: 1 }
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use polymath_core::config::{PhaseConfig, SequencerConfig};
use polymath_core::engine::{field_buffer, owned, SequencerCommand};
use polymath_core::sequence::{AccentEdit, GroupScrambleMode};
use polymath_core::{Capacity, Fraction};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Score {
    pub sequencer: SequencerConfig,
    /// Remap the clock ramp before it reaches the sequencer
    pub phase: Option<PhaseConfig>,
    pub clock: Clock,
    pub slots: Vec<SlotScore>,
    pub cues: Vec<Cue>,
}

/// Synthetic host ramp
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Clock {
    pub sample_rate: u32,
    /// Ramp cycles per second
    pub ramp_hz: f64,
    pub block_size: usize,
    pub seconds: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            ramp_hz: 0.5,
            block_size: 64,
            seconds: 8.0,
        }
    }
}

impl Clock {
    pub fn total_samples(&self) -> usize {
        (self.seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotScore {
    pub slot: usize,
    /// `[numerator, denominator]` pairs
    pub groups: Vec<[u32; 2]>,
    #[serde(default)]
    pub join_sets: Vec<JoinSet>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default)]
    pub accents: Vec<Accent>,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Join {
    pub group: usize,
    pub location: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinSet {
    pub group: usize,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Accent {
    pub step: usize,
    /// 1-based
    pub channel: usize,
    pub param: Option<f32>,
    pub event: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Variation {
    pub variation: usize,
    #[serde(default = "default_probability")]
    pub probability: f32,
    /// Build by group derangement of this source instead of an event scramble
    pub group_scramble: Option<usize>,
}

fn default_probability() -> f32 {
    0.5
}

/// A command issued once the clock reaches `at` seconds
#[derive(Debug, Clone, Deserialize)]
pub struct Cue {
    pub at: f64,
    #[serde(flatten)]
    pub action: CueAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CueAction {
    JumpTo {
        slot: usize,
        #[serde(default)]
        variation: usize,
    },
    JumpNext {
        slot: usize,
        #[serde(default)]
        variation: usize,
    },
    ResetPhase,
    Bpm { value: f32 },
    GetSequence {
        slot: usize,
        #[serde(default)]
        variation: usize,
        code: i32,
    },
}

impl CueAction {
    /// `capacity` sizes the reply buffer of a read-back
    pub fn command(&self, capacity: &Capacity) -> SequencerCommand {
        match *self {
            CueAction::JumpTo { slot, variation } => SequencerCommand::JumpTo { slot, variation },
            CueAction::JumpNext { slot, variation } => SequencerCommand::JumpNext { slot, variation },
            CueAction::ResetPhase => SequencerCommand::ResetPhase,
            CueAction::Bpm { value } => SequencerCommand::SetBpm(value),
            CueAction::GetSequence {
                slot,
                variation,
                code,
            } => SequencerCommand::GetSequence {
                slot,
                variation,
                code,
                values: field_buffer(capacity),
            },
        }
    }
}

impl Score {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read score: {:?}", path))?;
        let mut score: Score = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse score: {:?}", path))?;
        score.validate()?;
        score.cues.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(score)
    }

    fn validate(&self) -> Result<()> {
        if self.clock.sample_rate == 0 {
            bail!("clock.sample_rate must be greater than 0");
        }
        if self.clock.block_size == 0 {
            bail!("clock.block_size must be greater than 0");
        }
        if !(self.clock.ramp_hz > 0.0) {
            bail!("clock.ramp_hz must be greater than 0");
        }
        Ok(())
    }

    /// Commands that build every slot, in score order
    ///
    /// Per slot: groups, accents, join sets, joins, then variations, so
    /// variations see the finished original.
    pub fn setup_commands(&self) -> Result<Vec<SequencerCommand>> {
        let mut commands = Vec::new();
        for slot in &self.slots {
            let pairs = slot
                .groups
                .iter()
                .map(|[n, d]| Fraction::new(*n, *d))
                .collect::<Vec<_>>();
            commands.push(SequencerCommand::SetGroups {
                slot: slot.slot,
                pairs: owned(pairs),
            });

            for accent in &slot.accents {
                let edit = match (accent.param, accent.event) {
                    (Some(param), Some(event)) => AccentEdit::Both { param, event },
                    (Some(param), None) => AccentEdit::ParamOnly(param),
                    (None, Some(event)) => AccentEdit::EventOnly(event),
                    (None, None) => bail!(
                        "slot {} accent at step {} sets neither param nor event",
                        slot.slot,
                        accent.step
                    ),
                };
                commands.push(SequencerCommand::SetAccent {
                    slot: slot.slot,
                    step: accent.step,
                    channel: accent.channel,
                    edit,
                });
            }

            for set in &slot.join_sets {
                commands.push(SequencerCommand::SetJoins {
                    slot: slot.slot,
                    group: set.group,
                    counts: owned(set.counts.clone()),
                });
            }

            for join in &slot.joins {
                commands.push(SequencerCommand::MakeJoin {
                    slot: slot.slot,
                    group: join.group,
                    location: join.location,
                    length: join.length,
                });
            }

            for variation in &slot.variations {
                commands.push(match variation.group_scramble {
                    Some(source) => SequencerCommand::GroupScramble {
                        slot: slot.slot,
                        source,
                        dest: variation.variation,
                        mode: GroupScrambleMode::Derangement,
                    },
                    None => SequencerCommand::Scramble {
                        slot: slot.slot,
                        variation: variation.variation,
                        probability: variation.probability,
                    },
                });
            }
        }
        Ok(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCORE: &str = r#"
sequencer:
  bpm: 120
  seed: 3
clock:
  sample_rate: 1000
  ramp_hz: 1
slots:
  - slot: 0
    groups: [[4, 4], [3, 8]]
    join_sets: [{ group: 1, counts: [2, 1] }]
    joins: [{ group: 0, location: 1, length: 2 }]
    accents: [{ step: 0, channel: 1, param: 0.5 }]
    variations:
      - { variation: 1 }
      - { variation: 2, group_scramble: 0 }
cues:
  - { at: 1.5, action: reset_phase }
  - { at: 0.5, action: jump_to, slot: 0, variation: 1 }
"#;

    fn write_score(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_sorts_cues_and_keeps_defaults() {
        let file = write_score(SCORE);
        let score = Score::load(file.path()).unwrap();
        assert_eq!(score.sequencer.bpm, 120.0);
        assert_eq!(score.sequencer.seed, Some(3));
        assert!(score.sequencer.multiply);
        assert_eq!(score.clock.block_size, 64);
        assert!(score.phase.is_none());
        assert_eq!(score.cues[0].at, 0.5);
        assert!(matches!(
            score.cues[0].action,
            CueAction::JumpTo { slot: 0, variation: 1 }
        ));
        assert!(matches!(score.cues[1].action, CueAction::ResetPhase));
    }

    #[test]
    fn test_setup_command_order() {
        let file = write_score(SCORE);
        let score = Score::load(file.path()).unwrap();
        let names: Vec<&str> = score
            .setup_commands()
            .unwrap()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(
            names,
            vec!["setGroups", "setAccent", "setJoins", "makeJoin", "scramble", "groupScramble"]
        );
    }

    #[test]
    fn test_empty_accent_is_rejected() {
        let file = write_score(
            "slots:\n  - slot: 0\n    groups: [[2, 2]]\n    accents: [{ step: 0, channel: 1 }]\n",
        );
        let score = Score::load(file.path()).unwrap();
        assert!(score.setup_commands().is_err());
    }

    #[test]
    fn test_invalid_clock_is_rejected() {
        let file = write_score("clock:\n  block_size: 0\n");
        let err = Score::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("block_size"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = Score::load(Path::new("/nonexistent/score.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read score"));
    }
}
