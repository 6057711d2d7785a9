//! Configuration for the sequencer and the phase wrapper
//!
//! Both configs are plain serde structs with `#[serde(default)]`, so a YAML
//! file only needs the keys it changes.
//!
//! ```ignore
//! use polymath_core::config::{load_config, SequencerConfig};
//!
//! let config: SequencerConfig = load_config(&path);
//! ```

mod io;
mod phase;
mod sequencer;

pub use io::{load_config, save_config};
pub use phase::PhaseConfig;
pub use sequencer::{bar_ms, clamp_pre_change, SequencerConfig, DEFAULT_BPM, DEFAULT_PRE_CHANGE_PERCENT};
