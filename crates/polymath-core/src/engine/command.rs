//! Lock-free command queue from the control side to the sequencer
//!
//! The host's control thread pushes [`SequencerCommand`] values into an
//! `rtrb` ring buffer; the audio callback drains it at the start of each
//! block through [`PolyMathEngine::process_commands`]. Table edits therefore
//! never run concurrently with the transport reading the same tables.
//!
//! Commands that carry lists wrap them in [`basedrop::Owned`], so dropping
//! the list after dispatch hands the deallocation to the collector thread
//! (see [`gc`](super::gc)) instead of freeing on the audio thread.
//!
//! ```ignore
//! let (mut tx, mut rx) = command_channel();
//! tx.push(SequencerCommand::JumpTo { slot: 2, variation: 0 })?;
//! engine.process_commands(&mut rx);
//! ```
//!
//! [`PolyMathEngine::process_commands`]: super::PolyMathEngine::process_commands

use basedrop::Owned;

use crate::sequence::{field_capacity, AccentEdit, GroupScrambleMode, ScrambleMethod};
use crate::types::{Capacity, Fraction};

/// Ring buffer size; commands are small and drained every block
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Control operations applied between audio blocks
pub enum SequencerCommand {
    // ─────────────────────────────────────────────────────────────
    // Slot building
    // ─────────────────────────────────────────────────────────────
    /// Rebuild a slot's original sequence from fractions
    SetGroups {
        slot: usize,
        pairs: Owned<Vec<Fraction>>,
    },
    /// Append one group, recomputing the remainder
    AddGroup { slot: usize, fraction: Fraction },
    /// Zero a slot and invalidate its variations
    InitSlot { slot: usize },

    // ─────────────────────────────────────────────────────────────
    // Joins
    // ─────────────────────────────────────────────────────────────
    MakeJoin {
        slot: usize,
        group: usize,
        location: usize,
        length: usize,
    },
    /// Re-partition a group into fused entries
    SetJoins {
        slot: usize,
        group: usize,
        counts: Owned<Vec<usize>>,
    },

    // ─────────────────────────────────────────────────────────────
    // Variations
    // ─────────────────────────────────────────────────────────────
    Scramble {
        slot: usize,
        variation: usize,
        probability: f32,
    },
    GroupScramble {
        slot: usize,
        source: usize,
        dest: usize,
        mode: GroupScrambleMode,
    },
    MoveEvent {
        slot: usize,
        variation: usize,
        location: usize,
        shift: isize,
    },

    // ─────────────────────────────────────────────────────────────
    // Accents
    // ─────────────────────────────────────────────────────────────
    /// Edit one accent channel (1-based) of an original-sequence event
    SetAccent {
        slot: usize,
        step: usize,
        channel: usize,
        edit: AccentEdit,
    },

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────
    /// Switch at the next musically aligned crossing point
    JumpTo { slot: usize, variation: usize },
    /// Switch when the current sequence ends
    JumpNext { slot: usize, variation: usize },
    /// Restart the current sequence at the next ramp wrap
    ResetPhase,

    // ─────────────────────────────────────────────────────────────
    // Read-back
    // ─────────────────────────────────────────────────────────────
    /// Report one table column (answered with `EngineReport::SequenceData`)
    ///
    /// `values` is filled in place and handed back in the report; create it
    /// with [`field_buffer`] so the read never allocates on the audio thread.
    GetSequence {
        slot: usize,
        variation: usize,
        code: i32,
        values: Vec<f32>,
    },

    // ─────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────
    SetBpm(f32),
    /// Preview point in percent (clamped to 1..99)
    SetPreChange(f32),
    /// 0 disables alternating output; 1..8 enables it with that many preview accents
    SetAltOut(usize),
    SetMultiply(bool),
    SetScrambleMethod(ScrambleMethod),
    SetSizeThreshold(f32),
    SetSizeFrac(f32),
    SetAutoThreshold(bool),
}

impl SequencerCommand {
    /// Host-facing command name, used in failure reports
    pub fn name(&self) -> &'static str {
        match self {
            SequencerCommand::SetGroups { .. } => "setGroups",
            SequencerCommand::AddGroup { .. } => "addGroup",
            SequencerCommand::InitSlot { .. } => "initSlot",
            SequencerCommand::MakeJoin { .. } => "makeJoin",
            SequencerCommand::SetJoins { .. } => "setJoins",
            SequencerCommand::Scramble { .. } => "scramble",
            SequencerCommand::GroupScramble { .. } => "groupScramble",
            SequencerCommand::MoveEvent { .. } => "moveEvent",
            SequencerCommand::SetAccent { .. } => "setAccent",
            SequencerCommand::JumpTo { .. } => "jumpTo",
            SequencerCommand::JumpNext { .. } => "jumpNext",
            SequencerCommand::ResetPhase => "resetPhase",
            SequencerCommand::GetSequence { .. } => "getSequence",
            SequencerCommand::SetBpm(_) => "bpm",
            SequencerCommand::SetPreChange(_) => "preChange",
            SequencerCommand::SetAltOut(_) => "altOut",
            SequencerCommand::SetMultiply(_) => "eMult",
            SequencerCommand::SetScrambleMethod(_) => "scrambleMethod",
            SequencerCommand::SetSizeThreshold(_) => "sizeThreshold",
            SequencerCommand::SetSizeFrac(_) => "sizeFrac",
            SequencerCommand::SetAutoThreshold(_) => "autoThreshold",
        }
    }
}

/// Create the control → audio command queue
pub fn command_channel() -> (
    rtrb::Producer<SequencerCommand>,
    rtrb::Consumer<SequencerCommand>,
) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Empty reply buffer large enough for any field of a bank of `capacity`
pub fn field_buffer(capacity: &Capacity) -> Vec<f32> {
    Vec::with_capacity(field_capacity(capacity))
}

/// Wrap a list payload so it is freed off the audio thread
pub fn owned<T: Send + 'static>(value: T) -> Owned<T> {
    Owned::new(&super::gc::gc_handle(), value)
}
