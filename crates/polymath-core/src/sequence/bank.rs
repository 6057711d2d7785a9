//! Sequence bank - ownership of every slot and variation table
//!
//! The bank is the single owner of the event/group arenas plus the small
//! per-sequence headers (length, group count, cycle count, remainder and the
//! usable flag). Builders and editors borrow it mutably on the control path;
//! the transport only ever reads it.

use crate::error::{BuildPhase, SequencerError, SequencerResult};
use crate::types::{AccentPair, Capacity, SequenceRef, ACCENT_CHANNELS};

use super::table::{EventRecord, EventTable, GroupRecord, GroupTable};

/// Per-sequence bookkeeping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceHeader {
    /// Number of live event rows
    pub len: usize,
    /// Number of live group rows
    pub groups: usize,
    /// Whole ramp cycles spanned by the sequence
    pub cycles: u32,
    /// Phase appended to complete the last cycle (0 if none)
    pub remainder: f32,
    /// Index of the synthetic remainder group, if one was appended
    pub remainder_group: Option<usize>,
    /// Set once the sequence is complete and may be played
    pub usable: bool,
}

impl Default for SequenceHeader {
    fn default() -> Self {
        Self {
            len: 0,
            groups: 0,
            cycles: 1,
            remainder: 0.0,
            remainder_group: None,
            usable: false,
        }
    }
}

/// Which side of an accent channel to write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccentEdit {
    Both { param: f32, event: f32 },
    ParamOnly(f32),
    EventOnly(f32),
}

/// Pre-allocated working buffers for structural edits
///
/// Sized to the table capacity once so scrambles, compactions and group
/// permutations never allocate after construction.
pub(crate) struct Scratch {
    /// `(first row, row count)` of each atomic unit
    pub units: Vec<(usize, usize)>,
    /// Permuted unit (or group) order
    pub order: Vec<usize>,
    /// Candidate pool for swap-partner draws
    pub pool: Vec<usize>,
    pub records: Vec<EventRecord>,
    /// Output of join compaction and record moves
    pub compacted: Vec<EventRecord>,
    pub group_records: Vec<GroupRecord>,
}

impl Scratch {
    fn new(capacity: &Capacity) -> Self {
        Self {
            units: Vec::with_capacity(capacity.max_events),
            order: Vec::with_capacity(capacity.max_events),
            pool: Vec::with_capacity(capacity.max_events),
            records: Vec::with_capacity(capacity.max_events),
            compacted: Vec::with_capacity(capacity.max_events),
            group_records: Vec::with_capacity(capacity.max_groups),
        }
    }
}

/// Storage for all slots and their variations
pub struct SequenceBank {
    capacity: Capacity,
    pub(crate) events: EventTable,
    pub(crate) groups: GroupTable,
    pub(crate) headers: Vec<SequenceHeader>,
    pub(crate) scratch: Scratch,
}

impl SequenceBank {
    pub fn new(capacity: Capacity) -> Self {
        log::debug!(
            "bank: allocating {} slots x {} sequences ({} events, {} groups each)",
            capacity.slots,
            capacity.sequences_per_slot(),
            capacity.max_events,
            capacity.max_groups
        );
        Self {
            events: EventTable::new(&capacity),
            groups: GroupTable::new(&capacity),
            headers: vec![SequenceHeader::default(); capacity.sequence_count()],
            scratch: Scratch::new(&capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> &Capacity {
        &self.capacity
    }

    #[inline]
    pub fn events(&self) -> &EventTable {
        &self.events
    }

    #[inline]
    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    /// Validate a slot index
    pub fn check_slot(&self, slot: usize) -> SequencerResult<()> {
        if slot < self.capacity.slots {
            Ok(())
        } else {
            Err(SequencerError::InvalidSlot {
                slot,
                max: self.capacity.slots - 1,
            })
        }
    }

    /// Validate a full sequence address
    pub fn check(&self, seq: SequenceRef) -> SequencerResult<()> {
        self.check_slot(seq.slot)?;
        if seq.variation <= self.capacity.variations {
            Ok(())
        } else {
            Err(SequencerError::InvalidVariation {
                variation: seq.variation,
                max: self.capacity.variations,
            })
        }
    }

    /// Validate the address and require at least one event
    pub fn require_filled(&self, seq: SequenceRef) -> SequencerResult<()> {
        self.check(seq)?;
        if self.is_playable(seq) {
            Ok(())
        } else {
            Err(SequencerError::Unfilled {
                slot: seq.slot,
                variation: seq.variation,
            })
        }
    }

    #[inline]
    pub fn header(&self, seq: SequenceRef) -> &SequenceHeader {
        &self.headers[self.capacity.sequence_index(seq)]
    }

    #[inline]
    pub(crate) fn header_mut(&mut self, seq: SequenceRef) -> &mut SequenceHeader {
        let i = self.capacity.sequence_index(seq);
        &mut self.headers[i]
    }

    #[inline]
    pub fn len(&self, seq: SequenceRef) -> usize {
        self.header(seq).len
    }

    #[inline]
    pub fn cycles(&self, seq: SequenceRef) -> u32 {
        self.header(seq).cycles
    }

    /// A sequence is playable once it holds events and is flagged usable
    #[inline]
    pub fn is_playable(&self, seq: SequenceRef) -> bool {
        self.capacity.contains(seq) && {
            let header = self.header(seq);
            header.usable && header.len > 0
        }
    }

    /// Write one accent channel of an event in a slot's original sequence
    ///
    /// `channel` is 1-based. The step is clamped to the table rows so a host
    /// can prepare accents before the slot is built.
    pub fn set_accent(
        &mut self,
        slot: usize,
        step: usize,
        channel: usize,
        edit: AccentEdit,
    ) -> SequencerResult<()> {
        self.check_slot(slot)?;
        if channel == 0 || channel > ACCENT_CHANNELS {
            return Err(SequencerError::InvalidAccentChannel(channel));
        }
        let step = step.min(self.capacity.max_events - 1);
        let pair = &mut self.events.accents_mut(SequenceRef::original(slot), step)[channel - 1];
        match edit {
            AccentEdit::Both { param, event } => {
                pair.param = param;
                pair.event = event;
            }
            AccentEdit::ParamOnly(param) => pair.param = param,
            AccentEdit::EventOnly(event) => pair.event = event,
        }
        Ok(())
    }

    /// Zero a slot: neutral groups, unit events, zeroed accents, no length
    ///
    /// The slot's variations are invalidated as well since they derive from
    /// the original.
    pub fn init_slot(&mut self, slot: usize) -> SequencerResult<()> {
        self.check_slot(slot)?;
        for variation in 0..self.capacity.sequences_per_slot() {
            let seq = SequenceRef::new(slot, variation);
            let rec = EventRecord {
                size: 1.0,
                size_inv: 1.0,
                join_size: 1.0,
                accents: [AccentPair::ZERO; ACCENT_CHANNELS],
                ..EventRecord::default()
            };
            for step in 0..self.capacity.max_events {
                self.events.set_record(seq, step, &rec);
            }
            self.groups.clear(seq, self.capacity.max_groups);
            *self.header_mut(seq) = SequenceHeader::default();
        }
        log::info!("bank: slot {} initialised", slot);
        Ok(())
    }

    /// Recompute cumulative playback offsets of every row in a sequence
    ///
    /// `play_offset` is the running sum of sizes from 0 and `group_offset`
    /// repeats the `play_offset` of the row that opens each group.
    pub(crate) fn recompute_offsets(&mut self, seq: SequenceRef) -> SequencerResult<()> {
        let len = self.len(seq);
        let mut running = 0.0f64;
        let mut group_start = 0.0f64;
        for step in 0..len {
            let size = self.events.size(seq, step);
            if size <= 0.0 {
                return Err(SequencerError::BuildFailed {
                    phase: BuildPhase::Offsets,
                    index: step,
                });
            }
            let group = self.events.group(seq, step);
            let group_step = self.events.group_step(seq, step);
            if group_step == 0 {
                group_start = running;
            }
            self.events
                .set_placement(seq, step, group, group_step, running as f32, group_start as f32);
            running += size as f64;
        }
        Ok(())
    }

    /// Copy of the live event rows of a sequence (control-side inspection)
    pub fn event_records(&self, seq: SequenceRef) -> Vec<EventRecord> {
        (0..self.len(seq))
            .map(|step| self.events.record(seq, step))
            .collect()
    }

    /// Copy of the live group rows of a sequence (control-side inspection)
    pub fn group_records(&self, seq: SequenceRef) -> Vec<GroupRecord> {
        (0..self.header(seq).groups)
            .map(|g| self.groups.record(seq, g))
            .collect()
    }

    /// Accent pairs of one event (zero-based channel order)
    #[inline]
    pub fn accents(&self, seq: SequenceRef, step: usize) -> &[AccentPair; ACCENT_CHANNELS] {
        self.events.accents(seq, step)
    }
}
