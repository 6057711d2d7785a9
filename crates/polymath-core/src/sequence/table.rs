//! Flat event and group tables
//!
//! Every sequence (a slot's original or one of its variations) owns a fixed
//! window of rows inside one pre-allocated arena per column. Rows are
//! addressed by `(SequenceRef, index)`; the linear offset arithmetic stays
//! private to this module so nothing outside it depends on the layout.
//!
//! # Layout
//!
//! ```text
//! column: [ slot0/orig | slot0/var1 | .. | slot0/varN | slot1/orig | .. ]
//!            max_events   max_events        max_events
//! ```
//!
//! The arenas are sized once from [`Capacity`] and never grow, so the
//! transport can read any row from the audio thread without allocating.

use crate::types::{AccentPair, Capacity, SequenceRef, ACCENT_CHANNELS};

/// One event row, used for whole-record moves (copy, scramble, compaction)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRecord {
    /// Phase position in the original layout
    pub offset: f32,
    /// Phase duration (always > 0 for a live row)
    pub size: f32,
    /// Cached `1 / size`
    pub size_inv: f32,
    /// Length of the fused run this row leads (1 = single or absorbed)
    pub join_run: u32,
    /// Total phase of the fused run led by this row
    pub join_size: f32,
    /// Raw subdivisions merged into this row by a join compaction
    pub span: u32,
    /// Owning group index
    pub group: u32,
    /// Position inside the owning group
    pub group_step: u32,
    /// Index of this row in the sequence it was copied from
    pub source_step: u32,
    /// Owning group's denominator
    pub denom: f32,
    /// Cumulative playback offset (running sum of sizes)
    pub play_offset: f32,
    /// Playback offset of the first row of the owning group
    pub group_offset: f32,
    pub accents: [AccentPair; ACCENT_CHANNELS],
}

impl Default for EventRecord {
    fn default() -> Self {
        Self {
            offset: 0.0,
            size: 0.0,
            size_inv: 0.0,
            join_run: 1,
            join_size: 0.0,
            span: 1,
            group: 0,
            group_step: 0,
            source_step: 0,
            denom: 0.0,
            play_offset: 0.0,
            group_offset: 0.0,
            accents: [AccentPair::UNSET; ACCENT_CHANNELS],
        }
    }
}

/// One group row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupRecord {
    pub numerator: u32,
    /// Denominator; fractional for a remainder group (`1 / remainder`)
    pub denominator: f32,
    pub size: f32,
    pub size_inv: f32,
    /// Phase where the group starts
    pub offset: f32,
    /// Index of the group's first event row
    pub start: u32,
    /// Number of event rows the group owns
    pub events: u32,
    /// Leftover phase carried by a remainder group (0 otherwise)
    pub remainder: f32,
}

impl Default for GroupRecord {
    fn default() -> Self {
        Self {
            numerator: 1,
            denominator: 1.0,
            size: 1.0,
            size_inv: 1.0,
            offset: 0.0,
            start: 0,
            events: 0,
            remainder: 0.0,
        }
    }
}

/// Computes row indices for one kind of table
#[derive(Debug, Clone, Copy)]
struct Stride {
    per_slot: usize,
    rows: usize,
}

impl Stride {
    #[inline]
    fn base(&self, seq: SequenceRef) -> usize {
        (seq.slot * self.per_slot + seq.variation) * self.rows
    }

    #[inline]
    fn index(&self, seq: SequenceRef, row: usize) -> usize {
        debug_assert!(row < self.rows, "row {} out of {}", row, self.rows);
        self.base(seq) + row
    }

    fn total(&self, capacity: &Capacity) -> usize {
        capacity.slots * self.per_slot * self.rows
    }
}

/// Struct-of-arrays event storage for every sequence in the bank
pub struct EventTable {
    stride: Stride,
    offset: Vec<f32>,
    size: Vec<f32>,
    size_inv: Vec<f32>,
    join_run: Vec<u32>,
    join_size: Vec<f32>,
    span: Vec<u32>,
    group: Vec<u32>,
    group_step: Vec<u32>,
    source_step: Vec<u32>,
    denom: Vec<f32>,
    play_offset: Vec<f32>,
    group_offset: Vec<f32>,
    accents: Vec<[AccentPair; ACCENT_CHANNELS]>,
}

impl EventTable {
    pub fn new(capacity: &Capacity) -> Self {
        let stride = Stride {
            per_slot: capacity.sequences_per_slot(),
            rows: capacity.max_events,
        };
        let n = stride.total(capacity);
        Self {
            stride,
            offset: vec![0.0; n],
            size: vec![0.0; n],
            size_inv: vec![0.0; n],
            join_run: vec![1; n],
            join_size: vec![0.0; n],
            span: vec![1; n],
            group: vec![0; n],
            group_step: vec![0; n],
            source_step: vec![0; n],
            denom: vec![0.0; n],
            play_offset: vec![0.0; n],
            group_offset: vec![0.0; n],
            accents: vec![[AccentPair::UNSET; ACCENT_CHANNELS]; n],
        }
    }

    /// Rows available to each sequence
    #[inline]
    pub fn rows(&self) -> usize {
        self.stride.rows
    }

    pub fn record(&self, seq: SequenceRef, step: usize) -> EventRecord {
        let i = self.stride.index(seq, step);
        EventRecord {
            offset: self.offset[i],
            size: self.size[i],
            size_inv: self.size_inv[i],
            join_run: self.join_run[i],
            join_size: self.join_size[i],
            span: self.span[i],
            group: self.group[i],
            group_step: self.group_step[i],
            source_step: self.source_step[i],
            denom: self.denom[i],
            play_offset: self.play_offset[i],
            group_offset: self.group_offset[i],
            accents: self.accents[i],
        }
    }

    pub fn set_record(&mut self, seq: SequenceRef, step: usize, rec: &EventRecord) {
        let i = self.stride.index(seq, step);
        self.offset[i] = rec.offset;
        self.size[i] = rec.size;
        self.size_inv[i] = rec.size_inv;
        self.join_run[i] = rec.join_run;
        self.join_size[i] = rec.join_size;
        self.span[i] = rec.span;
        self.group[i] = rec.group;
        self.group_step[i] = rec.group_step;
        self.source_step[i] = rec.source_step;
        self.denom[i] = rec.denom;
        self.play_offset[i] = rec.play_offset;
        self.group_offset[i] = rec.group_offset;
        self.accents[i] = rec.accents;
    }

    /// Reset rows `0..len` of a sequence, keeping accents unless `clear_accents`
    pub fn clear(&mut self, seq: SequenceRef, len: usize, clear_accents: bool) {
        let base = self.stride.base(seq);
        let end = base + len.min(self.stride.rows);
        self.offset[base..end].fill(0.0);
        self.size[base..end].fill(0.0);
        self.size_inv[base..end].fill(0.0);
        self.join_run[base..end].fill(1);
        self.join_size[base..end].fill(0.0);
        self.span[base..end].fill(1);
        self.group[base..end].fill(0);
        self.group_step[base..end].fill(0);
        self.source_step[base..end].fill(0);
        self.denom[base..end].fill(0.0);
        self.play_offset[base..end].fill(0.0);
        self.group_offset[base..end].fill(0.0);
        if clear_accents {
            self.accents[base..end].fill([AccentPair::UNSET; ACCENT_CHANNELS]);
        }
    }

    /// Copy rows `0..len` of `from` into `to`, column by column
    pub fn copy_rows(&mut self, from: SequenceRef, to: SequenceRef, len: usize) {
        let src = self.stride.base(from);
        let dst = self.stride.base(to);
        let range = src..src + len.min(self.stride.rows);
        self.offset.copy_within(range.clone(), dst);
        self.size.copy_within(range.clone(), dst);
        self.size_inv.copy_within(range.clone(), dst);
        self.join_run.copy_within(range.clone(), dst);
        self.join_size.copy_within(range.clone(), dst);
        self.span.copy_within(range.clone(), dst);
        self.group.copy_within(range.clone(), dst);
        self.group_step.copy_within(range.clone(), dst);
        self.source_step.copy_within(range.clone(), dst);
        self.denom.copy_within(range.clone(), dst);
        self.play_offset.copy_within(range.clone(), dst);
        self.group_offset.copy_within(range.clone(), dst);
        self.accents.copy_within(range, dst);
    }

    #[inline]
    pub fn offset(&self, seq: SequenceRef, step: usize) -> f32 {
        self.offset[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn size(&self, seq: SequenceRef, step: usize) -> f32 {
        self.size[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn size_inv(&self, seq: SequenceRef, step: usize) -> f32 {
        self.size_inv[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn join_run(&self, seq: SequenceRef, step: usize) -> u32 {
        self.join_run[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn set_join_run(&mut self, seq: SequenceRef, step: usize, run: u32) {
        let i = self.stride.index(seq, step);
        self.join_run[i] = run;
    }

    #[inline]
    pub fn join_size(&self, seq: SequenceRef, step: usize) -> f32 {
        self.join_size[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn set_join_size(&mut self, seq: SequenceRef, step: usize, size: f32) {
        let i = self.stride.index(seq, step);
        self.join_size[i] = size;
    }

    #[inline]
    pub fn span(&self, seq: SequenceRef, step: usize) -> u32 {
        self.span[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn group(&self, seq: SequenceRef, step: usize) -> u32 {
        self.group[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn group_step(&self, seq: SequenceRef, step: usize) -> u32 {
        self.group_step[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn source_step(&self, seq: SequenceRef, step: usize) -> u32 {
        self.source_step[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn denom(&self, seq: SequenceRef, step: usize) -> f32 {
        self.denom[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn play_offset(&self, seq: SequenceRef, step: usize) -> f32 {
        self.play_offset[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn group_offset(&self, seq: SequenceRef, step: usize) -> f32 {
        self.group_offset[self.stride.index(seq, step)]
    }

    /// Rewrite the playback placement of one row
    pub fn set_placement(
        &mut self,
        seq: SequenceRef,
        step: usize,
        group: u32,
        group_step: u32,
        play_offset: f32,
        group_offset: f32,
    ) {
        let i = self.stride.index(seq, step);
        self.group[i] = group;
        self.group_step[i] = group_step;
        self.play_offset[i] = play_offset;
        self.group_offset[i] = group_offset;
    }

    #[inline]
    pub fn accents(&self, seq: SequenceRef, step: usize) -> &[AccentPair; ACCENT_CHANNELS] {
        &self.accents[self.stride.index(seq, step)]
    }

    #[inline]
    pub fn accents_mut(
        &mut self,
        seq: SequenceRef,
        step: usize,
    ) -> &mut [AccentPair; ACCENT_CHANNELS] {
        let i = self.stride.index(seq, step);
        &mut self.accents[i]
    }
}

/// Struct-of-arrays group storage for every sequence in the bank
pub struct GroupTable {
    stride: Stride,
    numerator: Vec<u32>,
    denominator: Vec<f32>,
    size: Vec<f32>,
    size_inv: Vec<f32>,
    offset: Vec<f32>,
    start: Vec<u32>,
    events: Vec<u32>,
    remainder: Vec<f32>,
}

impl GroupTable {
    pub fn new(capacity: &Capacity) -> Self {
        let stride = Stride {
            per_slot: capacity.sequences_per_slot(),
            rows: capacity.max_groups,
        };
        let n = stride.total(capacity);
        Self {
            stride,
            numerator: vec![1; n],
            denominator: vec![1.0; n],
            size: vec![1.0; n],
            size_inv: vec![1.0; n],
            offset: vec![0.0; n],
            start: vec![0; n],
            events: vec![0; n],
            remainder: vec![0.0; n],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.stride.rows
    }

    pub fn record(&self, seq: SequenceRef, group: usize) -> GroupRecord {
        let i = self.stride.index(seq, group);
        GroupRecord {
            numerator: self.numerator[i],
            denominator: self.denominator[i],
            size: self.size[i],
            size_inv: self.size_inv[i],
            offset: self.offset[i],
            start: self.start[i],
            events: self.events[i],
            remainder: self.remainder[i],
        }
    }

    pub fn set_record(&mut self, seq: SequenceRef, group: usize, rec: &GroupRecord) {
        let i = self.stride.index(seq, group);
        self.numerator[i] = rec.numerator;
        self.denominator[i] = rec.denominator;
        self.size[i] = rec.size;
        self.size_inv[i] = rec.size_inv;
        self.offset[i] = rec.offset;
        self.start[i] = rec.start;
        self.events[i] = rec.events;
        self.remainder[i] = rec.remainder;
    }

    /// Reset rows `0..count` of a sequence to the neutral 1/1 group
    pub fn clear(&mut self, seq: SequenceRef, count: usize) {
        let neutral = GroupRecord::default();
        for g in 0..count.min(self.stride.rows) {
            self.set_record(seq, g, &neutral);
        }
    }

    pub fn copy_rows(&mut self, from: SequenceRef, to: SequenceRef, count: usize) {
        let src = self.stride.base(from);
        let dst = self.stride.base(to);
        let range = src..src + count.min(self.stride.rows);
        self.numerator.copy_within(range.clone(), dst);
        self.denominator.copy_within(range.clone(), dst);
        self.size.copy_within(range.clone(), dst);
        self.size_inv.copy_within(range.clone(), dst);
        self.offset.copy_within(range.clone(), dst);
        self.start.copy_within(range.clone(), dst);
        self.events.copy_within(range.clone(), dst);
        self.remainder.copy_within(range, dst);
    }

    #[inline]
    pub fn numerator(&self, seq: SequenceRef, group: usize) -> u32 {
        self.numerator[self.stride.index(seq, group)]
    }

    #[inline]
    pub fn denominator(&self, seq: SequenceRef, group: usize) -> f32 {
        self.denominator[self.stride.index(seq, group)]
    }

    #[inline]
    pub fn size(&self, seq: SequenceRef, group: usize) -> f32 {
        self.size[self.stride.index(seq, group)]
    }

    #[inline]
    pub fn size_inv(&self, seq: SequenceRef, group: usize) -> f32 {
        self.size_inv[self.stride.index(seq, group)]
    }

    #[inline]
    pub fn offset(&self, seq: SequenceRef, group: usize) -> f32 {
        self.offset[self.stride.index(seq, group)]
    }

    #[inline]
    pub fn start(&self, seq: SequenceRef, group: usize) -> u32 {
        self.start[self.stride.index(seq, group)]
    }

    #[inline]
    pub fn set_start(&mut self, seq: SequenceRef, group: usize, start: u32) {
        let i = self.stride.index(seq, group);
        self.start[i] = start;
    }

    #[inline]
    pub fn events(&self, seq: SequenceRef, group: usize) -> u32 {
        self.events[self.stride.index(seq, group)]
    }

    #[inline]
    pub fn remainder(&self, seq: SequenceRef, group: usize) -> f32 {
        self.remainder[self.stride.index(seq, group)]
    }
}
