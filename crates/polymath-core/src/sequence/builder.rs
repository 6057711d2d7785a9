//! Slot builder - turns a list of fractions into group and event rows
//!
//! Each `(numerator, denominator)` pair becomes one group holding
//! `numerator` events of length `1/denominator`, laid end to end. When the
//! accumulated phase does not land on a whole number of ramp cycles, a
//! synthetic remainder group is appended so playback always spans an exact
//! integer cycle count.
//!
//! ```text
//! [(4,4),(3,8)]  →  | 1/4 1/4 1/4 1/4 | 1/8 1/8 1/8 | rem 5/8 |   cycles = 2
//!                     group 0           group 1       group 2
//! ```

use crate::config::SequencerConfig;
use crate::error::{SequencerError, SequencerResult};
use crate::types::{Fraction, SequenceRef};

use super::bank::{SequenceBank, SequenceHeader};
use super::table::{EventRecord, GroupRecord};

/// Smallest threshold the builder accepts
pub const MIN_SIZE_THRESHOLD: f32 = 0.000_001;

/// Default threshold below which a remainder is folded away
pub const DEFAULT_SIZE_THRESHOLD: f32 = 0.000_01;

/// Default fraction of the finest event size used by the auto threshold
pub const DEFAULT_SIZE_FRAC: f32 = 0.5;

/// Outcome of a build or append
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildReport {
    /// Groups written from the request
    pub written: usize,
    /// Pairs rejected (non-positive terms or no room)
    pub skipped: usize,
    /// Event rows in the finished sequence
    pub events: usize,
    pub cycles: u32,
    /// Phase of the appended remainder group, if any
    pub remainder: Option<f32>,
}

/// Write position while appending groups
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    len: usize,
    groups: usize,
    offset: f64,
}

/// Builds a slot's original sequence from fractions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotBuilder {
    size_threshold: f32,
    size_frac: f32,
    auto_threshold: bool,
}

impl SlotBuilder {
    pub fn new(size_threshold: f32, size_frac: f32, auto_threshold: bool) -> Self {
        let mut builder = Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            size_frac: DEFAULT_SIZE_FRAC,
            auto_threshold,
        };
        builder.set_size_threshold(size_threshold);
        builder.set_size_frac(size_frac);
        builder
    }

    pub fn from_config(config: &SequencerConfig) -> Self {
        Self::new(config.size_threshold, config.size_frac, config.auto_threshold)
    }

    pub fn set_size_threshold(&mut self, threshold: f32) {
        self.size_threshold = threshold.max(MIN_SIZE_THRESHOLD);
    }

    pub fn set_size_frac(&mut self, frac: f32) {
        self.size_frac = if frac > 0.001 { frac } else { DEFAULT_SIZE_FRAC };
    }

    pub fn set_auto_threshold(&mut self, enabled: bool) {
        self.auto_threshold = enabled;
    }

    #[inline]
    pub fn size_threshold(&self) -> f32 {
        self.size_threshold
    }

    /// Threshold applied to one call
    ///
    /// In auto mode it shrinks to `size_frac / max_denominator` when that is
    /// smaller, so the remainder check scales with the finest subdivision.
    pub fn threshold_for(&self, pairs: &[Fraction]) -> f32 {
        if !self.auto_threshold {
            return self.size_threshold;
        }
        pairs
            .iter()
            .filter(|f| f.is_valid())
            .map(|f| self.size_frac / f.denominator as f32)
            .fold(self.size_threshold, f32::min)
    }

    /// Rebuild `slot`'s original sequence from `pairs`
    ///
    /// Invalid pairs are skipped with a warning and the rest still build. A
    /// request where nothing could be written leaves the slot unfilled.
    pub fn build(
        &self,
        bank: &mut SequenceBank,
        slot: usize,
        pairs: &[Fraction],
    ) -> SequencerResult<BuildReport> {
        bank.check_slot(slot)?;
        let seq = SequenceRef::original(slot);
        let threshold = self.threshold_for(pairs);

        let previous = *bank.header(seq);
        bank.events.clear(seq, previous.len, false);
        bank.groups.clear(seq, previous.groups);
        *bank.header_mut(seq) = SequenceHeader::default();

        let mut cursor = Cursor::default();
        let mut written = 0;
        let mut skipped = 0;
        for (i, fraction) in pairs.iter().enumerate() {
            match append_group(bank, seq, &mut cursor, *fraction) {
                Ok(()) => written += 1,
                Err(e) => {
                    log::warn!("builder: pair {} for {} skipped: {}", i, seq, e);
                    skipped += 1;
                }
            }
        }

        let report = close_cycles(bank, seq, cursor, threshold, written, skipped);
        log::info!(
            "builder: {} built with {} groups, {} events, {} cycles",
            seq,
            written,
            report.events,
            report.cycles
        );
        Ok(report)
    }

    /// Append one group after the last group of `slot`
    ///
    /// An existing remainder group is removed first and recomputed after the
    /// new group, so the sequence still closes on a whole cycle.
    pub fn add_group(
        &self,
        bank: &mut SequenceBank,
        slot: usize,
        fraction: Fraction,
    ) -> SequencerResult<BuildReport> {
        bank.check_slot(slot)?;
        if !fraction.is_valid() {
            return Err(SequencerError::NonPositiveFraction(fraction));
        }
        let seq = SequenceRef::original(slot);
        let header = *bank.header(seq);

        let mut cursor = match header.remainder_group {
            Some(g) => Cursor {
                len: bank.groups.start(seq, g) as usize,
                groups: g,
                offset: bank.groups.offset(seq, g) as f64,
            },
            None if header.groups > 0 => {
                let last = header.groups - 1;
                Cursor {
                    len: header.len,
                    groups: header.groups,
                    offset: bank.groups.offset(seq, last) as f64
                        + bank.groups.size(seq, last) as f64,
                }
            }
            None => Cursor::default(),
        };

        // Check capacity before touching the tables so a rejected append
        // leaves the sequence playable
        check_room(bank, &cursor, fraction)?;
        if let Some(g) = header.remainder_group {
            let step = bank.groups.start(seq, g) as usize;
            let accents = *bank.events.accents(seq, step);
            bank.events.set_record(
                seq,
                step,
                &EventRecord {
                    accents,
                    ..EventRecord::default()
                },
            );
            bank.groups.set_record(seq, g, &GroupRecord::default());
        }
        bank.header_mut(seq).usable = false;

        append_group(bank, seq, &mut cursor, fraction)?;
        let threshold = self.threshold_for(&[fraction]);
        let report = close_cycles(bank, seq, cursor, threshold, 1, 0);
        log::info!(
            "builder: appended {} to {} ({} events, {} cycles)",
            fraction,
            seq,
            report.events,
            report.cycles
        );
        Ok(report)
    }
}

impl Default for SlotBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_THRESHOLD, DEFAULT_SIZE_FRAC, false)
    }
}

/// Room for the group plus one spare group/event for a remainder
fn check_room(bank: &SequenceBank, cursor: &Cursor, fraction: Fraction) -> SequencerResult<()> {
    let cap = bank.capacity();
    if cursor.groups + 2 > cap.max_groups {
        return Err(SequencerError::CapacityExceeded {
            what: "group",
            limit: cap.max_groups,
        });
    }
    if cursor.len + fraction.numerator as usize + 1 > cap.max_events {
        return Err(SequencerError::CapacityExceeded {
            what: "event",
            limit: cap.max_events,
        });
    }
    Ok(())
}

/// Write one group and its events at the cursor
fn append_group(
    bank: &mut SequenceBank,
    seq: SequenceRef,
    cursor: &mut Cursor,
    fraction: Fraction,
) -> SequencerResult<()> {
    if !fraction.is_valid() {
        return Err(SequencerError::NonPositiveFraction(fraction));
    }
    check_room(bank, cursor, fraction)?;

    let g = cursor.groups;
    let n = fraction.numerator as usize;
    let d = fraction.denominator as f64;
    let event_size = 1.0 / d;
    let group_size = fraction.size();

    bank.groups.set_record(
        seq,
        g,
        &GroupRecord {
            numerator: fraction.numerator,
            denominator: d as f32,
            size: group_size as f32,
            size_inv: (1.0 / group_size) as f32,
            offset: cursor.offset as f32,
            start: cursor.len as u32,
            events: fraction.numerator,
            remainder: 0.0,
        },
    );

    for s in 0..n {
        let step = cursor.len + s;
        let offset = cursor.offset + s as f64 * event_size;
        let rec = EventRecord {
            offset: offset as f32,
            size: event_size as f32,
            size_inv: d as f32,
            join_run: 1,
            join_size: event_size as f32,
            span: 1,
            group: g as u32,
            group_step: s as u32,
            source_step: step as u32,
            denom: d as f32,
            play_offset: offset as f32,
            group_offset: cursor.offset as f32,
            accents: *bank.events.accents(seq, step),
        };
        bank.events.set_record(seq, step, &rec);
    }

    cursor.len += n;
    cursor.groups += 1;
    cursor.offset += group_size;
    Ok(())
}

/// Finish a sequence on a whole number of cycles and publish its header
fn close_cycles(
    bank: &mut SequenceBank,
    seq: SequenceRef,
    mut cursor: Cursor,
    threshold: f32,
    written: usize,
    skipped: usize,
) -> BuildReport {
    if cursor.len == 0 {
        log::warn!("builder: no valid groups for {}, slot left unfilled", seq);
        *bank.header_mut(seq) = SequenceHeader::default();
        return BuildReport {
            written,
            skipped,
            events: 0,
            cycles: 1,
            remainder: None,
        };
    }

    let total = cursor.offset;
    let whole = total.floor();
    let diff = total - whole;
    let threshold = threshold as f64;

    let (cycles, remainder, remainder_group) = if diff > threshold && 1.0 - diff > threshold {
        let rem = whole + 1.0 - total;
        let g = cursor.groups;
        let step = cursor.len;
        bank.groups.set_record(
            seq,
            g,
            &GroupRecord {
                numerator: 1,
                denominator: (1.0 / rem) as f32,
                size: rem as f32,
                size_inv: (1.0 / rem) as f32,
                offset: total as f32,
                start: step as u32,
                events: 1,
                remainder: rem as f32,
            },
        );
        let rec = EventRecord {
            offset: total as f32,
            size: rem as f32,
            size_inv: (1.0 / rem) as f32,
            join_run: 1,
            join_size: rem as f32,
            span: 1,
            group: g as u32,
            group_step: 0,
            source_step: step as u32,
            denom: (1.0 / rem) as f32,
            play_offset: total as f32,
            group_offset: total as f32,
            accents: *bank.events.accents(seq, step),
        };
        bank.events.set_record(seq, step, &rec);
        cursor.len += 1;
        cursor.groups += 1;
        log::debug!("builder: remainder {:.6} appended to {}", rem, seq);
        (whole as u32 + 1, rem as f32, Some(g))
    } else {
        ((total.round() as u32).max(1), 0.0, None)
    };

    *bank.header_mut(seq) = SequenceHeader {
        len: cursor.len,
        groups: cursor.groups,
        cycles,
        remainder,
        remainder_group,
        usable: true,
    };

    BuildReport {
        written,
        skipped,
        events: cursor.len,
        cycles,
        remainder: remainder_group.map(|_| remainder),
    }
}
