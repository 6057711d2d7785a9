//! Join editing - fusing consecutive events of a group
//!
//! Two flavours exist:
//!
//! - [`make_join`] marks a run in place. The lead row carries the run length
//!   and the followers stay addressable but are absorbed during playback.
//! - [`set_joins`] re-partitions a whole group. Fused rows are compacted into
//!   single entries and the rest of the sequence shifts left, so the
//!   transport sees one longer event instead of an absorbed run.

use crate::error::{SequencerError, SequencerResult};
use crate::types::SequenceRef;

use super::bank::SequenceBank;
use super::table::EventRecord;

/// Fuse `length` events of `group` starting at `location` in `slot`'s original
///
/// Any earlier run overlapping the new lead is truncated and any run led
/// from inside the new range is dissolved. Join sizes are re-derived for the
/// whole sequence afterwards.
pub fn make_join(
    bank: &mut SequenceBank,
    slot: usize,
    group: usize,
    location: usize,
    length: usize,
) -> SequencerResult<()> {
    bank.check_slot(slot)?;
    let seq = SequenceRef::original(slot);
    let groups = bank.header(seq).groups;
    if group >= groups {
        return Err(SequencerError::MissingGroup { group, groups });
    }
    let record = bank.groups.record(seq, group);
    let events = record.events as usize;
    if location >= events {
        return Err(SequencerError::LocationAfterGroup { location, events });
    }
    if length == 0 {
        return Err(SequencerError::EmptyJoin);
    }
    if location + length > events {
        return Err(SequencerError::JoinOverrun {
            end: location + length,
            events,
        });
    }

    let start = record.start as usize;
    let lead = start + location;

    let mut i = start;
    while i < lead {
        let run = bank.events.join_run(seq, i).max(1) as usize;
        if i + run > lead {
            bank.events.set_join_run(seq, i, (lead - i) as u32);
        }
        i += run;
    }

    bank.events.set_join_run(seq, lead, length as u32);
    for follower in lead + 1..lead + length {
        bank.events.set_join_run(seq, follower, 1);
    }

    refresh_join_sizes(bank, seq);
    log::debug!(
        "join: {} group {} events {}..{} fused",
        seq,
        group,
        location,
        location + length
    );
    Ok(())
}

/// Re-partition `group` of `slot`'s original into fused entries of `counts`
///
/// `counts` must sum to the group's numerator. Each count becomes one row
/// covering that many subdivisions, so a group that was already compacted
/// can be split up again. Later groups move by the number of rows removed
/// or added. Runs marked by [`make_join`] inside the group are dissolved by
/// the compaction.
pub fn set_joins(
    bank: &mut SequenceBank,
    slot: usize,
    group: usize,
    counts: &[usize],
) -> SequencerResult<()> {
    bank.check_slot(slot)?;
    let seq = SequenceRef::original(slot);
    let header = *bank.header(seq);
    if group >= header.groups {
        return Err(SequencerError::MissingGroup {
            group,
            groups: header.groups,
        });
    }
    let record = bank.groups.record(seq, group);
    let start = record.start as usize;
    let events = record.events as usize;

    let mut rows = std::mem::take(&mut bank.scratch.records);
    let mut fused = std::mem::take(&mut bank.scratch.compacted);
    rows.clear();
    rows.extend((start..start + events).map(|step| bank.events.record(seq, step)));
    let mut result = compact_joins(&rows, record.numerator, counts, &mut fused);

    let limit = bank.capacity().max_events;
    if result.is_ok() && header.len - events + fused.len() > limit {
        result = Err(SequencerError::CapacityExceeded {
            what: "event",
            limit,
        });
    }

    if result.is_ok() {
        let tail = start + events..header.len;
        let dest = start + fused.len();
        let len = header.len - events + fused.len();
        if dest < tail.start {
            for step in tail {
                let rec = bank.events.record(seq, step);
                bank.events.set_record(seq, step - (events - fused.len()), &rec);
            }
            for step in len..header.len {
                let accents = *bank.events.accents(seq, step);
                bank.events.set_record(
                    seq,
                    step,
                    &EventRecord {
                        accents,
                        ..EventRecord::default()
                    },
                );
            }
        } else if dest > tail.start {
            for step in tail.rev() {
                let rec = bank.events.record(seq, step);
                bank.events.set_record(seq, step + (fused.len() - events), &rec);
            }
        }
        for (i, rec) in fused.iter().enumerate() {
            bank.events.set_record(seq, start + i, rec);
        }
        for later in group + 1..header.groups {
            let moved = bank.groups.start(seq, later) as usize + fused.len() - events;
            bank.groups.set_start(seq, later, moved as u32);
        }
        let mut updated = record;
        updated.events = fused.len() as u32;
        bank.groups.set_record(seq, group, &updated);
        bank.header_mut(seq).len = len;
        log::debug!(
            "join: {} group {} repartitioned {} -> {} events",
            seq,
            group,
            events,
            fused.len()
        );
    }

    bank.scratch.records = rows;
    bank.scratch.compacted = fused;
    result?;
    bank.recompute_offsets(seq)
}

/// Re-partition one group's rows into fused entries
///
/// `counts` are measured in subdivisions of the group (`numerator` of them
/// in total). Each row covers `span` subdivisions; a count that ends inside
/// a row splits it, with the row's size shared out evenly per subdivision.
/// `out` is cleared and receives one record per count, with `size`,
/// `join_size` and `span` summed over the covered subdivisions and
/// `group_step` renumbered from zero. Each entry keeps the source step and
/// accents of the row it starts in. Nothing is written when the counts are
/// rejected.
pub fn compact_joins(
    rows: &[EventRecord],
    numerator: u32,
    counts: &[usize],
    out: &mut Vec<EventRecord>,
) -> SequencerResult<()> {
    let total: usize = counts.iter().sum();
    if total != numerator as usize {
        return Err(SequencerError::JoinTotalMismatch {
            total,
            expected: numerator as usize,
        });
    }
    if counts.contains(&0) {
        return Err(SequencerError::EmptyJoin);
    }
    let covered: u32 = rows.iter().map(|r| r.span.max(1)).sum();
    if covered != numerator {
        return Err(SequencerError::GroupCoverage { covered, numerator });
    }

    out.clear();
    let mut row = 0;
    let mut within = 0u32;
    for (entry, &count) in counts.iter().enumerate() {
        let lead = rows[row];
        let lead_span = lead.span.max(1);
        let offset = lead.offset + lead.size * within as f32 / lead_span as f32;

        let mut size = 0.0f32;
        let mut remaining = count as u32;
        while remaining > 0 {
            let current = &rows[row];
            let span = current.span.max(1);
            let take = remaining.min(span - within);
            size += current.size * take as f32 / span as f32;
            within += take;
            remaining -= take;
            if within == span {
                row += 1;
                within = 0;
            }
        }

        out.push(EventRecord {
            offset,
            size,
            size_inv: 1.0 / size,
            join_run: 1,
            join_size: size,
            span: count as u32,
            group_step: entry as u32,
            ..lead
        });
    }
    Ok(())
}

/// Recompute `join_size` for every run of a sequence
pub(crate) fn refresh_join_sizes(bank: &mut SequenceBank, seq: SequenceRef) {
    let len = bank.len(seq);
    let mut i = 0;
    while i < len {
        let run = (bank.events.join_run(seq, i).max(1) as usize).min(len - i);
        let total: f32 = (i..i + run).map(|step| bank.events.size(seq, step)).sum();
        bank.events.set_join_size(seq, i, total);
        for follower in i + 1..i + run {
            let size = bank.events.size(seq, follower);
            bank.events.set_join_size(seq, follower, size);
        }
        i += run;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::test_support::{assert_close, built_bank};
    use crate::types::Fraction;

    #[test]
    fn test_make_join_marks_lead_and_followers() {
        let mut bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8)]);
        let seq = SequenceRef::original(0);
        let before: f32 = (1..4).map(|s| bank.events().size(seq, s)).sum();

        make_join(&mut bank, 0, 0, 1, 3).unwrap();

        assert_eq!(bank.events().join_run(seq, 1), 3);
        assert_eq!(bank.events().join_run(seq, 2), 1);
        assert_eq!(bank.events().join_run(seq, 3), 1);
        assert_close(bank.events().join_size(seq, 1), before);
        // Sizes of the rows themselves are untouched
        assert_close(bank.events().size(seq, 2), 0.25);
    }

    #[test]
    fn test_make_join_validation() {
        let mut bank = built_bank(&[Fraction::new(4, 4)]);
        assert!(matches!(
            make_join(&mut bank, 0, 3, 0, 1),
            Err(SequencerError::MissingGroup { group: 3, .. })
        ));
        assert!(matches!(
            make_join(&mut bank, 0, 0, 4, 1),
            Err(SequencerError::LocationAfterGroup { .. })
        ));
        assert!(matches!(
            make_join(&mut bank, 0, 0, 1, 0),
            Err(SequencerError::EmptyJoin)
        ));
        assert!(matches!(
            make_join(&mut bank, 0, 0, 2, 3),
            Err(SequencerError::JoinOverrun { end: 5, events: 4 })
        ));
        // Failed edits leave the table alone
        let seq = SequenceRef::original(0);
        assert!((0..4).all(|s| bank.events().join_run(seq, s) == 1));
    }

    #[test]
    fn test_make_join_truncates_overlapping_run() {
        let mut bank = built_bank(&[Fraction::new(6, 8)]);
        let seq = SequenceRef::original(0);
        make_join(&mut bank, 0, 0, 0, 4).unwrap();
        make_join(&mut bank, 0, 0, 2, 3).unwrap();
        assert_eq!(bank.events().join_run(seq, 0), 2);
        assert_eq!(bank.events().join_run(seq, 2), 3);
        assert_close(bank.events().join_size(seq, 0), 0.25);
        assert_close(bank.events().join_size(seq, 2), 0.375);
    }

    #[test]
    fn test_compact_joins_sums_runs() {
        let rows: Vec<EventRecord> = (0..5)
            .map(|i| EventRecord {
                offset: i as f32 * 0.125,
                size: 0.125,
                size_inv: 8.0,
                join_size: 0.125,
                group_step: i,
                source_step: i,
                ..EventRecord::default()
            })
            .collect();
        let mut out = Vec::new();
        compact_joins(&rows, 5, &[2, 1, 2], &mut out).unwrap();
        assert_eq!(out.len(), 3);
        assert_close(out[0].size, 0.25);
        assert_close(out[0].size_inv, 4.0);
        assert_eq!(out[0].span, 2);
        assert_close(out[1].offset, 0.25);
        assert_eq!(out[1].group_step, 1);
        assert_eq!(out[2].source_step, 3);

        assert!(matches!(
            compact_joins(&rows, 5, &[2, 2], &mut out),
            Err(SequencerError::JoinTotalMismatch { total: 4, expected: 5 })
        ));
    }

    #[test]
    fn test_set_joins_shifts_later_groups() {
        let mut bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8)]);
        let seq = SequenceRef::original(0);
        let len_before = bank.len(seq);

        set_joins(&mut bank, 0, 0, &[1, 3]).unwrap();

        assert_eq!(bank.len(seq), len_before - 2);
        assert_eq!(bank.groups().events(seq, 0), 2);
        assert_eq!(bank.groups().start(seq, 1), 2);
        assert_close(bank.events().size(seq, 1), 0.75);
        assert_eq!(bank.events().span(seq, 1), 3);
        // The second group's first event now sits at row 2 and still starts at 1.0
        assert_eq!(bank.events().group(seq, 2), 1);
        assert_close(bank.events().play_offset(seq, 2), 1.0);
    }

    #[test]
    fn test_compact_joins_splits_wide_rows() {
        let rows = [
            EventRecord {
                size: 0.5,
                span: 2,
                source_step: 0,
                ..EventRecord::default()
            },
            EventRecord {
                offset: 0.5,
                size: 0.5,
                span: 2,
                source_step: 2,
                ..EventRecord::default()
            },
        ];
        let mut out = Vec::new();
        compact_joins(&rows, 4, &[1, 3], &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_close(out[0].size, 0.25);
        assert_eq!(out[0].span, 1);
        assert_close(out[1].offset, 0.25);
        assert_close(out[1].size, 0.75);
        assert_eq!(out[1].span, 3);
        // The second entry starts inside the first row
        assert_eq!(out[1].source_step, 0);

        assert!(matches!(
            compact_joins(&rows, 6, &[3, 3], &mut out),
            Err(SequencerError::GroupCoverage {
                covered: 4,
                numerator: 6
            })
        ));
    }

    #[test]
    fn test_set_joins_mismatch_is_noop() {
        let mut bank = built_bank(&[Fraction::new(4, 4)]);
        let seq = SequenceRef::original(0);
        let before = bank.event_records(seq);
        assert!(set_joins(&mut bank, 0, 0, &[1, 1]).is_err());
        assert_eq!(bank.event_records(seq), before);
    }

    #[test]
    fn test_set_joins_repartitions_compacted_group() {
        let mut bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8)]);
        let seq = SequenceRef::original(0);

        set_joins(&mut bank, 0, 0, &[2, 2]).unwrap();
        assert_eq!(bank.groups().events(seq, 0), 2);
        // Counts are measured against the numerator, not the current rows
        assert!(matches!(
            set_joins(&mut bank, 0, 0, &[1, 1]),
            Err(SequencerError::JoinTotalMismatch {
                total: 2,
                expected: 4
            })
        ));

        set_joins(&mut bank, 0, 0, &[1, 3]).unwrap();
        assert_eq!(bank.groups().events(seq, 0), 2);
        assert_close(bank.events().size(seq, 0), 0.25);
        assert_close(bank.events().size(seq, 1), 0.75);
        assert_eq!(bank.events().span(seq, 1), 3);
        assert_close(bank.events().play_offset(seq, 1), 0.25);
        assert_eq!(bank.groups().start(seq, 1), 2);
        assert_close(bank.events().play_offset(seq, 2), 1.0);
    }

    #[test]
    fn test_set_joins_can_split_back_out() {
        let mut bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8)]);
        let seq = SequenceRef::original(0);
        let len = bank.len(seq);

        set_joins(&mut bank, 0, 0, &[4]).unwrap();
        assert_eq!(bank.len(seq), len - 3);
        assert_eq!(bank.groups().start(seq, 1), 1);

        set_joins(&mut bank, 0, 0, &[1, 1, 1, 1]).unwrap();
        assert_eq!(bank.len(seq), len);
        assert_eq!(bank.groups().start(seq, 1), 4);
        for step in 0..4 {
            assert_close(bank.events().size(seq, step), 0.25);
            assert_close(bank.events().play_offset(seq, step), step as f32 * 0.25);
        }
        // The second group followed the rows back out
        assert_eq!(bank.events().group(seq, 4), 1);
        assert_close(bank.events().size(seq, 4), 0.125);
        assert_close(bank.events().play_offset(seq, 4), 1.0);
    }
}
