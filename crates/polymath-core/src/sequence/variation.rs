//! Variation engine - scrambled copies of a slot's original sequence
//!
//! A variation is built by a five-phase pipeline. Each phase validates its
//! output and the variation is only marked usable once all of them pass:
//!
//! ```text
//! original ──copy──▶ variation rows
//!                      │ swap-list   (units = join runs, transposed in pairs)
//!                      │ scramble    (rows rewritten in unit order)
//!                      │ regroup     (groups re-derived from row continuity)
//!                      ▼ offsets     (play/group offsets recomputed)
//!                    usable
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BuildPhase, SequencerError, SequencerResult};
use crate::types::SequenceRef;

use super::bank::{SequenceBank, SequenceHeader};
use super::join::refresh_join_sizes;
use super::table::GroupRecord;

/// Tolerance for offset and denominator continuity while regrouping
const CONTINUITY_EPSILON: f32 = 0.000_01;

/// How swap partners are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrambleMethod {
    /// Every unit takes part in at most one transposition
    #[default]
    Unique,
    /// Units may be transposed repeatedly
    AllowRepeats,
}

impl ScrambleMethod {
    /// Host encoding: 0 unique, anything else allows repeats
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            ScrambleMethod::Unique
        } else {
            ScrambleMethod::AllowRepeats
        }
    }
}

/// Number of unit transpositions for a scramble
///
/// `probability` is clamped to 0..=1 and halved (each transposition moves two
/// units), rounded half up and capped at `units / 2` and `units - 1`.
pub fn swap_count(units: usize, probability: f32) -> usize {
    if units < 2 {
        return 0;
    }
    let p = if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0) * 0.5
    };
    let wanted = (units as f32 * p + 0.5).floor() as usize;
    wanted.min(units / 2).min(units - 1)
}

/// Builds and edits variations
#[derive(Debug, Clone, Copy, Default)]
pub struct VariationEngine {
    pub method: ScrambleMethod,
}

impl VariationEngine {
    pub fn new(method: ScrambleMethod) -> Self {
        Self { method }
    }

    /// Build `variation` of `slot` as a scrambled copy of the original
    pub fn scramble<R: Rng + ?Sized>(
        &self,
        bank: &mut SequenceBank,
        rng: &mut R,
        slot: usize,
        variation: usize,
        probability: f32,
    ) -> SequencerResult<()> {
        let dest = SequenceRef::new(slot, variation);
        bank.check(dest)?;
        if dest.is_original() {
            return Err(SequencerError::OriginalProtected { action: "scramble" });
        }
        bank.require_filled(SequenceRef::original(slot))?;

        bank.header_mut(dest).usable = false;
        let result = self.run_pipeline(bank, rng, dest, probability);
        match &result {
            Ok(()) => {
                bank.header_mut(dest).usable = true;
                log::info!(
                    "scramble: {} built ({} events, {} groups)",
                    dest,
                    bank.len(dest),
                    bank.header(dest).groups
                );
            }
            Err(e) => log::warn!("scramble: {} not usable: {}", dest, e),
        }
        result
    }

    fn run_pipeline<R: Rng + ?Sized>(
        &self,
        bank: &mut SequenceBank,
        rng: &mut R,
        dest: SequenceRef,
        probability: f32,
    ) -> SequencerResult<()> {
        copy_original(bank, dest)?;
        log::debug!("scramble: copy ok for {}", dest);

        let pairs = self.build_swap_list(bank, rng, dest, probability)?;
        log::debug!("scramble: swap-list ok for {} ({} pairs)", dest, pairs);

        apply_unit_order(bank, dest)?;
        log::debug!("scramble: scramble ok for {}", dest);

        regroup(bank, dest)?;
        log::debug!("scramble: regroup ok for {}", dest);

        bank.recompute_offsets(dest)?;
        log::debug!("scramble: offsets ok for {}", dest);
        Ok(())
    }

    /// Partition rows into units and permute their order in scratch
    fn build_swap_list<R: Rng + ?Sized>(
        &self,
        bank: &mut SequenceBank,
        rng: &mut R,
        seq: SequenceRef,
        probability: f32,
    ) -> SequencerResult<usize> {
        let len = bank.len(seq);
        let scratch = &mut bank.scratch;
        scratch.units.clear();
        let mut i = 0;
        while i < len {
            let run = (bank.events.join_run(seq, i).max(1) as usize).min(len - i);
            scratch.units.push((i, run));
            i += run;
        }
        if scratch.units.is_empty() {
            return Err(SequencerError::BuildFailed {
                phase: BuildPhase::SwapList,
                index: 0,
            });
        }

        let units = scratch.units.len();
        scratch.order.clear();
        scratch.order.extend(0..units);
        let pairs = swap_count(units, probability);

        match self.method {
            ScrambleMethod::Unique => {
                scratch.pool.clear();
                scratch.pool.extend(0..units);
                for _ in 0..pairs {
                    let a = scratch.pool.swap_remove(rng.gen_range(0..scratch.pool.len()));
                    let b = scratch.pool.swap_remove(rng.gen_range(0..scratch.pool.len()));
                    scratch.order.swap(a, b);
                }
            }
            ScrambleMethod::AllowRepeats => {
                for _ in 0..pairs {
                    let a = rng.gen_range(0..units);
                    let mut b = rng.gen_range(0..units - 1);
                    if b >= a {
                        b += 1;
                    }
                    scratch.order.swap(a, b);
                }
            }
        }
        Ok(pairs)
    }

    /// Move one event of a variation by `shift` rows
    ///
    /// The rows between the old and new position slide over by one. Groups
    /// and offsets are re-derived afterwards.
    pub fn move_event(
        &self,
        bank: &mut SequenceBank,
        slot: usize,
        variation: usize,
        location: usize,
        shift: isize,
    ) -> SequencerResult<()> {
        let seq = SequenceRef::new(slot, variation);
        bank.check(seq)?;
        if seq.is_original() {
            return Err(SequencerError::OriginalProtected {
                action: "move events in",
            });
        }
        bank.require_filled(seq)?;

        let len = bank.len(seq);
        let target = location as isize + shift;
        if location >= len || target < 0 || target >= len as isize {
            return Err(SequencerError::MoveOutOfRange {
                len,
                location,
                shift,
            });
        }
        let target = target as usize;

        let moving = bank.events.record(seq, location);
        if target > location {
            for step in location..target {
                let next = bank.events.record(seq, step + 1);
                bank.events.set_record(seq, step, &next);
            }
        } else {
            for step in (target + 1..=location).rev() {
                let prev = bank.events.record(seq, step - 1);
                bank.events.set_record(seq, step, &prev);
            }
        }
        bank.events.set_record(seq, target, &moving);

        bank.header_mut(seq).usable = false;
        refresh_join_sizes(bank, seq);
        regroup(bank, seq)?;
        bank.recompute_offsets(seq)?;
        bank.header_mut(seq).usable = true;
        log::debug!("scramble: {} moved event {} to {}", seq, location, target);
        Ok(())
    }
}

/// Copy the original's rows, groups and header into `dest`
fn copy_original(bank: &mut SequenceBank, dest: SequenceRef) -> SequencerResult<()> {
    let source = SequenceRef::original(dest.slot);
    let header = *bank.header(source);
    for step in 0..header.len {
        if bank.events.size(source, step) <= 0.0 || bank.events.join_size(source, step) <= 0.0 {
            return Err(SequencerError::BuildFailed {
                phase: BuildPhase::Copy,
                index: step,
            });
        }
    }

    bank.events.copy_rows(source, dest, header.len);
    bank.groups.copy_rows(source, dest, header.groups);
    for step in 0..header.len {
        let mut rec = bank.events.record(dest, step);
        rec.source_step = step as u32;
        bank.events.set_record(dest, step, &rec);
    }
    *bank.header_mut(dest) = SequenceHeader {
        usable: false,
        remainder_group: None,
        ..header
    };
    Ok(())
}

/// Rewrite the rows of `seq` in the unit order held in scratch
fn apply_unit_order(bank: &mut SequenceBank, seq: SequenceRef) -> SequencerResult<()> {
    let mut records = std::mem::take(&mut bank.scratch.records);
    records.clear();
    for &unit in &bank.scratch.order {
        let (first, count) = bank.scratch.units[unit];
        records.extend((first..first + count).map(|step| bank.events.record(seq, step)));
    }

    let mut result = Ok(());
    for (step, rec) in records.iter().enumerate() {
        if rec.denom == 0.0 {
            result = Err(SequencerError::BuildFailed {
                phase: BuildPhase::Scramble,
                index: step,
            });
            break;
        }
        bank.events.set_record(seq, step, rec);
    }
    bank.scratch.records = records;
    result
}

/// Re-derive group boundaries from row continuity
///
/// A new group opens when a row's original offset does not continue the
/// previous row, when its source step is not the next one, or when its
/// denominator differs.
pub(crate) fn regroup(bank: &mut SequenceBank, seq: SequenceRef) -> SequencerResult<()> {
    let len = bank.len(seq);
    let max_groups = bank.capacity().max_groups;
    let mut groups = std::mem::take(&mut bank.scratch.group_records);
    groups.clear();

    let mut result = Ok(());
    let mut running = 0.0f64;
    for step in 0..len {
        let rec = bank.events.record(seq, step);
        if rec.size <= 0.0 {
            result = Err(SequencerError::BuildFailed {
                phase: BuildPhase::Regroup,
                index: step,
            });
            break;
        }

        let opens = match step.checked_sub(1).map(|p| bank.events.record(seq, p)) {
            None => true,
            Some(prev) => {
                (rec.offset - (prev.offset + prev.size)).abs() > CONTINUITY_EPSILON
                    || rec.source_step != prev.source_step + 1
                    || (rec.denom - prev.denom).abs() > CONTINUITY_EPSILON
            }
        };
        if opens {
            if groups.len() == max_groups {
                result = Err(SequencerError::BuildFailed {
                    phase: BuildPhase::Regroup,
                    index: step,
                });
                break;
            }
            groups.push(GroupRecord {
                numerator: 0,
                denominator: rec.denom,
                size: 0.0,
                size_inv: 0.0,
                offset: running as f32,
                start: step as u32,
                events: 0,
                remainder: 0.0,
            });
        }

        let g = groups.len() - 1;
        let current = &mut groups[g];
        let group_step = current.events;
        current.numerator += rec.span;
        current.events += 1;
        current.size += rec.size;
        running += rec.size as f64;

        bank.events
            .set_placement(seq, step, g as u32, group_step, rec.play_offset, rec.group_offset);
    }

    if result.is_ok() {
        for (g, group) in groups.iter_mut().enumerate() {
            if group.size <= 0.0 {
                result = Err(SequencerError::BuildFailed {
                    phase: BuildPhase::Regroup,
                    index: group.start as usize,
                });
                break;
            }
            group.size_inv = 1.0 / group.size;
            bank.groups.set_record(seq, g, group);
        }
        if result.is_ok() {
            bank.header_mut(seq).groups = groups.len();
        }
    }

    bank.scratch.group_records = groups;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::join::make_join;
    use crate::sequence::test_support::{assert_close, built_bank, rng_from, seeded_rng};
    use crate::types::Fraction;

    fn sorted_sizes(bank: &SequenceBank, seq: SequenceRef) -> Vec<f32> {
        let mut sizes: Vec<f32> = bank.event_records(seq).iter().map(|r| r.size).collect();
        sizes.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sizes
    }

    #[test]
    fn test_swap_count() {
        assert_eq!(swap_count(7, 1.0), 3);
        assert_eq!(swap_count(2, 1.0), 1);
        assert_eq!(swap_count(10, 0.3), 2);
        assert_eq!(swap_count(10, 0.0), 0);
        assert_eq!(swap_count(10, 5.0), 5);
        assert_eq!(swap_count(1, 1.0), 0);
        assert_eq!(swap_count(4, f32::NAN), 0);
    }

    #[test]
    fn test_scramble_preserves_events() {
        let mut bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8), Fraction::new(5, 16)]);
        let engine = VariationEngine::default();
        let mut rng = seeded_rng();
        engine.scramble(&mut bank, &mut rng, 0, 1, 1.0).unwrap();

        let original = SequenceRef::original(0);
        let variation = SequenceRef::new(0, 1);
        assert!(bank.is_playable(variation));
        assert_eq!(bank.len(variation), bank.len(original));
        assert_eq!(sorted_sizes(&bank, variation), sorted_sizes(&bank, original));

        let mut sources: Vec<u32> = bank
            .event_records(variation)
            .iter()
            .map(|r| r.source_step)
            .collect();
        sources.sort_unstable();
        assert_eq!(sources, (0..bank.len(original) as u32).collect::<Vec<_>>());
        assert_eq!(bank.cycles(variation), bank.cycles(original));
    }

    #[test]
    fn test_scramble_regroups_and_tiles_phase() {
        let mut bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8)]);
        let mut rng = seeded_rng();
        VariationEngine::default()
            .scramble(&mut bank, &mut rng, 0, 2, 1.0)
            .unwrap();
        let seq = SequenceRef::new(0, 2);

        let groups = bank.group_records(seq);
        assert!(!groups.is_empty());
        let mut offset = 0.0;
        for group in &groups {
            assert_close(group.offset, offset);
            let rows = group.start..group.start + group.events;
            let sum: f32 = rows.map(|s| bank.events().size(seq, s as usize)).sum();
            assert_close(sum, group.size);
            offset += group.size;
        }
        assert_close(offset, bank.cycles(seq) as f32);

        for (step, rec) in bank.event_records(seq).iter().enumerate() {
            let group = groups[rec.group as usize];
            assert_eq!(group.start + rec.group_step, step as u32);
        }
    }

    #[test]
    fn test_zero_probability_keeps_order() {
        let mut bank = built_bank(&[Fraction::new(3, 4), Fraction::new(2, 8)]);
        let mut rng = seeded_rng();
        VariationEngine::default()
            .scramble(&mut bank, &mut rng, 0, 1, 0.0)
            .unwrap();
        let original = bank.event_records(SequenceRef::original(0));
        let variation = bank.event_records(SequenceRef::new(0, 1));
        for (a, b) in original.iter().zip(&variation) {
            assert_close(a.size, b.size);
            assert_close(a.play_offset, b.play_offset);
        }
        assert_eq!(bank.header(SequenceRef::new(0, 1)).groups, 2);
    }

    #[test]
    fn test_join_runs_move_as_units() {
        let mut bank = built_bank(&[Fraction::new(8, 8)]);
        make_join(&mut bank, 0, 0, 2, 3).unwrap();
        let engine = VariationEngine::new(ScrambleMethod::AllowRepeats);
        let mut rng = seeded_rng();
        engine.scramble(&mut bank, &mut rng, 0, 3, 1.0).unwrap();

        let seq = SequenceRef::new(0, 3);
        let rows = bank.event_records(seq);
        let lead = rows.iter().position(|r| r.join_run == 3).unwrap();
        assert_eq!(rows[lead].source_step, 2);
        assert_eq!(rows[lead + 1].source_step, 3);
        assert_eq!(rows[lead + 2].source_step, 4);
        assert_close(rows[lead].join_size, 0.375);
    }

    #[test]
    fn test_unique_scramble_keeps_long_runs_whole() {
        let mut bank = built_bank(&[Fraction::new(8, 8), Fraction::new(3, 4)]);
        make_join(&mut bank, 0, 0, 2, 4).unwrap();
        make_join(&mut bank, 0, 1, 0, 3).unwrap();
        let engine = VariationEngine::new(ScrambleMethod::Unique);
        let original_len = bank.len(SequenceRef::original(0));

        for seed in 0..16 {
            let mut rng = rng_from(seed);
            engine.scramble(&mut bank, &mut rng, 0, 1, 1.0).unwrap();
            let seq = SequenceRef::new(0, 1);
            let rows = bank.event_records(seq);
            assert_eq!(rows.len(), original_len);

            for (first, run) in [(2u32, 4usize), (8, 3)] {
                let lead = rows
                    .iter()
                    .position(|r| r.source_step == first)
                    .unwrap();
                assert_eq!(rows[lead].join_run, run as u32, "seed {}", seed);
                for k in 1..run {
                    assert_eq!(rows[lead + k].source_step, first + k as u32, "seed {}", seed);
                    assert_eq!(rows[lead + k].join_run, 1);
                }
            }

            let mut sources: Vec<u32> = rows.iter().map(|r| r.source_step).collect();
            sources.sort_unstable();
            assert_eq!(sources, (0..original_len as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_regroup_merges_continuous_groups() {
        let mut bank = built_bank(&[Fraction::new(2, 4), Fraction::new(2, 4)]);
        assert_eq!(bank.header(SequenceRef::original(0)).groups, 2);
        let mut rng = seeded_rng();
        VariationEngine::default()
            .scramble(&mut bank, &mut rng, 0, 1, 0.0)
            .unwrap();

        let seq = SequenceRef::new(0, 1);
        let groups = bank.group_records(seq);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].numerator, 4);
        assert_eq!(groups[0].events, 4);
        assert_close(groups[0].size, 1.0);
        assert_close(groups[0].denominator, 4.0);
        assert!(bank
            .event_records(seq)
            .iter()
            .enumerate()
            .all(|(step, r)| r.group == 0 && r.group_step == step as u32));
    }

    #[test]
    fn test_same_seed_same_variation() {
        let pairs = [Fraction::new(5, 8), Fraction::new(7, 16)];
        let mut a = built_bank(&pairs);
        let mut b = built_bank(&pairs);
        let engine = VariationEngine::default();
        engine.scramble(&mut a, &mut seeded_rng(), 0, 1, 0.8).unwrap();
        engine.scramble(&mut b, &mut seeded_rng(), 0, 1, 0.8).unwrap();
        assert_eq!(
            a.event_records(SequenceRef::new(0, 1)),
            b.event_records(SequenceRef::new(0, 1))
        );
    }

    #[test]
    fn test_scramble_rejections() {
        let mut bank = built_bank(&[Fraction::new(4, 4)]);
        let engine = VariationEngine::default();
        let mut rng = seeded_rng();
        assert!(matches!(
            engine.scramble(&mut bank, &mut rng, 0, 0, 0.5),
            Err(SequencerError::OriginalProtected { .. })
        ));
        assert!(matches!(
            engine.scramble(&mut bank, &mut rng, 1, 1, 0.5),
            Err(SequencerError::Unfilled { .. })
        ));
        assert!(matches!(
            engine.scramble(&mut bank, &mut rng, 0, 9, 0.5),
            Err(SequencerError::InvalidVariation { .. })
        ));
    }

    #[test]
    fn test_copy_failure_leaves_variation_unusable() {
        let mut bank = built_bank(&[Fraction::new(4, 4)]);
        let original = SequenceRef::original(0);
        let mut rec = bank.events().record(original, 2);
        rec.size = 0.0;
        bank.events.set_record(original, 2, &rec);

        let result = VariationEngine::default().scramble(&mut bank, &mut seeded_rng(), 0, 1, 0.5);
        assert_eq!(
            result,
            Err(SequencerError::BuildFailed {
                phase: BuildPhase::Copy,
                index: 2
            })
        );
        assert!(!bank.is_playable(SequenceRef::new(0, 1)));
    }

    #[test]
    fn test_move_event_shifts_neighbours() {
        let mut bank = built_bank(&[Fraction::new(2, 4), Fraction::new(2, 8)]);
        let engine = VariationEngine::default();
        engine.scramble(&mut bank, &mut seeded_rng(), 0, 1, 0.0).unwrap();
        let seq = SequenceRef::new(0, 1);

        engine.move_event(&mut bank, 0, 1, 0, 3).unwrap();
        let rows = bank.event_records(seq);
        let order: Vec<u32> = rows.iter().map(|r| r.source_step).collect();
        assert_eq!(&order[..4], &[1, 2, 3, 0]);
        assert_close(rows[3].play_offset, 0.25 + 0.125 + 0.125);
        assert!(bank.is_playable(seq));

        engine.move_event(&mut bank, 0, 1, 3, -3).unwrap();
        let order: Vec<u32> = bank.event_records(seq).iter().map(|r| r.source_step).collect();
        assert_eq!(&order[..4], &[0, 1, 2, 3]);
    }

    #[test]
    fn test_move_event_rejections() {
        let mut bank = built_bank(&[Fraction::new(4, 4)]);
        let engine = VariationEngine::default();
        assert!(matches!(
            engine.move_event(&mut bank, 0, 0, 0, 1),
            Err(SequencerError::OriginalProtected { .. })
        ));
        engine.scramble(&mut bank, &mut seeded_rng(), 0, 1, 0.0).unwrap();
        assert!(matches!(
            engine.move_event(&mut bank, 0, 1, 1, -2),
            Err(SequencerError::MoveOutOfRange { .. })
        ));
        assert!(matches!(
            engine.move_event(&mut bank, 0, 1, 3, 1),
            Err(SequencerError::MoveOutOfRange { .. })
        ));
    }
}
