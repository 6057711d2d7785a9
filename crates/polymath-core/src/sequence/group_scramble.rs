//! Group-level scrambling
//!
//! Rearranges whole groups of a sequence into a variation. Only the
//! derangement mode is implemented: it uses Sattolo's shuffle, which yields a
//! single cycle over all groups, so with more than one group no group keeps
//! its position.

use rand::Rng;

use crate::error::{SequencerError, SequencerResult};
use crate::types::SequenceRef;

use super::bank::{SequenceBank, SequenceHeader};
use super::table::GroupRecord;

/// Group scramble modes, by host code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupScrambleMode {
    /// Scramble each group with a probability (code 0)
    Probabilistic,
    /// Scramble an exact number of groups (code 1)
    ExactCount,
    /// Move every group away from its position (code 2)
    #[default]
    Derangement,
}

impl GroupScrambleMode {
    pub fn from_code(code: u8) -> SequencerResult<Self> {
        match code {
            0 => Ok(GroupScrambleMode::Probabilistic),
            1 => Ok(GroupScrambleMode::ExactCount),
            2 => Ok(GroupScrambleMode::Derangement),
            other => Err(SequencerError::UnknownMode(other)),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            GroupScrambleMode::Probabilistic => 0,
            GroupScrambleMode::ExactCount => 1,
            GroupScrambleMode::Derangement => 2,
        }
    }
}

/// Write a group-scrambled copy of `source` into variation `dest` of `slot`
///
/// `source` may be the original (0) or any usable variation; the
/// destination must be a variation. Unimplemented modes log and change
/// nothing.
pub fn group_scramble<R: Rng + ?Sized>(
    bank: &mut SequenceBank,
    rng: &mut R,
    slot: usize,
    source: usize,
    dest: usize,
    mode: GroupScrambleMode,
) -> SequencerResult<()> {
    let from = SequenceRef::new(slot, source);
    let to = SequenceRef::new(slot, dest);
    bank.check(from)?;
    bank.check(to)?;
    if to.is_original() {
        return Err(SequencerError::OriginalProtected {
            action: "group scramble into",
        });
    }
    if mode != GroupScrambleMode::Derangement {
        log::warn!("groupScramble mode {}: not yet implemented", mode.code());
        return Err(SequencerError::NotImplemented(mode.code()));
    }
    bank.require_filled(from)?;

    let header = *bank.header(from);
    let n = header.groups;

    let mut order = std::mem::take(&mut bank.scratch.order);
    order.clear();
    order.extend(0..n);
    for i in (1..n).rev() {
        let j = rng.gen_range(0..i);
        order.swap(i, j);
    }

    let mut groups = std::mem::take(&mut bank.scratch.group_records);
    let mut records = std::mem::take(&mut bank.scratch.records);
    groups.clear();
    records.clear();

    let mut running = 0.0f64;
    for (position, &g) in order.iter().enumerate() {
        let group = bank.groups.record(from, g);
        let start = records.len();
        for (group_step, step) in (group.start..group.start + group.events).enumerate() {
            let mut rec = bank.events.record(from, step as usize);
            rec.group = position as u32;
            rec.group_step = group_step as u32;
            records.push(rec);
        }
        groups.push(GroupRecord {
            offset: running as f32,
            start: start as u32,
            ..group
        });
        running += group.size as f64;
    }

    // Rows are staged before writing so source and destination may alias
    bank.header_mut(to).usable = false;
    for (step, rec) in records.iter().enumerate() {
        bank.events.set_record(to, step, rec);
    }
    for (g, group) in groups.iter().enumerate() {
        bank.groups.set_record(to, g, group);
    }
    *bank.header_mut(to) = SequenceHeader {
        usable: false,
        remainder_group: None,
        ..header
    };

    bank.scratch.order = order;
    bank.scratch.group_records = groups;
    bank.scratch.records = records;

    bank.recompute_offsets(to)?;
    bank.header_mut(to).usable = true;
    log::info!("scramble: {} groups of {} deranged into {}", n, from, to);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::test_support::{assert_close, built_bank, rng_from, seeded_rng};
    use crate::types::Fraction;

    fn pairs() -> [Fraction; 4] {
        [
            Fraction::new(1, 2),
            Fraction::new(2, 3),
            Fraction::new(3, 5),
            Fraction::new(1, 7),
        ]
    }

    #[test]
    fn test_no_group_keeps_its_position() {
        let original = SequenceRef::original(0);
        let dest = SequenceRef::new(0, 4);
        for seed in 0..20u64 {
            let mut bank = built_bank(&pairs());
            let mut rng = rng_from(seed);
            group_scramble(&mut bank, &mut rng, 0, 0, 4, GroupScrambleMode::Derangement)
                .unwrap();

            let groups = bank.header(original).groups;
            assert_eq!(bank.header(dest).groups, groups);
            for g in 0..groups {
                let first = bank.groups().start(dest, g) as usize;
                let moved_from = bank.events().source_step(dest, first);
                assert_ne!(moved_from, bank.groups().start(original, g));
            }
        }
    }

    #[test]
    fn test_groups_are_permuted_not_lost() {
        let mut bank = built_bank(&pairs());
        group_scramble(&mut bank, &mut seeded_rng(), 0, 0, 1, GroupScrambleMode::Derangement)
            .unwrap();
        let original = SequenceRef::original(0);
        let dest = SequenceRef::new(0, 1);

        let mut a: Vec<(u32, u32)> = bank
            .group_records(original)
            .iter()
            .map(|g| (g.numerator, g.events))
            .collect();
        let mut b: Vec<(u32, u32)> = bank
            .group_records(dest)
            .iter()
            .map(|g| (g.numerator, g.events))
            .collect();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);

        assert_eq!(bank.len(dest), bank.len(original));
        assert_eq!(bank.cycles(dest), bank.cycles(original));
        let last = bank.len(dest) - 1;
        let end = bank.events().play_offset(dest, last) + bank.events().size(dest, last);
        assert_close(end, bank.cycles(dest) as f32);
        assert!(bank.is_playable(dest));
    }

    #[test]
    fn test_single_group_is_copied() {
        let mut bank = built_bank(&[Fraction::new(4, 4)]);
        group_scramble(&mut bank, &mut seeded_rng(), 0, 0, 2, GroupScrambleMode::Derangement)
            .unwrap();
        assert_eq!(
            bank.event_records(SequenceRef::new(0, 2)),
            bank.event_records(SequenceRef::original(0))
        );
    }

    #[test]
    fn test_unimplemented_modes_change_nothing() {
        let mut bank = built_bank(&pairs());
        for mode in [GroupScrambleMode::Probabilistic, GroupScrambleMode::ExactCount] {
            let result = group_scramble(&mut bank, &mut seeded_rng(), 0, 0, 1, mode);
            assert_eq!(result, Err(SequencerError::NotImplemented(mode.code())));
        }
        assert!(!bank.is_playable(SequenceRef::new(0, 1)));
    }

    #[test]
    fn test_destination_must_be_variation() {
        let mut bank = built_bank(&pairs());
        assert!(matches!(
            group_scramble(&mut bank, &mut seeded_rng(), 0, 1, 0, GroupScrambleMode::Derangement),
            Err(SequencerError::OriginalProtected { .. })
        ));
        assert_eq!(GroupScrambleMode::from_code(7), Err(SequencerError::UnknownMode(7)));
    }
}
