//! Sequence storage and control-path editors
//!
//! Everything here runs on the control side. The transport reads the bank
//! but never calls into these editors.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    SequenceBank                       │
//! │  EventTable / GroupTable arenas + per-sequence headers│
//! └──────▲──────────▲───────────▲──────────────▲──────────┘
//!        │          │           │              │
//!   SlotBuilder   join     VariationEngine  group_scramble
//!   (build,       (make,   (scramble,       (derangement)
//!    add_group)    set)     move_event)
//!                                              field::read_field ──▶ host
//! ```

mod bank;
mod builder;
mod field;
mod group_scramble;
mod join;
mod table;
mod variation;

pub use bank::{AccentEdit, SequenceBank, SequenceHeader};
pub use builder::{BuildReport, SlotBuilder, DEFAULT_SIZE_FRAC, DEFAULT_SIZE_THRESHOLD, MIN_SIZE_THRESHOLD};
pub use field::{
    error_value, field_capacity, read_field, read_field_into, FieldCode, SUMMARY_LEN, UNFILLED_CODE,
    UNKNOWN_FIELD_CODE,
};
pub use group_scramble::{group_scramble, GroupScrambleMode};
pub use join::{compact_joins, make_join, set_joins};
pub use table::{EventRecord, EventTable, GroupRecord, GroupTable};
pub use variation::{swap_count, ScrambleMethod, VariationEngine};

#[cfg(test)]
pub(crate) mod test_support {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{SequenceBank, SlotBuilder};
    use crate::types::{Capacity, Fraction};

    pub(crate) fn small_capacity() -> Capacity {
        Capacity {
            slots: 4,
            variations: 6,
            max_events: 64,
            max_groups: 16,
        }
    }

    pub(crate) fn small_bank() -> SequenceBank {
        SequenceBank::new(small_capacity())
    }

    /// Bank with slot 0 built from `pairs`
    pub(crate) fn built_bank(pairs: &[Fraction]) -> SequenceBank {
        let mut bank = small_bank();
        SlotBuilder::default().build(&mut bank, 0, pairs).unwrap();
        bank
    }

    pub(crate) fn rng_from(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    pub(crate) fn seeded_rng() -> ChaCha8Rng {
        rng_from(7)
    }

    pub(crate) fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-5,
            "expected {}, got {}",
            expected,
            actual
        );
    }
}
