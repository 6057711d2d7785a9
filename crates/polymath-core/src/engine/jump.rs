//! Jump scheduling between sequences
//!
//! Source and target sequences can span different numbers of ramp cycles,
//! so switching at the next wrap would drop the target in at an arbitrary
//! musical position. The locator instead walks the target's emitted events,
//! lap after lap, and picks the first one that starts after the current
//! total phase. The transport fires the jump when the ramp reaches it.
//!
//! ```text
//! current  |----0----|----1----|      total phase = 1.30
//! target   |--0--|--1--|--0--|--1--|  (1 cycle, events at 0.0 and 0.5)
//!                              ^ shot = 1.5  (lap 1, step 1, wrap_sub 1)
//! ```

use crate::sequence::SequenceBank;
use crate::types::SequenceRef;

/// Laps of the target walked before giving up on a crossing
const MAX_LAPS: u32 = 256;

/// When a pending jump fires
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JumpTiming {
    /// At the next ramp wrap
    AtWrap,
    /// When the current sequence ends
    AtEnd,
    /// Mid-cycle, once `ramp + cycle >= shot`
    Crossing {
        /// Total phase (current frame) where the jump happens
        shot: f64,
        /// Whole cycles subtracted from the cycle counter on arrival
        wrap_sub: i64,
        /// Target step entered on arrival
        step: usize,
    },
}

/// A jump waiting for its moment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingJump {
    pub target: SequenceRef,
    pub timing: JumpTiming,
}

/// First emitted target event starting strictly after `position`
///
/// `position` is the current total phase (`ramp + cycle`). The target must
/// be playable.
pub fn locate_crossing(bank: &SequenceBank, target: SequenceRef, position: f64) -> JumpTiming {
    let len = bank.len(target);
    let cycles = bank.cycles(target) as i64;
    if len == 0 {
        return JumpTiming::AtWrap;
    }
    for lap in 0..MAX_LAPS as i64 {
        let base = lap * cycles;
        let mut step = 0;
        while step < len {
            let candidate = base as f64 + bank.events().play_offset(target, step) as f64;
            if candidate > position {
                return JumpTiming::Crossing {
                    shot: candidate,
                    wrap_sub: base,
                    step,
                };
            }
            step += (bank.events().join_run(target, step).max(1) as usize).min(len - step);
        }
    }
    JumpTiming::AtWrap
}

impl JumpTiming {
    /// Shift a crossing into the next pass of the current sequence
    ///
    /// Called when the current sequence restarts before the crossing fired.
    pub fn carried(self, cycles: u32) -> Self {
        match self {
            JumpTiming::Crossing {
                shot,
                wrap_sub,
                step,
            } => JumpTiming::Crossing {
                shot: shot - cycles as f64,
                wrap_sub: wrap_sub - cycles as i64,
                step,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::test_support::small_bank;
    use crate::sequence::{make_join, SlotBuilder};
    use crate::types::Fraction;

    #[test]
    fn test_crossing_in_later_lap() {
        let mut bank = small_bank();
        SlotBuilder::default()
            .build(&mut bank, 1, &[Fraction::new(2, 2)])
            .unwrap();
        let target = SequenceRef::original(1);
        assert_eq!(
            locate_crossing(&bank, target, 1.3),
            JumpTiming::Crossing {
                shot: 1.5,
                wrap_sub: 1,
                step: 1
            }
        );
    }

    #[test]
    fn test_crossing_is_strictly_ahead() {
        let mut bank = small_bank();
        SlotBuilder::default()
            .build(&mut bank, 1, &[Fraction::new(4, 4)])
            .unwrap();
        let target = SequenceRef::original(1);
        for i in 0..40 {
            let position = i as f64 * 0.05;
            match locate_crossing(&bank, target, position) {
                JumpTiming::Crossing { shot, wrap_sub, step } => {
                    assert!(shot > position);
                    assert!(shot - position <= 0.25 + 1e-9);
                    let arrival = shot - wrap_sub as f64;
                    assert!((arrival - bank.events().play_offset(target, step) as f64).abs() < 1e-6);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_followers_are_not_landing_points() {
        let mut bank = small_bank();
        SlotBuilder::default()
            .build(&mut bank, 1, &[Fraction::new(4, 4)])
            .unwrap();
        make_join(&mut bank, 1, 0, 0, 3).unwrap();
        let target = SequenceRef::original(1);
        match locate_crossing(&bank, target, 0.1) {
            JumpTiming::Crossing { step, shot, .. } => {
                assert_eq!(step, 3);
                assert!((shot - 0.75).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_carry_keeps_arrival_frame() {
        let timing = JumpTiming::Crossing {
            shot: 2.5,
            wrap_sub: 2,
            step: 1,
        };
        assert_eq!(
            timing.carried(2),
            JumpTiming::Crossing {
                shot: 0.5,
                wrap_sub: 0,
                step: 1
            }
        );
        assert_eq!(JumpTiming::AtEnd.carried(3), JumpTiming::AtEnd);
    }
}
