//! Table read-back by numeric field code
//!
//! Hosts address table columns with small integer codes. [`FieldCode`]
//! keeps those codes at the boundary and maps each one to a typed accessor.
//!
//! | code      | column                                                   |
//! |-----------|----------------------------------------------------------|
//! | 0..=5     | event offset, size, group step, group number, join run, join size |
//! | 11..=26   | accents: param 1, event 1, param 2, event 2, ...          |
//! | 91        | summary `{type, groups, cycles, len, remainder, 0}`      |
//! | 92..=96   | group numerators, denominators, offsets, sizes, starts   |
//! | 98        | `{slot, len}`                                            |
//! | 99        | `{slot, variation}` currently playing                    |

use crate::error::{SequencerError, SequencerResult};
use crate::types::{Capacity, SequenceRef, ACCENT_CHANNELS};

use super::bank::SequenceBank;
use super::table::{EventTable, GroupTable};

/// Value reported in place of data for an unfilled sequence
pub const UNFILLED_CODE: f32 = -1.0;

/// Value reported in place of data for an unknown field code
pub const UNKNOWN_FIELD_CODE: f32 = -2.0;

const ACCENT_BASE: i32 = 11;

/// A readable column or summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCode {
    EventOffset,
    EventSize,
    GroupStep,
    GroupNumber,
    JoinRun,
    JoinSize,
    /// Parameter side of a 1-based accent channel
    ParamAccent(u8),
    /// Event side of a 1-based accent channel
    EventAccent(u8),
    GroupSummary,
    Numerators,
    Denominators,
    GroupOffsets,
    GroupSizes,
    GroupStarts,
    SlotLength,
    Playing,
}

type EventColumn = fn(&EventTable, SequenceRef, usize) -> f32;
type GroupColumn = fn(&GroupTable, SequenceRef, usize) -> f32;

impl FieldCode {
    pub fn from_code(code: i32) -> SequencerResult<Self> {
        let field = match code {
            0 => FieldCode::EventOffset,
            1 => FieldCode::EventSize,
            2 => FieldCode::GroupStep,
            3 => FieldCode::GroupNumber,
            4 => FieldCode::JoinRun,
            5 => FieldCode::JoinSize,
            c if (ACCENT_BASE..ACCENT_BASE + 2 * ACCENT_CHANNELS as i32).contains(&c) => {
                let k = c - ACCENT_BASE;
                let channel = (k / 2 + 1) as u8;
                if k % 2 == 0 {
                    FieldCode::ParamAccent(channel)
                } else {
                    FieldCode::EventAccent(channel)
                }
            }
            91 => FieldCode::GroupSummary,
            92 => FieldCode::Numerators,
            93 => FieldCode::Denominators,
            94 => FieldCode::GroupOffsets,
            95 => FieldCode::GroupSizes,
            96 => FieldCode::GroupStarts,
            98 => FieldCode::SlotLength,
            99 => FieldCode::Playing,
            other => return Err(SequencerError::UnknownField(other)),
        };
        Ok(field)
    }

    pub fn code(&self) -> i32 {
        match self {
            FieldCode::EventOffset => 0,
            FieldCode::EventSize => 1,
            FieldCode::GroupStep => 2,
            FieldCode::GroupNumber => 3,
            FieldCode::JoinRun => 4,
            FieldCode::JoinSize => 5,
            FieldCode::ParamAccent(ch) => ACCENT_BASE + 2 * (*ch as i32 - 1),
            FieldCode::EventAccent(ch) => ACCENT_BASE + 2 * (*ch as i32 - 1) + 1,
            FieldCode::GroupSummary => 91,
            FieldCode::Numerators => 92,
            FieldCode::Denominators => 93,
            FieldCode::GroupOffsets => 94,
            FieldCode::GroupSizes => 95,
            FieldCode::GroupStarts => 96,
            FieldCode::SlotLength => 98,
            FieldCode::Playing => 99,
        }
    }

    fn event_column(&self) -> Option<EventColumn> {
        let column: EventColumn = match self {
            FieldCode::EventOffset => |t, s, i| t.play_offset(s, i),
            FieldCode::EventSize => |t, s, i| t.size(s, i),
            FieldCode::GroupStep => |t, s, i| t.group_step(s, i) as f32,
            FieldCode::GroupNumber => |t, s, i| t.group(s, i) as f32,
            FieldCode::JoinRun => |t, s, i| t.join_run(s, i) as f32,
            FieldCode::JoinSize => |t, s, i| t.join_size(s, i),
            _ => return None,
        };
        Some(column)
    }

    fn group_column(&self) -> Option<GroupColumn> {
        let column: GroupColumn = match self {
            FieldCode::Numerators => |t, s, g| t.numerator(s, g) as f32,
            FieldCode::Denominators => |t, s, g| t.denominator(s, g),
            FieldCode::GroupOffsets => |t, s, g| t.offset(s, g),
            FieldCode::GroupSizes => |t, s, g| t.size(s, g),
            FieldCode::GroupStarts => |t, s, g| t.start(s, g) as f32,
            _ => return None,
        };
        Some(column)
    }
}

/// Values in the [`FieldCode::GroupSummary`] answer
pub const SUMMARY_LEN: usize = 6;

/// Longest answer any field can produce for a bank of `capacity`
pub fn field_capacity(capacity: &Capacity) -> usize {
    capacity.max_events.max(capacity.max_groups).max(SUMMARY_LEN)
}

/// Read one field of `seq`
///
/// `playing` answers [`FieldCode::Playing`]. Every other field except
/// [`FieldCode::SlotLength`] requires a filled sequence.
pub fn read_field(
    bank: &SequenceBank,
    seq: SequenceRef,
    field: FieldCode,
    playing: SequenceRef,
) -> SequencerResult<Vec<f32>> {
    let mut values = Vec::with_capacity(field_capacity(bank.capacity()));
    read_field_into(bank, seq, field, playing, &mut values)?;
    Ok(values)
}

/// Read one field of `seq` into `out`
///
/// `out` is cleared first. A buffer with at least [`field_capacity`] room
/// never grows, so this is safe to call from the audio thread.
pub fn read_field_into(
    bank: &SequenceBank,
    seq: SequenceRef,
    field: FieldCode,
    playing: SequenceRef,
    out: &mut Vec<f32>,
) -> SequencerResult<()> {
    out.clear();
    bank.check(seq)?;
    match field {
        FieldCode::SlotLength => {
            out.extend([seq.slot as f32, bank.len(seq) as f32]);
            return Ok(());
        }
        FieldCode::Playing => {
            out.extend([playing.slot as f32, playing.variation as f32]);
            return Ok(());
        }
        _ => {}
    }
    bank.require_filled(seq)?;

    let header = bank.header(seq);
    if let Some(column) = field.event_column() {
        out.extend((0..header.len).map(|i| column(bank.events(), seq, i)));
        return Ok(());
    }
    if let Some(column) = field.group_column() {
        out.extend((0..header.groups).map(|g| column(bank.groups(), seq, g)));
        return Ok(());
    }
    match field {
        FieldCode::ParamAccent(ch) => {
            out.extend((0..header.len).map(|i| bank.accents(seq, i)[ch as usize - 1].param))
        }
        FieldCode::EventAccent(ch) => {
            out.extend((0..header.len).map(|i| bank.accents(seq, i)[ch as usize - 1].event))
        }
        FieldCode::GroupSummary => out.extend([
            0.0,
            header.groups as f32,
            header.cycles as f32,
            header.len as f32,
            header.remainder,
            0.0,
        ]),
        _ => return Err(SequencerError::UnknownField(field.code())),
    }
    Ok(())
}

/// Host value standing in for a failed read
pub fn error_value(err: &SequencerError) -> f32 {
    match err {
        SequencerError::Unfilled { .. } => UNFILLED_CODE,
        _ => UNKNOWN_FIELD_CODE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::test_support::built_bank;
    use crate::sequence::AccentEdit;
    use crate::types::Fraction;

    #[test]
    fn test_codes_round_trip_through_enum() {
        for code in (0..=5).chain(11..=26).chain(91..=96).chain(98..=99) {
            assert_eq!(FieldCode::from_code(code).unwrap().code(), code);
        }
        assert_eq!(FieldCode::from_code(11).unwrap(), FieldCode::ParamAccent(1));
        assert_eq!(FieldCode::from_code(26).unwrap(), FieldCode::EventAccent(8));
        assert!(FieldCode::from_code(6).is_err());
        assert!(FieldCode::from_code(97).is_err());
    }

    #[test]
    fn test_read_event_columns() {
        let bank = built_bank(&[Fraction::new(4, 4)]);
        let seq = SequenceRef::original(0);
        let playing = SequenceRef::default();
        assert_eq!(
            read_field(&bank, seq, FieldCode::EventOffset, playing).unwrap(),
            vec![0.0, 0.25, 0.5, 0.75]
        );
        assert_eq!(
            read_field(&bank, seq, FieldCode::EventSize, playing).unwrap(),
            vec![0.25; 4]
        );
        assert_eq!(
            read_field(&bank, seq, FieldCode::GroupStep, playing).unwrap(),
            vec![0.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_read_summary_and_groups() {
        let bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8)]);
        let seq = SequenceRef::original(0);
        let playing = SequenceRef::default();
        let summary = read_field(&bank, seq, FieldCode::GroupSummary, playing).unwrap();
        assert_eq!(summary[..4], [0.0, 3.0, 2.0, 8.0]);
        assert!((summary[4] - 0.625).abs() < 1e-5);
        assert_eq!(
            read_field(&bank, seq, FieldCode::Numerators, playing).unwrap(),
            vec![4.0, 3.0, 1.0]
        );
        assert_eq!(
            read_field(&bank, seq, FieldCode::GroupStarts, playing).unwrap(),
            vec![0.0, 4.0, 7.0]
        );
    }

    #[test]
    fn test_read_accents() {
        let mut bank = built_bank(&[Fraction::new(2, 2)]);
        bank.set_accent(0, 1, 3, AccentEdit::Both { param: 0.5, event: 2.0 })
            .unwrap();
        let seq = SequenceRef::original(0);
        let playing = SequenceRef::default();
        assert_eq!(
            read_field(&bank, seq, FieldCode::ParamAccent(3), playing).unwrap(),
            vec![-1.0, 0.5]
        );
        assert_eq!(
            read_field(&bank, seq, FieldCode::EventAccent(3), playing).unwrap(),
            vec![0.0, 2.0]
        );
    }

    #[test]
    fn test_unfilled_and_status_fields() {
        let bank = built_bank(&[Fraction::new(2, 2)]);
        let empty = SequenceRef::new(0, 3);
        let playing = SequenceRef::new(0, 2);
        let err = read_field(&bank, empty, FieldCode::EventSize, playing).unwrap_err();
        assert_eq!(error_value(&err), UNFILLED_CODE);
        assert_eq!(
            read_field(&bank, empty, FieldCode::SlotLength, playing).unwrap(),
            vec![0.0, 0.0]
        );
        assert_eq!(
            read_field(&bank, empty, FieldCode::Playing, playing).unwrap(),
            vec![0.0, 2.0]
        );
        assert_eq!(
            error_value(&SequencerError::UnknownField(42)),
            UNKNOWN_FIELD_CODE
        );
    }

    #[test]
    fn test_read_into_reuses_buffer() {
        let bank = built_bank(&[Fraction::new(4, 4), Fraction::new(3, 8)]);
        let seq = SequenceRef::original(0);
        let playing = SequenceRef::default();
        let mut out = Vec::with_capacity(field_capacity(bank.capacity()));
        let ptr = out.as_ptr();
        let room = out.capacity();

        read_field_into(&bank, seq, FieldCode::EventSize, playing, &mut out).unwrap();
        assert_eq!(out.len(), bank.len(seq));
        read_field_into(&bank, seq, FieldCode::Numerators, playing, &mut out).unwrap();
        assert_eq!(out, vec![4.0, 3.0, 1.0]);
        assert!(read_field_into(&bank, SequenceRef::original(1), FieldCode::EventSize, playing, &mut out).is_err());
        assert!(out.is_empty());

        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(out.capacity(), room);
    }
}
