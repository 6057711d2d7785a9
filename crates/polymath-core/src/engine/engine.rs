//! PolyMathEngine - sequence bank, editors and transport behind one owner

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::SequencerConfig;
use crate::error::SequencerResult;
use crate::sequence::{
    error_value, group_scramble, make_join, read_field, read_field_into, set_joins, AccentEdit,
    BuildReport,
    FieldCode, GroupScrambleMode, ScrambleMethod, SequenceBank, SlotBuilder, VariationEngine,
};
use crate::types::{Fraction, Sample, SequenceRef};

use super::command::SequencerCommand;
use super::report::{report_channel, EngineReport};
use super::transport::{TransportAtomics, TransportEngine, TransportSettings};

/// The polyrhythmic sequencer
///
/// Owns every table and the transport that plays them. Control methods
/// validate, log rejected requests at `warn` and return the error; the
/// audio path ([`process`](Self::process)) never fails.
///
/// Hosts that run control and audio on different threads push
/// [`SequencerCommand`]s and call [`process_commands`](Self::process_commands)
/// at the start of each block. Hosts that already serialise the two can call
/// the control methods directly.
pub struct PolyMathEngine {
    bank: SequenceBank,
    builder: SlotBuilder,
    variations: VariationEngine,
    transport: TransportEngine,
    rng: ChaCha8Rng,
    reports: rtrb::Producer<EngineReport>,
}

impl PolyMathEngine {
    /// Create an engine and the consumer end of its report queue
    pub fn new(config: &SequencerConfig) -> (Self, rtrb::Consumer<EngineReport>) {
        let (reports, report_rx) = report_channel();
        let seed = config.seed.unwrap_or_else(clock_seed);
        log::info!(
            "engine: {} slots, {} variations, scramble seed {}",
            config.capacity.slots,
            config.capacity.variations,
            seed
        );

        let engine = Self {
            bank: SequenceBank::new(config.capacity),
            builder: SlotBuilder::from_config(config),
            variations: VariationEngine::new(config.scramble_method),
            transport: TransportEngine::new(
                TransportSettings::from_config(config),
                Arc::new(TransportAtomics::new()),
            ),
            rng: ChaCha8Rng::seed_from_u64(seed),
            reports,
        };
        (engine, report_rx)
    }

    pub fn bank(&self) -> &SequenceBank {
        &self.bank
    }

    pub fn transport(&self) -> &TransportEngine {
        &self.transport
    }

    pub fn builder(&self) -> &SlotBuilder {
        &self.builder
    }

    /// Lock-free playback state for UI polling
    pub fn atomics(&self) -> Arc<TransportAtomics> {
        self.transport.atomics()
    }

    // ─────────────────────────────────────────────────────────────
    // Slot building
    // ─────────────────────────────────────────────────────────────

    pub fn set_groups(&mut self, slot: usize, pairs: &[Fraction]) -> SequencerResult<BuildReport> {
        logged("setGroups", self.builder.build(&mut self.bank, slot, pairs))
    }

    pub fn add_group(&mut self, slot: usize, fraction: Fraction) -> SequencerResult<BuildReport> {
        logged("addGroup", self.builder.add_group(&mut self.bank, slot, fraction))
    }

    pub fn init_slot(&mut self, slot: usize) -> SequencerResult<()> {
        logged("initSlot", self.bank.init_slot(slot))
    }

    // ─────────────────────────────────────────────────────────────
    // Joins
    // ─────────────────────────────────────────────────────────────

    pub fn make_join(
        &mut self,
        slot: usize,
        group: usize,
        location: usize,
        length: usize,
    ) -> SequencerResult<()> {
        logged(
            "makeJoin",
            make_join(&mut self.bank, slot, group, location, length),
        )
    }

    pub fn set_joins(&mut self, slot: usize, group: usize, counts: &[usize]) -> SequencerResult<()> {
        logged("setJoins", set_joins(&mut self.bank, slot, group, counts))
    }

    // ─────────────────────────────────────────────────────────────
    // Variations
    // ─────────────────────────────────────────────────────────────

    pub fn scramble(&mut self, slot: usize, variation: usize, probability: f32) -> SequencerResult<()> {
        let result =
            self.variations
                .scramble(&mut self.bank, &mut self.rng, slot, variation, probability);
        logged("scramble", result)
    }

    pub fn group_scramble(
        &mut self,
        slot: usize,
        source: usize,
        dest: usize,
        mode: GroupScrambleMode,
    ) -> SequencerResult<()> {
        let result = group_scramble(&mut self.bank, &mut self.rng, slot, source, dest, mode);
        logged("groupScramble", result)
    }

    pub fn move_event(
        &mut self,
        slot: usize,
        variation: usize,
        location: usize,
        shift: isize,
    ) -> SequencerResult<()> {
        let result = self
            .variations
            .move_event(&mut self.bank, slot, variation, location, shift);
        logged("moveEvent", result)
    }

    pub fn set_accent(
        &mut self,
        slot: usize,
        step: usize,
        channel: usize,
        edit: AccentEdit,
    ) -> SequencerResult<()> {
        logged("setAccent", self.bank.set_accent(slot, step, channel, edit))
    }

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────

    pub fn jump_to(&mut self, slot: usize, variation: usize) -> SequencerResult<()> {
        let target = SequenceRef::new(slot, variation);
        logged("jumpTo", self.transport.jump_to(&self.bank, target))
    }

    pub fn jump_next(&mut self, slot: usize, variation: usize) -> SequencerResult<()> {
        let target = SequenceRef::new(slot, variation);
        logged("jumpNext", self.transport.jump_next(&self.bank, target))
    }

    pub fn reset_phase(&mut self) {
        self.transport.reset_phase();
    }

    /// Read one table column by host field code
    pub fn sequence_field(&self, slot: usize, variation: usize, code: i32) -> SequencerResult<Vec<f32>> {
        let seq = SequenceRef::new(slot, variation);
        let result = FieldCode::from_code(code)
            .and_then(|field| read_field(&self.bank, seq, field, self.transport.current()));
        logged("getSequence", result)
    }

    /// Read one table column into `values` without growing it
    ///
    /// `values` should come from [`field_buffer`](super::field_buffer).
    pub fn sequence_field_into(
        &self,
        slot: usize,
        variation: usize,
        code: i32,
        values: &mut Vec<f32>,
    ) -> SequencerResult<()> {
        let seq = SequenceRef::new(slot, variation);
        let result = FieldCode::from_code(code).and_then(|field| {
            read_field_into(&self.bank, seq, field, self.transport.current(), values)
        });
        logged("getSequence", result)
    }

    // ─────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────

    pub fn set_bpm(&mut self, bpm: f32) -> SequencerResult<()> {
        logged("bpm", self.transport.set_bpm(bpm))
    }

    pub fn set_pre_change(&mut self, percent: f32) {
        self.transport.set_pre_change(percent);
    }

    pub fn set_alt_out(&mut self, n: usize) {
        self.transport.set_alt_out(n);
    }

    pub fn set_multiply(&mut self, multiply: bool) {
        self.transport.set_multiply(multiply);
    }

    pub fn set_scramble_method(&mut self, method: ScrambleMethod) {
        self.variations.method = method;
    }

    pub fn set_size_threshold(&mut self, threshold: f32) {
        self.builder.set_size_threshold(threshold);
        self.transport
            .set_report_threshold(self.builder.size_threshold());
    }

    pub fn set_size_frac(&mut self, frac: f32) {
        self.builder.set_size_frac(frac);
    }

    pub fn set_auto_threshold(&mut self, enabled: bool) {
        self.builder.set_auto_threshold(enabled);
    }

    // ─────────────────────────────────────────────────────────────
    // Command queue
    // ─────────────────────────────────────────────────────────────

    /// Drain and apply every pending command
    ///
    /// Rejected commands are answered with [`EngineReport::CommandFailed`].
    pub fn process_commands(&mut self, commands: &mut rtrb::Consumer<SequencerCommand>) {
        while let Ok(cmd) = commands.pop() {
            let command = cmd.name();
            if let Err(error) = self.apply(cmd) {
                self.report(EngineReport::CommandFailed { command, error });
            }
        }
    }

    /// Apply one command
    ///
    /// `GetSequence` always answers with a [`EngineReport::SequenceData`],
    /// carrying an error code instead of data when the read fails.
    pub fn apply(&mut self, cmd: SequencerCommand) -> SequencerResult<()> {
        match cmd {
            SequencerCommand::SetGroups { slot, pairs } => {
                let report = self.set_groups(slot, &pairs)?;
                self.report(EngineReport::Built {
                    slot,
                    report: report.into(),
                });
            }
            SequencerCommand::AddGroup { slot, fraction } => {
                let report = self.add_group(slot, fraction)?;
                self.report(EngineReport::Built {
                    slot,
                    report: report.into(),
                });
            }
            SequencerCommand::InitSlot { slot } => self.init_slot(slot)?,
            SequencerCommand::MakeJoin {
                slot,
                group,
                location,
                length,
            } => self.make_join(slot, group, location, length)?,
            SequencerCommand::SetJoins {
                slot,
                group,
                counts,
            } => self.set_joins(slot, group, &counts)?,
            SequencerCommand::Scramble {
                slot,
                variation,
                probability,
            } => self.scramble(slot, variation, probability)?,
            SequencerCommand::GroupScramble {
                slot,
                source,
                dest,
                mode,
            } => self.group_scramble(slot, source, dest, mode)?,
            SequencerCommand::MoveEvent {
                slot,
                variation,
                location,
                shift,
            } => self.move_event(slot, variation, location, shift)?,
            SequencerCommand::SetAccent {
                slot,
                step,
                channel,
                edit,
            } => self.set_accent(slot, step, channel, edit)?,
            SequencerCommand::JumpTo { slot, variation } => self.jump_to(slot, variation)?,
            SequencerCommand::JumpNext { slot, variation } => self.jump_next(slot, variation)?,
            SequencerCommand::ResetPhase => self.reset_phase(),
            SequencerCommand::GetSequence {
                slot,
                variation,
                code,
                mut values,
            } => {
                if let Err(e) = self.sequence_field_into(slot, variation, code, &mut values) {
                    values.clear();
                    values.push(error_value(&e));
                }
                self.report(EngineReport::SequenceData {
                    slot,
                    variation,
                    code,
                    values,
                });
            }
            SequencerCommand::SetBpm(bpm) => self.set_bpm(bpm)?,
            SequencerCommand::SetPreChange(percent) => self.set_pre_change(percent),
            SequencerCommand::SetAltOut(n) => self.set_alt_out(n),
            SequencerCommand::SetMultiply(multiply) => self.set_multiply(multiply),
            SequencerCommand::SetScrambleMethod(method) => self.set_scramble_method(method),
            SequencerCommand::SetSizeThreshold(threshold) => self.set_size_threshold(threshold),
            SequencerCommand::SetSizeFrac(frac) => self.set_size_frac(frac),
            SequencerCommand::SetAutoThreshold(enabled) => self.set_auto_threshold(enabled),
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Audio
    // ─────────────────────────────────────────────────────────────

    /// Render one block of the three phase outputs from the input ramp
    pub fn process(
        &mut self,
        input: &[Sample],
        out: &mut [Sample],
        alt: &mut [Sample],
        offset: &mut [Sample],
    ) {
        self.transport
            .process(&self.bank, input, out, alt, offset, &mut self.reports);
    }

    fn report(&mut self, report: EngineReport) {
        if self.reports.push(report).is_err() {
            self.transport
                .atomics()
                .dropped_reports
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn logged<T>(command: &str, result: SequencerResult<T>) -> SequencerResult<T> {
    if let Err(e) = &result {
        log::warn!("{}: {}", command, e);
    }
    result
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
