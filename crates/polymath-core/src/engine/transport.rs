//! Transport - per-sample sequence playback driven by a host ramp
//!
//! The host feeds a ramp that rises 0→1 and wraps once per cycle. The
//! transport tracks how many wraps it has seen inside the current sequence
//! (`cycle`), so `ramp + cycle` is the total phase inside a sequence that may
//! span several cycles. From that it derives which event is playing and how
//! far into it the ramp is.
//!
//! # Per-sample flow
//!
//! ```text
//! ramp wrapped? ──no──────────────────────────────┐
//!     │yes                                        │
//!     ├─ phase reset pending    → step 0, cycle 0 │
//!     ├─ jump due at wrap       → target, step 0  │
//!     ├─ more cycles to go      → cycle += 1      │
//!     └─ sequence ended         → step 0, cycle 0 │
//!                                 (jumpNext fires,│
//!                                  crossings carry)
//!                                                 ▼
//!                      crossing jump due? → target at its step
//!                      else advance events up to ramp + cycle
//!                                                 ▼
//!            outputs: event phase / alternate phase / event offset
//! ```
//!
//! Joined runs present a single event: the follower rows are stepped over
//! without resetting the event ramp.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::{bar_ms, clamp_pre_change, SequencerConfig};
use crate::error::{SequencerError, SequencerResult};
use crate::sequence::{SequenceBank, MIN_SIZE_THRESHOLD};
use crate::types::{AccentPair, Sample, SequenceRef, ACCENT_CHANNELS};

use super::jump::{locate_crossing, JumpTiming, PendingJump};
use super::report::{EngineReport, EventReport, UpcomingReport};

/// Playback state shared with the control thread (lock-free reads)
pub struct TransportAtomics {
    pub slot: AtomicUsize,
    pub variation: AtomicUsize,
    pub step: AtomicUsize,
    pub cycle: AtomicU32,
    /// False while passing the ramp through (nothing playable)
    pub playing: AtomicBool,
    /// Reports lost because the report queue was full
    pub dropped_reports: AtomicU64,
}

impl TransportAtomics {
    pub fn new() -> Self {
        Self {
            slot: AtomicUsize::new(0),
            variation: AtomicUsize::new(0),
            step: AtomicUsize::new(0),
            cycle: AtomicU32::new(0),
            playing: AtomicBool::new(false),
            dropped_reports: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn sequence(&self) -> SequenceRef {
        SequenceRef::new(
            self.slot.load(Ordering::Relaxed),
            self.variation.load(Ordering::Relaxed),
        )
    }

    #[inline]
    pub fn step(&self) -> usize {
        self.step.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_reports(&self) -> u64 {
        self.dropped_reports.load(Ordering::Relaxed)
    }
}

impl Default for TransportAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// Output shaping options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSettings {
    /// Normalised (0..1) event phase instead of raw phase since event start
    pub multiply: bool,
    /// Alternate successive events between the main and alternate outputs
    pub alt_out: bool,
    /// Accent channels carried by previews
    pub alt_len: usize,
    /// Event fraction after which the next event is previewed
    pub pre_change: f32,
    pub bar_ms: f32,
    /// Events at or below this size are played but not reported
    pub report_threshold: f32,
}

impl TransportSettings {
    pub fn from_config(config: &SequencerConfig) -> Self {
        Self {
            multiply: config.multiply,
            alt_out: config.alt_out,
            alt_len: config.alt_len(),
            pre_change: config.pre_change(),
            bar_ms: config.bar_ms(),
            report_threshold: config.size_threshold.max(MIN_SIZE_THRESHOLD),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from_config(&SequencerConfig::default())
    }
}

/// Sample-synchronous sequence player
pub struct TransportEngine {
    settings: TransportSettings,
    atomics: Arc<TransportAtomics>,

    current: SequenceRef,
    step: usize,
    cycle: u32,
    prev_input: Sample,
    /// An event of `current` has been entered
    started: bool,

    // Emitted event (lead row of a joined run, or a single row)
    event_step: usize,
    event_run: u32,
    /// Rows of the run still to be stepped through, including the current one
    run_left: u32,
    event_offset: f32,
    event_size: f32,
    event_inv: f32,

    alt: bool,
    preview_sent: bool,
    new_bar: bool,
    page: i64,

    pending_reset: bool,
    pending_jump: Option<PendingJump>,
}

impl TransportEngine {
    pub fn new(settings: TransportSettings, atomics: Arc<TransportAtomics>) -> Self {
        Self {
            settings,
            atomics,
            current: SequenceRef::default(),
            step: 0,
            cycle: 0,
            prev_input: 0.0,
            started: false,
            event_step: 0,
            event_run: 1,
            run_left: 0,
            event_offset: 0.0,
            event_size: 0.0,
            event_inv: 0.0,
            alt: false,
            preview_sent: false,
            new_bar: false,
            page: -1,
            pending_reset: false,
            pending_jump: None,
        }
    }

    #[inline]
    pub fn current(&self) -> SequenceRef {
        self.current
    }

    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    #[inline]
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    /// Shared playback state for lock-free polling
    pub fn atomics(&self) -> Arc<TransportAtomics> {
        Arc::clone(&self.atomics)
    }

    #[inline]
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    #[inline]
    pub fn pending_jump(&self) -> Option<PendingJump> {
        self.pending_jump
    }

    /// Total phase reached by the last processed sample
    #[inline]
    pub fn position(&self) -> f64 {
        self.prev_input as f64 + self.cycle as f64
    }

    // ─────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────

    pub fn set_multiply(&mut self, multiply: bool) {
        self.settings.multiply = multiply;
    }

    /// 0 disables alternating output; 1..8 enables it and sets the preview accent count
    pub fn set_alt_out(&mut self, n: usize) {
        self.settings.alt_out = n > 0;
        if (1..=ACCENT_CHANNELS).contains(&n) {
            self.settings.alt_len = n;
        }
        if !self.settings.alt_out {
            self.alt = false;
        }
    }

    pub fn set_pre_change(&mut self, percent: f32) {
        self.settings.pre_change = clamp_pre_change(percent);
    }

    pub fn set_bpm(&mut self, bpm: f32) -> SequencerResult<()> {
        if !(bpm > 0.0) || !bpm.is_finite() {
            return Err(SequencerError::InvalidBpm);
        }
        self.settings.bar_ms = bar_ms(bpm);
        Ok(())
    }

    pub fn set_report_threshold(&mut self, threshold: f32) {
        self.settings.report_threshold = threshold.max(MIN_SIZE_THRESHOLD);
    }

    // ─────────────────────────────────────────────────────────────
    // Jumps
    // ─────────────────────────────────────────────────────────────

    /// Schedule a switch to `target` at the next aligned crossing
    ///
    /// On the last step of the current sequence the switch waits for the
    /// wrap instead. Replaces any earlier pending jump.
    pub fn jump_to(&mut self, bank: &SequenceBank, target: SequenceRef) -> SequencerResult<()> {
        bank.require_filled(target)?;
        let on_last_step = self.step + 1 >= bank.len(self.current);
        let timing = if !bank.is_playable(self.current) || on_last_step {
            JumpTiming::AtWrap
        } else {
            locate_crossing(bank, target, self.position())
        };
        log::debug!("transport: jump to {} scheduled ({:?})", target, timing);
        self.pending_jump = Some(PendingJump { target, timing });
        Ok(())
    }

    /// Schedule a switch to `target` when the current sequence ends
    pub fn jump_next(&mut self, bank: &SequenceBank, target: SequenceRef) -> SequencerResult<()> {
        bank.require_filled(target)?;
        log::debug!("transport: jump to {} at sequence end", target);
        self.pending_jump = Some(PendingJump {
            target,
            timing: JumpTiming::AtEnd,
        });
        Ok(())
    }

    /// Restart the current sequence at the next ramp wrap
    pub fn reset_phase(&mut self) {
        self.pending_reset = true;
    }

    // ─────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────

    /// Render one block
    ///
    /// `out` receives the event phase, `alt` the alternating channel and
    /// `offset` the event's starting phase. Reports are queued in order.
    pub fn process(
        &mut self,
        bank: &SequenceBank,
        input: &[Sample],
        out: &mut [Sample],
        alt: &mut [Sample],
        offset: &mut [Sample],
        reports: &mut rtrb::Producer<EngineReport>,
    ) {
        let frames = input.len().min(out.len()).min(alt.len()).min(offset.len());
        for i in 0..frames {
            let (main, alternate, event_offset) = self.tick(bank, input[i], reports);
            out[i] = main;
            alt[i] = alternate;
            offset[i] = event_offset;
        }

        self.atomics.slot.store(self.current.slot, Ordering::Relaxed);
        self.atomics
            .variation
            .store(self.current.variation, Ordering::Relaxed);
        self.atomics.step.store(self.step, Ordering::Relaxed);
        self.atomics.cycle.store(self.cycle, Ordering::Relaxed);
        self.atomics
            .playing
            .store(bank.is_playable(self.current), Ordering::Relaxed);
    }

    #[inline]
    fn tick(
        &mut self,
        bank: &SequenceBank,
        input: Sample,
        reports: &mut rtrb::Producer<EngineReport>,
    ) -> (Sample, Sample, Sample) {
        let wrapped = input < self.prev_input;
        self.prev_input = input;

        if !bank.is_playable(self.current) {
            self.started = false;
            match self.pending_jump {
                Some(jump) if wrapped && bank.is_playable(jump.target) => {
                    self.pending_jump = None;
                    self.begin(bank, jump.target, 0, 0, reports);
                }
                _ => return (input, 0.0, 0.0),
            }
        } else if !self.started || self.step >= bank.len(self.current) {
            // Fresh start, or the table shrank under us
            self.begin(bank, self.current, 0, 0, reports);
        } else if wrapped {
            self.on_wrap(bank, reports);
        }

        self.advance(bank, input, reports);
        self.render(bank, input, reports)
    }

    fn on_wrap(&mut self, bank: &SequenceBank, reports: &mut rtrb::Producer<EngineReport>) {
        let cycles = bank.cycles(self.current);

        if self.pending_reset {
            self.pending_reset = false;
            self.begin(bank, self.current, 0, 0, reports);
            return;
        }

        if let Some(jump) = self.pending_jump {
            if jump.timing == JumpTiming::AtWrap && bank.is_playable(jump.target) {
                self.pending_jump = None;
                self.begin(bank, jump.target, 0, 0, reports);
                return;
            }
        }

        if self.cycle + 1 < cycles {
            self.cycle += 1;
            return;
        }

        // Sequence end
        let next = match self.pending_jump {
            Some(jump) if jump.timing == JumpTiming::AtEnd => {
                self.pending_jump = None;
                if bank.is_playable(jump.target) {
                    jump.target
                } else {
                    self.current
                }
            }
            Some(jump) => {
                self.pending_jump = Some(PendingJump {
                    timing: jump.timing.carried(cycles),
                    ..jump
                });
                self.current
            }
            None => self.current,
        };
        self.begin(bank, next, 0, 0, reports);
    }

    /// Fire a due crossing jump, then step events up to the current phase
    fn advance(
        &mut self,
        bank: &SequenceBank,
        input: Sample,
        reports: &mut rtrb::Producer<EngineReport>,
    ) {
        if let Some(PendingJump {
            target,
            timing: JumpTiming::Crossing { shot, wrap_sub, step },
        }) = self.pending_jump
        {
            let total = input as f64 + self.cycle as f64;
            if total >= shot && bank.is_playable(target) && step < bank.len(target) {
                self.pending_jump = None;
                let cycle = (self.cycle as i64 - wrap_sub).max(0) as u32;
                self.begin(bank, target, step, cycle, reports);
            }
        }

        let seq = self.current;
        let len = bank.len(seq);
        let total = input + self.cycle as f32;
        let events = bank.events();
        while self.step + 1 < len
            && total >= events.play_offset(seq, self.step) + events.size(seq, self.step)
        {
            self.enter(bank, self.step + 1, reports);
        }
    }

    fn render(
        &mut self,
        bank: &SequenceBank,
        input: Sample,
        reports: &mut rtrb::Producer<EngineReport>,
    ) -> (Sample, Sample, Sample) {
        let total = input + self.cycle as f32;
        let raw = total - self.event_offset;
        let normalised = raw * self.event_inv;

        if !self.preview_sent && normalised > self.settings.pre_change {
            self.preview_sent = true;
            let upcoming = self.upcoming(bank);
            self.push(reports, EngineReport::Upcoming(upcoming));
        }

        let page = total.floor() as i64;
        if page != self.page {
            self.page = page;
            self.push(reports, EngineReport::Page { page });
        }

        let value = if self.settings.multiply { normalised } else { raw };
        if self.settings.alt_out && self.alt {
            (0.0, value, self.event_offset)
        } else {
            (value, 0.0, self.event_offset)
        }
    }

    /// Start `seq` at `step` with the given cycle counter
    fn begin(
        &mut self,
        bank: &SequenceBank,
        seq: SequenceRef,
        step: usize,
        cycle: u32,
        reports: &mut rtrb::Producer<EngineReport>,
    ) {
        if seq != self.current {
            log::debug!("transport: {} -> {}", self.current, seq);
            self.push(
                reports,
                EngineReport::Switched {
                    from: self.current.into(),
                    to: seq.into(),
                },
            );
            self.current = seq;
        }
        self.cycle = cycle;
        self.run_left = 0;
        self.started = true;
        self.new_bar = step == 0;
        self.enter(bank, step, reports);
    }

    /// Move to `step`, emitting a new event unless it is absorbed by a run
    fn enter(
        &mut self,
        bank: &SequenceBank,
        step: usize,
        reports: &mut rtrb::Producer<EngineReport>,
    ) {
        self.step = step;
        if self.run_left > 1 {
            self.run_left -= 1;
            return;
        }

        let seq = self.current;
        let events = bank.events();
        let len = bank.len(seq);
        let run = events.join_run(seq, step).max(1).min((len - step) as u32);
        self.event_step = step;
        self.event_run = run;
        self.run_left = run;
        self.event_offset = events.play_offset(seq, step);
        self.event_size = if run > 1 {
            events.join_size(seq, step)
        } else {
            events.size(seq, step)
        };
        self.event_inv = if self.event_size > 0.0 {
            1.0 / self.event_size
        } else {
            0.0
        };
        if self.settings.alt_out {
            self.alt = !self.alt;
        }
        self.preview_sent = false;

        if self.event_size > self.settings.report_threshold {
            let group = events.group(seq, step);
            let groups = bank.groups();
            let report = EventReport {
                slot: seq.slot,
                variation: seq.variation,
                step,
                group,
                numerator: groups.numerator(seq, group as usize),
                denominator: groups.denominator(seq, group as usize),
                join_run: run,
                size: self.event_size,
                duration_ms: self.event_size * self.settings.bar_ms,
                accents: *events.accents(seq, step),
                new_group: events.group_step(seq, step) == 0,
                new_bar: self.new_bar,
            };
            self.push(reports, EngineReport::Event(report));
        }
        self.new_bar = false;
    }

    /// Describe the event that will be emitted after the current one
    fn upcoming(&self, bank: &SequenceBank) -> UpcomingReport {
        let mut seq = self.current;
        let mut step = self.event_step + self.event_run as usize;
        if step >= bank.len(seq) {
            step = 0;
            if let Some(jump) = self.pending_jump {
                let at_boundary = matches!(jump.timing, JumpTiming::AtWrap | JumpTiming::AtEnd);
                if at_boundary && bank.is_playable(jump.target) {
                    seq = jump.target;
                }
            }
        }

        let events = bank.events();
        let run = events.join_run(seq, step).max(1);
        let size = if run > 1 {
            events.join_size(seq, step)
        } else {
            events.size(seq, step)
        };
        let count = self.settings.alt_len.clamp(1, ACCENT_CHANNELS);
        let mut accents = [AccentPair::UNSET; ACCENT_CHANNELS];
        accents[..count].copy_from_slice(&events.accents(seq, step)[..count]);

        UpcomingReport {
            alternate: self.settings.alt_out && !self.alt,
            durations: [self.settings.bar_ms * size, size],
            accent_count: count,
            accents,
        }
    }

    #[inline]
    fn push(&self, reports: &mut rtrb::Producer<EngineReport>, report: EngineReport) {
        if reports.push(report).is_err() {
            self.atomics.dropped_reports.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for TransportEngine {
    fn default() -> Self {
        Self::new(TransportSettings::default(), Arc::new(TransportAtomics::new()))
    }
}
