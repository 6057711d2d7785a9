//! Block loop: synthetic ramp → (phase remapper) → sequencer → report lines

use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use polymath_core::engine::{command_channel, EngineReport, PolyMathEngine, SequencerCommand};
use polymath_core::phase::PhaseRemapper;

use crate::score::Score;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    /// One JSON object per report
    Json,
}

/// Totals printed after a render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub samples: usize,
    pub blocks: usize,
    pub reports: usize,
    pub dropped: u64,
}

#[derive(Serialize)]
struct Line<'a> {
    time: f64,
    #[serde(flatten)]
    report: &'a EngineReport,
}

/// Render `score` and write every report to `out`
pub fn render<W: Write>(score: &Score, out: &mut W, format: Format) -> Result<RenderStats> {
    let (mut engine, mut reports) = PolyMathEngine::new(&score.sequencer);
    let (mut tx, mut rx) = command_channel();
    let mut stats = RenderStats::default();

    for cmd in score.setup_commands()? {
        send(&mut engine, &mut tx, &mut rx, cmd);
    }
    engine.process_commands(&mut rx);
    stats.reports += drain(&mut reports, out, 0.0, format)?;

    let mut remapper = score
        .phase
        .as_ref()
        .map(PhaseRemapper::from_config)
        .transpose()
        .context("Invalid phase settings")?;

    let clock = &score.clock;
    let rate = clock.sample_rate as f64;
    let increment = clock.ramp_hz / rate;
    let total = clock.total_samples();

    let mut ramp = vec![0.0f32; clock.block_size];
    let mut remapped = vec![0.0f32; clock.block_size];
    let mut main = vec![0.0f32; clock.block_size];
    let mut alt = vec![0.0f32; clock.block_size];
    let mut offset = vec![0.0f32; clock.block_size];
    let mut cues = score.cues.iter().peekable();

    log::info!(
        "render: {} samples at {} Hz, ramp {} Hz, blocks of {}",
        total,
        clock.sample_rate,
        clock.ramp_hz,
        clock.block_size
    );

    let mut position = 0;
    while position < total {
        let frames = clock.block_size.min(total - position);
        let time = position as f64 / rate;

        while let Some(cue) = cues.next_if(|cue| cue.at <= time) {
            log::debug!("render: cue at {:.3}s: {:?}", cue.at, cue.action);
            send(
                &mut engine,
                &mut tx,
                &mut rx,
                cue.action.command(&score.sequencer.capacity),
            );
        }
        engine.process_commands(&mut rx);

        for (i, sample) in ramp[..frames].iter_mut().enumerate() {
            *sample = ((position + i) as f64 * increment).fract() as f32;
        }
        let input = match remapper.as_mut() {
            Some(remapper) => {
                remapper.process(&ramp[..frames], &mut remapped[..frames]);
                &remapped[..frames]
            }
            None => &ramp[..frames],
        };
        engine.process(
            input,
            &mut main[..frames],
            &mut alt[..frames],
            &mut offset[..frames],
        );

        // Reports are stamped with the end of the block that produced them
        let end = (position + frames) as f64 / rate;
        stats.reports += drain(&mut reports, out, end, format)?;
        position += frames;
        stats.blocks += 1;
    }

    stats.samples = total;
    stats.dropped = engine.atomics().dropped_reports();
    Ok(stats)
}

/// Queue a command, applying pending ones first when the queue is full
fn send(
    engine: &mut PolyMathEngine,
    tx: &mut rtrb::Producer<SequencerCommand>,
    rx: &mut rtrb::Consumer<SequencerCommand>,
    cmd: SequencerCommand,
) {
    if let Err(rtrb::PushError::Full(cmd)) = tx.push(cmd) {
        engine.process_commands(rx);
        if tx.push(cmd).is_err() {
            log::error!("render: command queue still full, command dropped");
        }
    }
}

fn drain<W: Write>(
    reports: &mut rtrb::Consumer<EngineReport>,
    out: &mut W,
    time: f64,
    format: Format,
) -> Result<usize> {
    let mut count = 0;
    while let Ok(report) = reports.pop() {
        match format {
            Format::Json => {
                let line = serde_json::to_string(&Line {
                    time,
                    report: &report,
                })?;
                writeln!(out, "{}", line)?;
            }
            Format::Text => writeln!(out, "{:>10.4}  {}", time, describe(&report))?,
        }
        count += 1;
    }
    Ok(count)
}

fn describe(report: &EngineReport) -> String {
    match report {
        EngineReport::Event(e) => format!(
            "event    slot {} var {} step {:>3}  group {} ({}/{})  size {:.4}  {:.1} ms{}{}",
            e.slot,
            e.variation,
            e.step,
            e.group,
            e.numerator,
            e.denominator,
            e.size,
            e.duration_ms,
            if e.join_run > 1 {
                format!("  joined x{}", e.join_run)
            } else {
                String::new()
            },
            if e.new_bar { "  |bar" } else { "" },
        ),
        EngineReport::Upcoming(u) => format!(
            "next     {:.1} ms  size {:.4}  {}",
            u.durations[0],
            u.durations[1],
            if u.alternate { "alt" } else { "main" }
        ),
        EngineReport::Page { page } => format!("page     {}", page),
        EngineReport::Switched { from, to } => format!(
            "switch   slot {} var {} -> slot {} var {}",
            from.slot, from.variation, to.slot, to.variation
        ),
        EngineReport::SequenceData {
            slot,
            variation,
            code,
            values,
        } => format!(
            "data     slot {} var {} field {}: {:?}",
            slot, variation, code, values
        ),
        EngineReport::Built { slot, report } => format!(
            "built    slot {}: {} groups ({} skipped), {} events, {} cycles",
            slot, report.written, report.skipped, report.events, report.cycles
        ),
        EngineReport::CommandFailed { command, error } => {
            format!("failed   {}: {}", command, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Clock, Cue, CueAction, SlotScore};

    fn score(slots: Vec<SlotScore>, cues: Vec<Cue>) -> Score {
        let mut score = Score {
            clock: Clock {
                sample_rate: 100,
                ramp_hz: 1.0,
                block_size: 10,
                seconds: 2.0,
            },
            slots,
            cues,
            ..Score::default()
        };
        score.sequencer.seed = Some(1);
        score
    }

    fn slot(slot: usize, groups: Vec<[u32; 2]>) -> SlotScore {
        SlotScore {
            slot,
            groups,
            join_sets: Vec::new(),
            joins: Vec::new(),
            accents: Vec::new(),
            variations: Vec::new(),
        }
    }

    fn lines(score: &Score, format: Format) -> (RenderStats, Vec<String>) {
        let mut out = Vec::new();
        let stats = render(score, &mut out, format).unwrap();
        let text = String::from_utf8(out).unwrap();
        (stats, text.lines().map(str::to_string).collect())
    }

    #[test]
    fn test_text_render_counts_events() {
        let score = score(vec![slot(0, vec![[4, 4]])], Vec::new());
        let (stats, lines) = lines(&score, Format::Text);
        assert_eq!(stats.samples, 200);
        assert_eq!(stats.blocks, 20);
        assert_eq!(stats.dropped, 0);
        assert!(lines[0].contains("built    slot 0"));
        let events = lines.iter().filter(|l| l.contains("event ")).count();
        assert_eq!(events, 8);
    }

    #[test]
    fn test_json_lines_carry_time_and_kind() {
        let score = score(vec![slot(0, vec![[2, 2]])], Vec::new());
        let (_, lines) = lines(&score, Format::Json);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("time").is_some());
            assert!(value.get("kind").is_some());
        }
        assert!(lines.iter().any(|l| l.contains(r#""kind":"event""#)));
    }

    #[test]
    fn test_cue_switches_sequence() {
        let cues = vec![Cue {
            at: 0.5,
            action: CueAction::JumpNext {
                slot: 1,
                variation: 0,
            },
        }];
        let score = score(vec![slot(0, vec![[4, 4]]), slot(1, vec![[3, 3]])], cues);
        let (_, lines) = lines(&score, Format::Text);
        let switch = lines
            .iter()
            .find(|l| l.contains("switch"))
            .expect("no switch reported");
        assert!(switch.contains("-> slot 1 var 0"));
    }

    #[test]
    fn test_failed_setup_is_reported() {
        let mut bad = slot(0, vec![[4, 4]]);
        bad.joins.push(crate::score::Join {
            group: 3,
            location: 0,
            length: 1,
        });
        let score = score(vec![bad], Vec::new());
        let (_, lines) = lines(&score, Format::Text);
        assert!(lines.iter().any(|l| l.contains("failed   makeJoin")));
    }
}
