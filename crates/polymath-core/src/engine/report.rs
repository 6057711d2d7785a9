//! Side-channel reports from the sequencer
//!
//! The transport queues reports while it renders a block; the host drains
//! them after the block, in the order they were produced. This replaces
//! per-event callbacks with a single FIFO the host can poll.

use serde::Serialize;

use crate::error::SequencerError;
use crate::sequence::BuildReport;
use crate::types::{AccentPair, SequenceRef, ACCENT_CHANNELS};

/// Ring buffer size for reports (several blocks' worth of events)
pub const REPORT_QUEUE_CAPACITY: usize = 1024;

/// A newly emitted event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EventReport {
    pub slot: usize,
    pub variation: usize,
    pub step: usize,
    pub group: u32,
    pub numerator: u32,
    pub denominator: f32,
    /// Raw events fused into this one (1 for a single event)
    pub join_run: u32,
    /// Phase length of the emitted event
    pub size: f32,
    /// Duration at the current tempo, in milliseconds
    pub duration_ms: f32,
    pub accents: [AccentPair; ACCENT_CHANNELS],
    /// First event of its group
    pub new_group: bool,
    /// First event after the sequence restarted
    pub new_bar: bool,
}

/// Preview of the event that follows the current one
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UpcomingReport {
    /// Output channel the next event will use
    pub alternate: bool,
    /// `[duration in ms, phase size]`
    pub durations: [f32; 2],
    /// Number of leading entries of `accents` that are meaningful
    pub accent_count: usize,
    pub accents: [AccentPair; ACCENT_CHANNELS],
}

/// Everything the sequencer reports back to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineReport {
    Event(EventReport),
    Upcoming(UpcomingReport),
    /// Integer part of the total phase changed
    Page { page: i64 },
    /// Transport switched sequence
    Switched { from: SequenceRefReport, to: SequenceRefReport },
    /// Answer to a read-back; `values` holds a single error code on failure
    SequenceData {
        slot: usize,
        variation: usize,
        code: i32,
        values: Vec<f32>,
    },
    Built { slot: usize, report: BuildSummary },
    /// A queued command was rejected
    CommandFailed {
        command: &'static str,
        #[serde(serialize_with = "display")]
        error: SequencerError,
    },
}

/// Serializable form of a [`SequenceRef`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceRefReport {
    pub slot: usize,
    pub variation: usize,
}

impl From<SequenceRef> for SequenceRefReport {
    fn from(seq: SequenceRef) -> Self {
        Self {
            slot: seq.slot,
            variation: seq.variation,
        }
    }
}

/// Serializable form of a [`BuildReport`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BuildSummary {
    pub written: usize,
    pub skipped: usize,
    pub events: usize,
    pub cycles: u32,
    pub remainder: Option<f32>,
}

impl From<BuildReport> for BuildSummary {
    fn from(report: BuildReport) -> Self {
        Self {
            written: report.written,
            skipped: report.skipped,
            events: report.events,
            cycles: report.cycles,
            remainder: report.remainder,
        }
    }
}

fn display<S: serde::Serializer>(error: &SequencerError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Create the audio → control report queue
pub fn report_channel() -> (rtrb::Producer<EngineReport>, rtrb::Consumer<EngineReport>) {
    rtrb::RingBuffer::new(REPORT_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_command_serializes_message() {
        let report = EngineReport::CommandFailed {
            command: "scramble",
            error: SequencerError::OriginalProtected { action: "scramble" },
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"kind\":\"command_failed\""));
        assert!(json.contains("cannot scramble the original"));
    }

    #[test]
    fn test_page_report_shape() {
        let json = serde_json::to_string(&EngineReport::Page { page: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"page","page":3}"#);
    }
}
