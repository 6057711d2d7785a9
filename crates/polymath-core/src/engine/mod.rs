//! Sequencer engine - transport, command queue and reports
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  SequencerCommand   ┌──────────────────────────────────┐
//! │ control side │ ──── rtrb ────────▶ │ PolyMathEngine                   │
//! │ (host, UI)   │                     │  process_commands()  (editors)   │
//! │              │ ◀──── rtrb ──────── │  process()  ──▶ TransportEngine  │
//! └──────────────┘    EngineReport     │                 reads SequenceBank│
//!        ▲                             └──────────────────────────────────┘
//!        └────── TransportAtomics (slot, variation, step, cycle)
//! ```
//!
//! List payloads inside commands are `basedrop::Owned`, so dropping them on
//! the audio thread defers the free to the collector in [`gc`].

mod command;
mod engine;
pub mod gc;
mod jump;
mod report;
mod transport;

pub use command::{command_channel, field_buffer, owned, SequencerCommand, COMMAND_QUEUE_CAPACITY};
pub use engine::PolyMathEngine;
pub use jump::{locate_crossing, JumpTiming, PendingJump};
pub use report::{
    report_channel, BuildSummary, EngineReport, EventReport, SequenceRefReport, UpcomingReport,
    REPORT_QUEUE_CAPACITY,
};
pub use transport::{TransportAtomics, TransportEngine, TransportSettings};
