//! Deferred deallocation for command payloads
//!
//! List payloads (fraction pairs, join counts) travel to the audio thread as
//! `basedrop::Owned` values. When a command has been applied the payload is
//! dropped there, but the drop only enqueues the pointer; the memory is
//! released by a collector running on its own thread.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// Collection period of the background thread
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("polymath-gc".to_string())
        .spawn(move || {
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }
            log::debug!("gc: collector thread started");
            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.map_err(|e| e.to_string()).and_then(|_| rx.recv().map_err(|e| e.to_string())) {
        Ok(handle) => handle,
        Err(e) => {
            // Payloads are still valid, they are just never reclaimed
            log::error!("gc: collector thread unavailable ({}), deferred drops will leak", e);
            let collector: &'static mut Collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Handle for allocating `Owned`/`Shared` payloads
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
