#![allow(dead_code)]
//! Shared integration test utilities.

use std::sync::{Arc, Mutex, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// An event log shared between test code and runtime callbacks.
pub type Log = Arc<Mutex<Vec<String>>>;

/// Creates an empty event log.
pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshots the log contents.
pub fn entries(log: &Log) -> Vec<String> {
    log.lock().expect("log poisoned").clone()
}

/// Appends an entry to the log.
pub fn push(log: &Log, entry: impl Into<String>) {
    log.lock().expect("log poisoned").push(entry.into());
}
