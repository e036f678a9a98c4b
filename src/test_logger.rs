//! A `log` backend that records every event, shared by the unit tests.

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Captured {
    pub level: Level,
    pub target: String,
    pub text: String,
}

struct Capture {
    records: Mutex<Vec<Captured>>,
}

impl Log for Capture {
    fn enabled(&self, _: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records.lock().push(Captured {
            level: record.level(),
            target: record.target().to_owned(),
            text: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

static CAPTURE: Lazy<Capture> = Lazy::new(|| Capture {
    records: Mutex::new(Vec::new()),
});

/// Installs the capturing logger; later calls are no-ops.
pub(crate) fn install() {
    if log::set_logger(&*CAPTURE).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

/// Records whose text contains `needle`. Tests run in parallel, so callers
/// match on text unique to their own test.
pub(crate) fn records_containing(needle: &str) -> Vec<Captured> {
    CAPTURE
        .records
        .lock()
        .iter()
        .filter(|r| r.text.contains(needle))
        .cloned()
        .collect()
}
