//! Capture of `log` records emitted by `nthread-native`.
//!
//! The native crate reports lifecycle events through the `log` facade. During a
//! stress run the harness installs [`EventCapture`] as the global logger and
//! later drains the records into JSONL entries next to the scenario results.

use parking_lot::Mutex;

use crate::structured_log::{LogEntry, LogLevel};

/// One captured `log` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    pub level: log::Level,
    pub target: String,
    pub message: String,
}

impl NativeEvent {
    /// Convert into a JSONL entry. The trace id is assigned by the emitter.
    #[must_use]
    pub fn into_entry(self, scenario: Option<&str>) -> LogEntry {
        let mut entry = LogEntry::new(String::new(), LogLevel::from(self.level), "native_event")
            .with_details(serde_json::json!({
                "target": self.target,
                "message": self.message,
            }));
        if let Some(name) = scenario {
            entry = entry.with_scenario(name);
        }
        entry
    }
}

/// `log` backend that buffers records from the native crate.
pub struct EventCapture {
    events: Mutex<Vec<NativeEvent>>,
    limit: usize,
}

impl EventCapture {
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            events: parking_lot::const_mutex(Vec::new()),
            limit,
        }
    }

    /// Take every buffered event.
    pub fn drain(&self) -> Vec<NativeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl log::Log for EventCapture {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.target().starts_with("nthread_native")
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.limit {
            return;
        }
        events.push(NativeEvent {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

static CAPTURE: EventCapture = EventCapture::new(100_000);

/// Install the process-wide capture at `level`. Returns `None` if another
/// logger was installed first.
pub fn install(level: log::LevelFilter) -> Option<&'static EventCapture> {
    log::set_logger(&CAPTURE).ok()?;
    log::set_max_level(level);
    Some(&CAPTURE)
}
