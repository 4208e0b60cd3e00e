// Plain-text transition log
//
// Line-oriented, size-rotated (1 MiB, 3 backups by default), with the
// fixed-width padded format the stats reporter re-parses. Write failures
// are logged and swallowed; losing a log line never stops the monitor.

use crate::error::Result;
use crate::monitor::rotate::RotatingFile;
use crate::systemd::models::{Event, EventKind, STATE_PAD};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Mutex;

pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_BACKUP_COUNT: usize = 3;

pub struct TransitionLog {
    inner: Mutex<RotatingFile>,
}

impl TransitionLog {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, backup_count: usize) -> Result<Self> {
        let file = RotatingFile::open(path, max_bytes, backup_count)?;
        Ok(Self {
            inner: Mutex::new(file),
        })
    }

    pub fn info(&self, message: &str) {
        self.write_line("INFO", message);
    }

    pub fn warning(&self, message: &str) {
        self.write_line("WARNING", message);
    }

    pub fn error(&self, message: &str) {
        self.write_line("ERROR", message);
    }

    /// Write one classified event. Crashes log at ERROR, everything else
    /// at INFO, matching the severity the log consumers expect.
    pub fn log_event(&self, event: &Event, name_pad: usize) {
        let line = format_event_line(event, name_pad);
        if event.kind == EventKind::Crash {
            self.error(&line);
        } else {
            self.info(&line);
        }
    }

    pub fn flush(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = inner.flush();
    }

    fn write_line(&self, level: &str, message: &str) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("{} - [{}] {}", stamp, level, message);

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = inner.write_line(&line) {
            tracing::warn!("Failed to write transition log: {}", e);
        }
    }
}

/// Render one event as the fixed-width log line. Counted events carry
/// the counter snapshot; informational lines only carry the sub-state.
pub fn format_event_line(event: &Event, name_pad: usize) -> String {
    let name = format!("{:<width$}", event.unit, width = name_pad);
    let from = format!(
        "{:<width$}",
        event.from_state.as_deref().unwrap_or("None"),
        width = STATE_PAD
    );
    let to = format!("{:<width$}", event.to_state, width = STATE_PAD);

    match event.kind {
        EventKind::Crash => format!(
            "Service {}: {} -> {} ({})! SubState: {}, Status: {}, Code: {}. \
             Crashes: {}, Starts: {}, Stops: {}",
            name,
            from,
            to,
            event.kind.tag(),
            event.sub_state,
            event.exit_detail.as_deref().unwrap_or("0"),
            event.exit_code.unwrap_or(0),
            event.counters.crashes,
            event.counters.starts,
            event.counters.stops,
        ),
        EventKind::Start | EventKind::Stop | EventKind::RestartCycle => format!(
            "Service {}: {} -> {} ({}) - Starts: {}, Stops: {}, Crashes: {}",
            name,
            from,
            to,
            event.kind.tag(),
            event.counters.starts,
            event.counters.stops,
            event.counters.crashes,
        ),
        EventKind::Transition => format!(
            "Service {}: {} -> {} (SubState: {})",
            name, from, to, event.sub_state
        ),
    }
}
