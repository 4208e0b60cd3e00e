// Structured event sink
//
// One JSON object per classified event, appended to a size-rotated
// JSON-Lines file. Every record carries the host machine id so logs from
// multiple hosts can be centralized.

use crate::error::Result;
use crate::monitor::rotate::RotatingFile;
use crate::systemd::models::{Event, EventKind};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_BACKUP_COUNT: usize = 5;

pub struct EventLogger {
    machine_id: String,
    inner: Mutex<RotatingFile>,
}

impl EventLogger {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, backup_count: usize) -> Result<Self> {
        let file = RotatingFile::open(path, max_bytes, backup_count)?;
        Ok(Self {
            machine_id: machine_id(),
            inner: Mutex::new(file),
        })
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Append one event. Sink failures are logged and absorbed; the
    /// monitor loop never stops over a logging error.
    pub fn log_event(&self, event: &Event) {
        let mut record = json!({
            "timestamp": event.timestamp.to_rfc3339(),
            "machine_id": self.machine_id,
            "event": event.kind.label(),
            "service": event.unit,
            "from_state": event.from_state,
            "to_state": event.to_state,
            "counters": {
                "starts": event.counters.starts,
                "stops": event.counters.stops,
                "crashes": event.counters.crashes,
            },
        });

        if event.kind == EventKind::Crash {
            record["sub_state"] = json!(event.sub_state);
            record["exit_code"] = json!(event.exit_code);
            record["exit_detail"] = json!(event.exit_detail);
        }

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = inner.write_line(&record.to_string()) {
            tracing::warn!("Failed to write structured event: {}", e);
        }
    }

    pub fn flush(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = inner.flush();
    }
}

/// Stable host identifier for multi-host log aggregation.
fn machine_id() -> String {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(contents) = std::fs::read_to_string(Path::new(path)) {
            let id = contents.trim();
            if !id.is_empty() {
                return id.to_string();
            }
        }
    }
    "unknown".to_string()
}
