// Data model for monitored systemd units

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// States in which a unit is running or on its way into/out of running.
pub const RUNNING_LIKE: &[&str] = &["active", "activating", "reloading", "deactivating"];

/// States in which a unit is stopped. 'unloaded' covers units systemd does
/// not know about at all.
pub const STOPPED_LIKE: &[&str] = &["inactive", "failed", "dead", "unloaded"];

/// Target states that count as a start.
pub const START_TARGETS: &[&str] = &["activating", "active", "reloading"];

/// Padding width for state names in the transition log.
/// "deactivating" is the longest at 12 chars.
pub const STATE_PAD: usize = 12;

pub fn is_running_like(state: &str) -> bool {
    RUNNING_LIKE.contains(&state)
}

pub fn is_stopped_like(state: &str) -> bool {
    STOPPED_LIKE.contains(&state)
}

/// Durable per-unit record: last observed state plus lifetime counters.
///
/// Counters never decrease except via `--clear`. Missing fields in a
/// persisted file coerce to defaults on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    #[serde(default)]
    pub last_state: Option<String>,
    #[serde(default)]
    pub last_change_time: Option<String>,
    #[serde(default)]
    pub starts: u64,
    #[serde(default)]
    pub stops: u64,
    #[serde(default)]
    pub crashes: u64,
    #[serde(default)]
    pub logged_unloaded: bool,
}

impl Default for UnitRecord {
    fn default() -> Self {
        Self {
            last_state: None,
            last_change_time: None,
            starts: 0,
            stops: 0,
            crashes: 0,
            logged_unloaded: false,
        }
    }
}

impl UnitRecord {
    pub fn counters(&self) -> Counters {
        Counters {
            starts: self.starts,
            stops: self.stops,
            crashes: self.crashes,
        }
    }
}

/// One observation of a unit, either from the initial poll or from a
/// PropertiesChanged delta merged with last known values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesSnapshot {
    pub active_state: String,
    pub sub_state: String,
    /// ExecMainStatus: exit status or signal number of the main process.
    pub exec_main_status: i32,
    /// ExecMainCode: 0 = not exited, 1 = exited, 2 = killed by signal.
    pub exec_main_code: i32,
    /// StateChangeTimestamp in microseconds since the epoch.
    pub state_change_usec: u64,
}

impl PropertiesSnapshot {
    /// Human-readable decode of the exit detail: a signal name when the
    /// main process was killed by a signal, the raw status otherwise.
    pub fn exit_detail(&self) -> String {
        if self.exec_main_code == 2 {
            signal_name(self.exec_main_status)
                .map(str::to_string)
                .unwrap_or_else(|| format!("signal {}", self.exec_main_status))
        } else {
            self.exec_main_status.to_string()
        }
    }

    /// State change time rendered as local wall-clock, the format the
    /// persistence file carries.
    pub fn local_change_time(&self) -> String {
        format_local_time(self.state_change_usec)
    }
}

/// Counter snapshot attached to emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub starts: u64,
    pub stops: u64,
    pub crashes: u64,
}

/// Semantic classification of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Stop,
    Crash,
    RestartCycle,
    /// Informational transition, no counter change.
    Transition,
}

impl EventKind {
    /// Tag rendered in the plain-text transition log.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Start => "START",
            EventKind::Stop => "STOP",
            EventKind::Crash => "**CRASH**",
            EventKind::RestartCycle => "RESTART_CYCLE",
            EventKind::Transition => "TRANSITION",
        }
    }

    /// Event name used in structured JSON events.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Crash => "crash",
            EventKind::RestartCycle => "restart",
            EventKind::Transition => "transition",
        }
    }

    pub fn counts(&self) -> bool {
        !matches!(self, EventKind::Transition)
    }
}

/// Emitted on a classified transition; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub unit: String,
    pub from_state: Option<String>,
    pub to_state: String,
    pub sub_state: String,
    pub counters: Counters,
    pub timestamp: DateTime<Utc>,
    /// ExecMainCode for crashes.
    pub exit_code: Option<i32>,
    /// Decoded exit status for crashes.
    pub exit_detail: Option<String>,
}

/// Numeric encoding of active states for the service_state gauge.
pub fn state_gauge_value(state: &str) -> i64 {
    match state {
        "active" => 1,
        "inactive" => 0,
        "activating" => 2,
        "deactivating" => 3,
        "failed" => -1,
        "unloaded" => -2,
        _ => -99,
    }
}

/// Standard POSIX signal names for decoding ExecMainStatus when the main
/// process was killed by a signal.
pub fn signal_name(num: i32) -> Option<&'static str> {
    Some(match num {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        4 => "SIGILL",
        5 => "SIGTRAP",
        6 => "SIGABRT",
        7 => "SIGBUS",
        8 => "SIGFPE",
        9 => "SIGKILL",
        10 => "SIGUSR1",
        11 => "SIGSEGV",
        12 => "SIGUSR2",
        13 => "SIGPIPE",
        14 => "SIGALRM",
        15 => "SIGTERM",
        16 => "SIGSTKFLT",
        17 => "SIGCHLD",
        18 => "SIGCONT",
        19 => "SIGSTOP",
        20 => "SIGTSTP",
        21 => "SIGTTIN",
        22 => "SIGTTOU",
        23 => "SIGURG",
        24 => "SIGXCPU",
        25 => "SIGXFSZ",
        26 => "SIGVTALRM",
        27 => "SIGPROF",
        28 => "SIGWINCH",
        29 => "SIGIO",
        30 => "SIGPWR",
        31 => "SIGSYS",
        _ => return None,
    })
}

/// Render a systemd microsecond timestamp as local wall-clock time.
pub fn format_local_time(usec: u64) -> String {
    let secs = (usec / 1_000_000) as i64;
    let nanos = ((usec % 1_000_000) * 1000) as u32;
    let utc = DateTime::<Utc>::from_timestamp(secs, nanos)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());
    utc.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
