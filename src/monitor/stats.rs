// Periodic statistics reporter
//
// Re-derives per-service event counts by scanning the transition log and
// renders a fixed-width table. Observational only: the state store's
// persisted counters stay authoritative, and a rotated or cleared log
// window may legitimately disagree with them.

use crate::systemd::models::EventKind;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Event tallies for one service within the scanned log window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub crashes: u64,
    pub restarts: u64,
    pub starts: u64,
    pub stops: u64,
}

pub struct StatsReporter {
    log_path: PathBuf,
}

impl StatsReporter {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Scan the current log window. A missing log simply yields no events.
    pub fn scan(&self) -> BTreeMap<String, ServiceStats> {
        let contents = std::fs::read_to_string(&self.log_path).unwrap_or_default();
        tally_lines(contents.lines())
    }

    /// One report run: scan plus render.
    pub fn report(&self) -> String {
        render_table(&self.scan())
    }
}

/// Tally counted-event tags per service across log lines.
pub fn tally_lines<'a>(lines: impl Iterator<Item = &'a str>) -> BTreeMap<String, ServiceStats> {
    let mut stats: BTreeMap<String, ServiceStats> = BTreeMap::new();

    for line in lines {
        let Some((service, kind)) = parse_event_line(line) else {
            continue;
        };
        let entry = stats.entry(service).or_default();
        match kind {
            EventKind::Start => entry.starts += 1,
            EventKind::Stop => entry.stops += 1,
            EventKind::Crash => entry.crashes += 1,
            EventKind::RestartCycle => entry.restarts += 1,
            EventKind::Transition => {}
        }
    }

    stats
}

/// Parse one transition-log line into (service, counted event kind).
/// Informational lines and anything not written by the event formatter
/// return None.
pub fn parse_event_line(line: &str) -> Option<(String, EventKind)> {
    let idx = line.find("] Service ")?;
    let rest = &line[idx + "] Service ".len()..];
    let name_end = rest.find(':')?;
    let service = rest[..name_end].trim_end().to_string();
    if service.is_empty() {
        return None;
    }

    let tail = &rest[name_end..];
    let kind = if tail.contains("(**CRASH**)") {
        EventKind::Crash
    } else if tail.contains("(RESTART_CYCLE)") {
        EventKind::RestartCycle
    } else if tail.contains("(START)") {
        EventKind::Start
    } else if tail.contains("(STOP)") {
        EventKind::Stop
    } else {
        return None;
    };

    Some((service, kind))
}

/// Render the summary table: rows sorted by service name, columns sized
/// to content, dashed separator spanning the full width.
pub fn render_table(stats: &BTreeMap<String, ServiceStats>) -> String {
    if stats.is_empty() {
        return "No events found".to_string();
    }

    const HEADERS: [&str; 5] = ["Service", "Crashes", "Restarts", "Starts", "Stops"];

    let name_width = stats
        .keys()
        .map(|s| s.len())
        .chain(std::iter::once(HEADERS[0].len()))
        .max()
        .unwrap_or(HEADERS[0].len());

    let mut widths = [name_width, 0, 0, 0, 0];
    for (i, header) in HEADERS.iter().enumerate().skip(1) {
        let max_value = stats
            .values()
            .map(|s| match i {
                1 => s.crashes,
                2 => s.restarts,
                3 => s.starts,
                _ => s.stops,
            })
            .max()
            .unwrap_or(0);
        widths[i] = header.len().max(max_value.to_string().len());
    }

    let total_width = widths.iter().sum::<usize>() + 2 * (HEADERS.len() - 1);
    let mut out = String::new();

    out.push_str(&format!(
        "{:<w0$}  {:>w1$}  {:>w2$}  {:>w3$}  {:>w4$}\n",
        HEADERS[0],
        HEADERS[1],
        HEADERS[2],
        HEADERS[3],
        HEADERS[4],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3],
        w4 = widths[4],
    ));
    out.push_str(&"-".repeat(total_width));
    out.push('\n');

    for (service, s) in stats {
        out.push_str(&format!(
            "{:<w0$}  {:>w1$}  {:>w2$}  {:>w3$}  {:>w4$}\n",
            service,
            s.crashes,
            s.restarts,
            s.starts,
            s.stops,
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
            w4 = widths[4],
        ));
    }

    out.pop();
    out
}
