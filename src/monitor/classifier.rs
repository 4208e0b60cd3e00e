// State-transition classifier
//
// Pure function from (previous record, new snapshot) to (updated record,
// zero-or-one event, counters-changed flag). All counter policy lives
// here; the monitor loop only routes observations through it.

use crate::systemd::models::{
    is_running_like, is_stopped_like, Event, EventKind, PropertiesSnapshot, UnitRecord,
    START_TARGETS,
};
use chrono::Utc;

/// Outcome of one classification call.
#[derive(Debug, Clone)]
pub struct Classification {
    pub record: UnitRecord,
    pub event: Option<Event>,
    /// True iff any of starts/stops/crashes was incremented, i.e. the
    /// store must be persisted.
    pub counters_changed: bool,
}

/// Classify one observed transition for `unit`.
///
/// Rules are evaluated in priority order. The no-op check must come
/// first because the transport may redeliver identical property sets.
/// The `active -> deactivating` and `active -> activating` pairs are
/// special-cased so the two-notification sequences systemd emits for a
/// clean stop and for an auto-restart are not double-counted.
pub fn classify(unit: &str, record: &UnitRecord, snapshot: &PropertiesSnapshot) -> Classification {
    let prev = record.last_state.as_deref();
    let new = snapshot.active_state.as_str();

    // 1. No-op: redelivery of the current state. The very first
    // observation is never a no-op, even if the value coincides.
    if prev == Some(new) {
        return Classification {
            record: record.clone(),
            event: None,
            counters_changed: false,
        };
    }

    let mut updated = record.clone();
    let mut counters_changed = false;

    let kind = if prev.map_or(true, is_stopped_like) && START_TARGETS.contains(&new) {
        // 2. Start: from stopped-like (or first observation) into a
        // running target state.
        updated.starts += 1;
        counters_changed = true;
        EventKind::Start
    } else if prev.is_some_and(is_running_like) && is_stopped_like(new) {
        // 3. Stop, or crash when the unit landed in 'failed'.
        updated.stops += 1;
        counters_changed = true;
        if new == "failed" {
            updated.crashes += 1;
            EventKind::Crash
        } else {
            EventKind::Stop
        }
    } else if prev == Some("active") && new == "deactivating" {
        // 4. Transient deactivation: the subsequent stopped-like step
        // performs the real count.
        EventKind::Transition
    } else if prev == Some("active") && new == "activating" {
        // 5. Restart cycle: one stop plus one start in a single call.
        updated.stops += 1;
        updated.starts += 1;
        counters_changed = true;
        EventKind::RestartCycle
    } else {
        // 6. Fallback: informational only.
        EventKind::Transition
    };

    let event = Event {
        kind,
        unit: unit.to_string(),
        from_state: prev.map(str::to_string),
        to_state: new.to_string(),
        sub_state: snapshot.sub_state.clone(),
        counters: updated.counters(),
        timestamp: Utc::now(),
        exit_code: (kind == EventKind::Crash).then_some(snapshot.exec_main_code),
        exit_detail: (kind == EventKind::Crash).then(|| snapshot.exit_detail()),
    };

    updated.last_state = Some(new.to_string());
    updated.last_change_time = Some(snapshot.local_change_time());
    if START_TARGETS.contains(&new) {
        updated.logged_unloaded = false;
    }

    Classification {
        record: updated,
        event: Some(event),
        counters_changed,
    }
}
