#[cfg(test)]
mod tests {
    use crate::monitor::classifier::classify;
    use crate::monitor::event_log::EventLogger;
    use crate::monitor::stats::{parse_event_line, render_table, tally_lines, ServiceStats};
    use crate::monitor::store::UnitStateStore;
    use crate::monitor::transition_log::{format_event_line, TransitionLog};
    use crate::systemd::models::{Counters, Event, EventKind, PropertiesSnapshot, UnitRecord};
    use std::collections::HashMap;

    fn snapshot(active: &str, sub: &str) -> PropertiesSnapshot {
        PropertiesSnapshot {
            active_state: active.to_string(),
            sub_state: sub.to_string(),
            exec_main_status: 0,
            exec_main_code: 0,
            state_change_usec: 1_700_000_000_000_000,
        }
    }

    fn record_in(state: Option<&str>) -> UnitRecord {
        UnitRecord {
            last_state: state.map(str::to_string),
            ..UnitRecord::default()
        }
    }

    #[test]
    fn test_rule_table() {
        // (previous, new, expected kind, starts delta, stops delta, crashes delta)
        let cases: &[(Option<&str>, &str, EventKind, u64, u64, u64)] = &[
            // Starts
            (None, "active", EventKind::Start, 1, 0, 0),
            (None, "activating", EventKind::Start, 1, 0, 0),
            (Some("inactive"), "active", EventKind::Start, 1, 0, 0),
            (Some("failed"), "activating", EventKind::Start, 1, 0, 0),
            (Some("dead"), "reloading", EventKind::Start, 1, 0, 0),
            (Some("unloaded"), "active", EventKind::Start, 1, 0, 0),
            // Stops
            (Some("active"), "inactive", EventKind::Stop, 0, 1, 0),
            (Some("deactivating"), "inactive", EventKind::Stop, 0, 1, 0),
            (Some("reloading"), "dead", EventKind::Stop, 0, 1, 0),
            (Some("activating"), "inactive", EventKind::Stop, 0, 1, 0),
            // Crashes
            (Some("active"), "failed", EventKind::Crash, 0, 1, 1),
            (Some("activating"), "failed", EventKind::Crash, 0, 1, 1),
            (Some("deactivating"), "failed", EventKind::Crash, 0, 1, 1),
            // Special-cased pairs
            (Some("active"), "deactivating", EventKind::Transition, 0, 0, 0),
            (Some("active"), "activating", EventKind::RestartCycle, 1, 1, 0),
            // Fallback bucket
            (Some("inactive"), "deactivating", EventKind::Transition, 0, 0, 0),
            (Some("reloading"), "active", EventKind::Transition, 0, 0, 0),
            (None, "inactive", EventKind::Transition, 0, 0, 0),
        ];

        for &(prev, new, kind, d_starts, d_stops, d_crashes) in cases {
            let record = record_in(prev);
            let outcome = classify("svc.service", &record, &snapshot(new, "running"));
            let event = outcome
                .event
                .unwrap_or_else(|| panic!("{:?} -> {} should emit an event", prev, new));

            assert_eq!(event.kind, kind, "{:?} -> {}", prev, new);
            assert_eq!(outcome.record.starts, d_starts, "{:?} -> {}", prev, new);
            assert_eq!(outcome.record.stops, d_stops, "{:?} -> {}", prev, new);
            assert_eq!(outcome.record.crashes, d_crashes, "{:?} -> {}", prev, new);
            assert_eq!(
                outcome.counters_changed,
                d_starts + d_stops + d_crashes > 0,
                "{:?} -> {}",
                prev,
                new
            );
            assert_eq!(outcome.record.last_state.as_deref(), Some(new));
            assert!(outcome.record.last_change_time.is_some());
        }
    }

    #[test]
    fn test_noop_idempotence() {
        let record = record_in(None);
        let snap = snapshot("active", "running");

        let first = classify("svc.service", &record, &snap);
        assert_eq!(first.event.as_ref().unwrap().kind, EventKind::Start);
        assert!(first.counters_changed);

        let second = classify("svc.service", &first.record, &snap);
        assert!(second.event.is_none());
        assert!(!second.counters_changed);
        assert_eq!(second.record, first.record);
    }

    #[test]
    fn test_first_observation_is_never_noop() {
        // Even a state that matches some default sentinel must classify
        // on the very first observation.
        let outcome = classify("svc.service", &record_in(None), &snapshot("active", "running"));
        let event = outcome.event.unwrap();
        assert_eq!(event.kind, EventKind::Start);
        assert_eq!(event.from_state, None);
        assert_eq!(outcome.record.starts, 1);
    }

    #[test]
    fn test_crash_decodes_signal() {
        // Scenario B: killed by signal 9
        let mut snap = snapshot("failed", "failed");
        snap.exec_main_code = 2;
        snap.exec_main_status = 9;

        let outcome = classify("svc.service", &record_in(Some("active")), &snap);
        assert_eq!(outcome.record.stops, 1);
        assert_eq!(outcome.record.crashes, 1);

        let event = outcome.event.unwrap();
        assert_eq!(event.kind, EventKind::Crash);
        assert_eq!(event.exit_code, Some(2));
        assert_eq!(event.exit_detail.as_deref(), Some("SIGKILL"));
    }

    #[test]
    fn test_crash_renders_numeric_status() {
        let mut snap = snapshot("failed", "exit-code");
        snap.exec_main_code = 1;
        snap.exec_main_status = 127;

        let outcome = classify("svc.service", &record_in(Some("activating")), &snap);
        assert_eq!(outcome.event.unwrap().exit_detail.as_deref(), Some("127"));
    }

    #[test]
    fn test_clean_stop_sequence_counts_once() {
        // Scenario C: active -> deactivating -> inactive counts one stop.
        let first = classify(
            "svc.service",
            &record_in(Some("active")),
            &snapshot("deactivating", "stop-sigterm"),
        );
        assert_eq!(first.event.as_ref().unwrap().kind, EventKind::Transition);
        assert!(!first.counters_changed);
        assert_eq!(first.record.stops, 0);

        let second = classify("svc.service", &first.record, &snapshot("inactive", "dead"));
        assert_eq!(second.event.as_ref().unwrap().kind, EventKind::Stop);
        assert!(second.counters_changed);
        assert_eq!(second.record.stops, 1);
        assert_eq!(second.record.starts, 0);
    }

    #[test]
    fn test_restart_cycle_counts_stop_and_start() {
        // Scenario D: auto-restart observed as active -> activating.
        let outcome = classify(
            "svc.service",
            &record_in(Some("active")),
            &snapshot("activating", "auto-restart"),
        );
        let event = outcome.event.unwrap();
        assert_eq!(event.kind, EventKind::RestartCycle);
        assert_eq!(outcome.record.starts, 1);
        assert_eq!(outcome.record.stops, 1);
        assert_eq!(outcome.record.crashes, 0);
        assert!(outcome.counters_changed);
    }

    #[test]
    fn test_running_state_clears_logged_unloaded() {
        let mut record = record_in(Some("unloaded"));
        record.logged_unloaded = true;

        let outcome = classify("svc.service", &record, &snapshot("activating", "start"));
        assert!(!outcome.record.logged_unloaded);

        // A stopped-like target leaves the flag alone.
        let mut record = record_in(Some("active"));
        record.logged_unloaded = true;
        let outcome = classify("svc.service", &record, &snapshot("inactive", "dead"));
        assert!(outcome.record.logged_unloaded);
    }

    #[test]
    fn test_event_counters_snapshot_post_increment() {
        let mut record = record_in(Some("inactive"));
        record.starts = 4;
        record.stops = 2;

        let outcome = classify("svc.service", &record, &snapshot("active", "running"));
        let event = outcome.event.unwrap();
        assert_eq!(event.counters.starts, 5);
        assert_eq!(event.counters.stops, 2);
    }

    // --- store ---

    fn units(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = UnitStateStore::new(dir.path().join("states.json"));

        let mut records = HashMap::new();
        records.insert(
            "a.service".to_string(),
            UnitRecord {
                last_state: Some("active".to_string()),
                last_change_time: Some("2025-01-01 12:00:00".to_string()),
                starts: 3,
                stops: 2,
                crashes: 1,
                logged_unloaded: false,
            },
        );
        records.insert("b.service".to_string(), UnitRecord::default());

        store.save(&records).unwrap();
        let loaded = store.load(&units(&["a.service", "b.service"]));
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_store_drops_unmonitored_units() {
        // Scenario E: persisted old.service vanishes when the monitored
        // set moves on.
        let dir = tempfile::tempdir().unwrap();
        let store = UnitStateStore::new(dir.path().join("states.json"));

        let mut records = HashMap::new();
        records.insert(
            "old.service".to_string(),
            UnitRecord {
                starts: 1,
                ..UnitRecord::default()
            },
        );
        store.save(&records).unwrap();

        let loaded = store.load(&units(&["new.service"]));
        assert!(!loaded.contains_key("old.service"));
        let new = &loaded["new.service"];
        assert_eq!(new.starts, 0);
        assert_eq!(new.last_state, None);
    }

    #[test]
    fn test_store_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = UnitStateStore::new(dir.path().join("nope").join("states.json"));

        let loaded = store.load(&units(&["a.service"]));
        assert_eq!(loaded["a.service"], UnitRecord::default());
    }

    #[test]
    fn test_store_corrupt_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = UnitStateStore::new(&path);
        let loaded = store.load(&units(&["a.service"]));
        assert_eq!(loaded["a.service"], UnitRecord::default());
    }

    #[test]
    fn test_store_coerces_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.json");
        std::fs::write(&path, r#"{"a.service": {"starts": 7}}"#).unwrap();

        let store = UnitStateStore::new(&path);
        let loaded = store.load(&units(&["a.service"]));
        let record = &loaded["a.service"];
        assert_eq!(record.starts, 7);
        assert_eq!(record.stops, 0);
        assert_eq!(record.last_state, None);
        assert!(!record.logged_unloaded);
    }

    #[test]
    fn test_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = UnitStateStore::new(dir.path().join("deep").join("states.json"));

        store.save(&HashMap::new()).unwrap();
        assert!(store.path().exists());
    }

    // --- transition log + stats ---

    fn event(kind: EventKind, unit: &str, from: Option<&str>, to: &str) -> Event {
        Event {
            kind,
            unit: unit.to_string(),
            from_state: from.map(str::to_string),
            to_state: to.to_string(),
            sub_state: "running".to_string(),
            counters: Counters {
                starts: 1,
                stops: 0,
                crashes: 0,
            },
            timestamp: chrono::Utc::now(),
            exit_code: None,
            exit_detail: None,
        }
    }

    #[test]
    fn test_event_line_format() {
        let line = format_event_line(
            &event(EventKind::Start, "nginx.service", None, "active"),
            14,
        );
        assert_eq!(
            line,
            "Service nginx.service : None         -> active       (START) - \
             Starts: 1, Stops: 0, Crashes: 0"
        );

        let info = format_event_line(
            &event(EventKind::Transition, "nginx.service", Some("active"), "deactivating"),
            13,
        );
        assert!(info.contains("(SubState: running)"));
        assert!(!info.contains("Starts:"));
    }

    #[test]
    fn test_stats_round_trip_through_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transitions.log");
        let log = TransitionLog::new(&path, 1024 * 1024, 1).unwrap();

        log.log_event(&event(EventKind::Start, "a.service", None, "active"), 9);
        log.log_event(
            &event(EventKind::Stop, "a.service", Some("active"), "inactive"),
            9,
        );
        let mut crash = event(EventKind::Crash, "b.service", Some("active"), "failed");
        crash.exit_code = Some(2);
        crash.exit_detail = Some("SIGKILL".to_string());
        log.log_event(&crash, 9);
        log.log_event(
            &event(EventKind::RestartCycle, "b.service", Some("active"), "activating"),
            9,
        );
        // Informational lines must not be tallied.
        log.log_event(
            &event(EventKind::Transition, "a.service", Some("active"), "deactivating"),
            9,
        );
        log.info("Initial state for a.service: active (SubState: running)");
        log.flush();

        let reporter = crate::monitor::stats::StatsReporter::new(&path);
        let stats = reporter.scan();

        assert_eq!(
            stats["a.service"],
            ServiceStats {
                crashes: 0,
                restarts: 0,
                starts: 1,
                stops: 1,
            }
        );
        assert_eq!(
            stats["b.service"],
            ServiceStats {
                crashes: 1,
                restarts: 1,
                starts: 0,
                stops: 0,
            }
        );
    }

    #[test]
    fn test_stats_parse_rejects_noise() {
        assert!(parse_event_line("random noise").is_none());
        assert!(parse_event_line(
            "2025-01-01 00:00:00 - [INFO] Initial state for a.service: active (SubState: running)"
        )
        .is_none());
        assert!(parse_event_line(
            "2025-01-01 00:00:00 - [INFO] Service a.service: active -> deactivating \
             (SubState: stop-sigterm)"
        )
        .is_none());

        let parsed = parse_event_line(
            "2025-01-01 00:00:00 - [INFO] Service a.service  : inactive     -> active       \
             (START) - Starts: 1, Stops: 0, Crashes: 0",
        );
        assert_eq!(parsed, Some(("a.service".to_string(), EventKind::Start)));
    }

    #[test]
    fn test_stats_table_rendering() {
        let lines = [
            "x - [INFO] Service b.service: inactive -> active (START) - Starts: 1, Stops: 0, Crashes: 0",
            "x - [ERROR] Service a.service: active -> failed (**CRASH**)! SubState: failed, Status: SIGKILL, Code: 2. Crashes: 1, Starts: 1, Stops: 1",
            "x - [INFO] Service a.service: failed -> activating (START) - Starts: 2, Stops: 1, Crashes: 1",
        ];
        let stats = tally_lines(lines.iter().copied());
        let table = render_table(&stats);

        let rows: Vec<&str> = table.lines().collect();
        assert_eq!(rows[0], "Service    Crashes  Restarts  Starts  Stops");
        assert!(rows[1].chars().all(|c| c == '-'));
        assert_eq!(rows[1].len(), rows[0].len());
        // Sorted by service name ascending.
        assert!(rows[2].starts_with("a.service"));
        assert!(rows[3].starts_with("b.service"));
        assert!(rows[2].ends_with("1         0       1      0"));
    }

    #[test]
    fn test_stats_table_empty() {
        let stats = std::collections::BTreeMap::new();
        assert_eq!(render_table(&stats), "No events found");
    }

    #[test]
    fn test_transition_log_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.log");
        let log = TransitionLog::new(&path, 256, 2).unwrap();

        for _ in 0..20 {
            log.info("a line long enough to force rotation before too long");
        }
        log.flush();

        let backup = dir.path().join("tiny.log.1");
        assert!(backup.exists());
        assert!(std::fs::metadata(&path).unwrap().len() <= 256);
    }

    #[test]
    fn test_rotation_without_backups_starts_over_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.log");
        let log = TransitionLog::new(&path, 128, 0).unwrap();

        for _ in 0..20 {
            log.info("a line long enough to push the file over the cap");
        }
        log.flush();

        assert!(!dir.path().join("tiny.log.1").exists());
        assert!(std::fs::metadata(&path).unwrap().len() <= 128);
    }

    // --- structured event log ---

    #[test]
    fn test_event_logger_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let logger = EventLogger::new(&path, 1024 * 1024, 1).unwrap();

        let mut crash = event(EventKind::Crash, "c.service", Some("active"), "failed");
        crash.exit_code = Some(2);
        crash.exit_detail = Some("SIGSEGV".to_string());
        logger.log_event(&crash);
        logger.log_event(&event(EventKind::Start, "c.service", Some("failed"), "active"));
        logger.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "crash");
        assert_eq!(first["service"], "c.service");
        assert_eq!(first["from_state"], "active");
        assert_eq!(first["to_state"], "failed");
        assert_eq!(first["exit_code"], 2);
        assert_eq!(first["exit_detail"], "SIGSEGV");
        assert_eq!(first["machine_id"], logger.machine_id());
        assert!(first["timestamp"].is_string());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "start");
        assert_eq!(second["counters"]["starts"], 1);
        // Crash-only fields stay off non-crash records.
        assert!(second.get("exit_code").is_none());
    }
}
