// Monitor core: routes bus notifications through the classifier and
// owns the shared state store.

pub mod classifier;
pub mod event_log;
mod rotate;
pub mod stats;
pub mod store;
pub mod transition_log;

#[cfg(test)]
mod tests;

pub use classifier::{classify, Classification};
pub use event_log::EventLogger;
pub use stats::StatsReporter;
pub use store::UnitStateStore;
pub use transition_log::TransitionLog;

use crate::config::Config;
use crate::error::{Result, UnitwatchError};
use crate::metrics::ServiceMetrics;
use crate::systemd::client::{extract_i32, extract_string, extract_u64};
use crate::systemd::models::{Event, PropertiesSnapshot, UnitRecord, STATE_PAD};
use crate::systemd::SystemdClient;
use crate::version;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use zbus::zvariant::OwnedValue;

/// Owns the record map, the bus client and all sinks. Constructed once
/// and shared by reference; the record map plus its persistence write is
/// the one serialized critical section (store-wide lock, low event rate).
pub struct MonitorService {
    config: Config,
    client: SystemdClient,
    store: UnitStateStore,
    records: Mutex<HashMap<String, UnitRecord>>,
    transition_log: TransitionLog,
    event_log: EventLogger,
    metrics: Arc<ServiceMetrics>,
    name_pad: usize,
}

impl MonitorService {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let connection_manager = crate::systemd::ConnectionManager::new(
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
            Duration::from_secs(5),
        );
        let client = SystemdClient::with_manager(connection_manager).await?;

        let store = UnitStateStore::new(&config.persistence_file);
        let records = store.load(&config.monitored_services);

        let transition_log = TransitionLog::new(
            &config.log_file,
            transition_log::DEFAULT_MAX_BYTES,
            transition_log::DEFAULT_BACKUP_COUNT,
        )?;
        let event_log = EventLogger::new(
            &config.event_log_file,
            event_log::DEFAULT_MAX_BYTES,
            event_log::DEFAULT_BACKUP_COUNT,
        )?;

        let metrics = Arc::new(ServiceMetrics::new()?);
        metrics.set_monitor_info(&version::version(), &config.monitored_services);

        let name_pad = config.name_pad();

        Ok(Arc::new(Self {
            config,
            client,
            store,
            records: Mutex::new(records),
            transition_log,
            event_log,
            metrics,
            name_pad,
        }))
    }

    pub fn metrics(&self) -> Arc<ServiceMetrics> {
        self.metrics.clone()
    }

    /// Subscribe globally, poll every unit once, then spawn the per-unit
    /// notification tasks and the stats ticker. Global subscribe failure
    /// is fatal; per-unit failures only lose that unit.
    pub async fn start(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<tokio::task::JoinHandle<()>>> {
        self.client.subscribe().await.map_err(|e| {
            UnitwatchError::SystemdConnection(format!("global subscribe failed: {}", e))
        })?;
        tracing::info!("Successfully subscribed to systemd D-Bus signals");

        for unit in &self.config.monitored_services {
            self.initial_poll(unit).await;
        }

        let mut handles = Vec::new();
        for unit in self.config.monitored_services.clone() {
            let service = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                service.watch_unit(unit, shutdown).await;
            }));
        }

        let reporter = StatsReporter::new(&self.config.log_file);
        let interval = Duration::from_secs(self.config.stats_interval_secs.max(1));
        let stats_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            run_stats_loop(reporter, interval, stats_shutdown).await;
        }));

        Ok(handles)
    }

    /// One-time synchronous poll at startup. A loaded unit's snapshot
    /// goes through the classifier against the persisted record; an
    /// unloaded unit is marked as such, warned about once.
    async fn initial_poll(&self, unit: &str) {
        match self.client.get_unit_properties(unit).await {
            Ok(snapshot) => {
                let emitted = self.apply_snapshot(unit, &snapshot);
                if emitted.is_none() {
                    // State unchanged since last run; still worth a line.
                    self.transition_log.info(&format!(
                        "Initial state for {:<np$}: {:<sp$} (SubState: {})",
                        unit,
                        snapshot.active_state,
                        snapshot.sub_state,
                        np = self.name_pad,
                        sp = STATE_PAD,
                    ));
                }
                self.metrics.update_service_state(
                    unit,
                    &snapshot.active_state,
                    snapshot.state_change_usec as f64 / 1e6,
                );
            }
            Err(e) => {
                tracing::debug!("Initial poll for {} failed: {}", unit, e);
                let mut records = self.lock_records();
                let record = records.entry(unit.to_string()).or_default();
                if !record.logged_unloaded {
                    self.transition_log.warning(&format!(
                        "Service {:<np$} not loaded or accessible at startup. \
                         Marking as 'unloaded'.",
                        unit,
                        np = self.name_pad,
                    ));
                    record.logged_unloaded = true;
                }
                record.last_state = Some("unloaded".to_string());
                self.metrics.update_service_state(unit, "unloaded", 0.0);
            }
        }
    }

    /// Long-lived per-unit task: subscribe to PropertiesChanged with
    /// bounded retry, then feed every delta through the classifier until
    /// shutdown.
    async fn watch_unit(self: Arc<Self>, unit: String, mut shutdown: watch::Receiver<bool>) {
        let manager = self.client.connection_manager().clone();

        let proxy = match manager
            .with_retry("unit subscribe", || {
                self.client.unit_properties_proxy(&unit)
            })
            .await
        {
            Ok(proxy) => proxy,
            Err(e) => {
                tracing::warn!("Could not subscribe to {}: {}", unit, e);
                self.transition_log.warning(&format!(
                    "Could not subscribe to {:<np$}: {}",
                    unit,
                    e,
                    np = self.name_pad,
                ));
                return;
            }
        };

        let mut stream = match proxy.receive_properties_changed().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Could not open PropertiesChanged stream for {}: {}", unit, e);
                return;
            }
        };
        tracing::info!("Subscribed to PropertiesChanged for {}", unit);

        loop {
            tokio::select! {
                signal = stream.next() => {
                    let Some(signal) = signal else {
                        tracing::warn!("PropertiesChanged stream for {} ended", unit);
                        break;
                    };
                    match signal.args() {
                        Ok(args) => {
                            let mut changed = HashMap::new();
                            for (key, value) in args.changed_properties() {
                                match value.try_to_owned() {
                                    Ok(owned) => {
                                        changed.insert(key.to_string(), owned);
                                    }
                                    Err(e) => {
                                        tracing::debug!(
                                            "Skipping property {} for {}: {}",
                                            key,
                                            unit,
                                            e
                                        );
                                    }
                                }
                            }
                            self.handle_changed(&unit, &changed);
                        }
                        Err(e) => {
                            tracing::warn!("Malformed PropertiesChanged for {}: {}", unit, e);
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Build a snapshot from a delivered change set and classify it.
    /// Missing fields fall back: ActiveState to the record's last state,
    /// the rest to neutral defaults.
    fn handle_changed(&self, unit: &str, changed: &HashMap<String, OwnedValue>) {
        let snapshot = {
            let records = self.lock_records();
            let Some(record) = records.get(unit) else {
                tracing::warn!("Notification for unmonitored unit {}", unit);
                return;
            };

            let active_state = extract_string(changed, "ActiveState")
                .or_else(|| record.last_state.clone())
                .unwrap_or_else(|| "unknown".to_string());

            PropertiesSnapshot {
                active_state,
                sub_state: extract_string(changed, "SubState")
                    .unwrap_or_else(|| "unknown".to_string()),
                exec_main_status: extract_i32(changed, "ExecMainStatus").unwrap_or(0),
                exec_main_code: extract_i32(changed, "ExecMainCode").unwrap_or(0),
                state_change_usec: extract_u64(changed, "StateChangeTimestamp")
                    .unwrap_or_else(now_usec),
            }
        };

        self.apply_snapshot(unit, &snapshot);
        self.metrics.update_service_state(
            unit,
            &snapshot.active_state,
            snapshot.state_change_usec as f64 / 1e6,
        );
    }

    /// Classify one snapshot under the store lock, persist when counters
    /// changed, then fan the event out to the sinks.
    fn apply_snapshot(&self, unit: &str, snapshot: &PropertiesSnapshot) -> Option<Event> {
        let outcome = {
            let mut records = self.lock_records();
            let record = records.entry(unit.to_string()).or_default();
            let outcome = classify(unit, record, snapshot);
            records.insert(unit.to_string(), outcome.record.clone());

            if outcome.counters_changed {
                if let Err(e) = self.store.save(&records) {
                    tracing::error!("Failed to persist unit states: {}", e);
                }
            }
            outcome
        };

        let event = outcome.event?;
        self.transition_log.log_event(&event, self.name_pad);
        self.event_log.log_event(&event);
        self.metrics.record_event(&event);
        tracing::debug!(
            "{}: {} -> {} ({})",
            unit,
            event.from_state.as_deref().unwrap_or("None"),
            event.to_state,
            event.kind.tag()
        );
        Some(event)
    }

    /// Shutdown path: persist current state, best-effort unsubscribe,
    /// flush log handles.
    pub async fn finalize(&self) {
        {
            let records = self.lock_records();
            if let Err(e) = self.store.save(&records) {
                tracing::error!("Failed to persist unit states at shutdown: {}", e);
            }
        }

        match self.client.unsubscribe().await {
            Ok(()) => tracing::info!("Successfully unsubscribed from systemd D-Bus signals"),
            Err(e) => tracing::warn!("Failed to unsubscribe from D-Bus: {}", e),
        }

        self.transition_log.flush();
        self.event_log.flush();
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<String, UnitRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Periodic summary table. The first tick fires after one full interval;
/// the wait is cancellable within a tick via the shutdown signal.
async fn run_stats_loop(
    reporter: StatsReporter,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                println!("{}", reporter.report());
            }
            _ = shutdown.changed() => break,
        }
    }
}

fn now_usec() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}
