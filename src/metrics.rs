// Prometheus metrics for monitored services
//
// Counters track deltas since monitor startup, not the persisted
// historical counters; the state store stays authoritative for history.

use crate::error::{Result, UnitwatchError};
use crate::systemd::models::{state_gauge_value, Event, EventKind};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub struct ServiceMetrics {
    registry: Registry,
    service_state: IntGaugeVec,
    last_change: GaugeVec,
    starts: IntCounterVec,
    stops: IntCounterVec,
    crashes: IntCounterVec,
    restarts: IntCounterVec,
    monitor_info: IntGaugeVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let service_state = IntGaugeVec::new(
            Opts::new(
                "service_state",
                "Service state: 1=active, 0=inactive, 2=activating, \
                 3=deactivating, -1=failed, -2=unloaded, -99=unknown",
            ),
            &["service"],
        )
        .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;

        let last_change = GaugeVec::new(
            Opts::new(
                "service_last_change_timestamp",
                "Unix timestamp of last observed state change",
            ),
            &["service"],
        )
        .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;

        let starts = IntCounterVec::new(
            Opts::new(
                "service_starts_total",
                "Service starts since the monitor started",
            ),
            &["service"],
        )
        .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;

        let stops = IntCounterVec::new(
            Opts::new(
                "service_stops_total",
                "Service stops since the monitor started",
            ),
            &["service"],
        )
        .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;

        let crashes = IntCounterVec::new(
            Opts::new(
                "service_crashes_total",
                "Service crashes (failed state) since the monitor started",
            ),
            &["service"],
        )
        .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;

        let restarts = IntCounterVec::new(
            Opts::new(
                "service_restarts_total",
                "Service restart cycles since the monitor started",
            ),
            &["service"],
        )
        .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;

        let monitor_info = IntGaugeVec::new(
            Opts::new("unitwatch_monitor_info", "Metadata about this monitor"),
            &["version", "monitored_services", "service_count"],
        )
        .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;

        for collector in [
            Box::new(service_state.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(last_change.clone()),
            Box::new(starts.clone()),
            Box::new(stops.clone()),
            Box::new(crashes.clone()),
            Box::new(restarts.clone()),
            Box::new(monitor_info.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| UnitwatchError::Metrics(e.to_string()))?;
        }

        Ok(Self {
            registry,
            service_state,
            last_change,
            starts,
            stops,
            crashes,
            restarts,
            monitor_info,
        })
    }

    pub fn set_monitor_info(&self, version: &str, monitored_services: &[String]) {
        let mut services: Vec<&str> = monitored_services.iter().map(String::as_str).collect();
        services.sort_unstable();
        self.monitor_info
            .with_label_values(&[
                version,
                &services.join(","),
                &services.len().to_string(),
            ])
            .set(1);
    }

    /// Update the state gauge and last-change timestamp for a unit.
    pub fn update_service_state(&self, service: &str, state: &str, timestamp_secs: f64) {
        self.service_state
            .with_label_values(&[service])
            .set(state_gauge_value(state));
        self.last_change
            .with_label_values(&[service])
            .set(timestamp_secs);
    }

    /// Record counter deltas for one classified event. A crash is also a
    /// stop and a restart cycle is a stop plus a start, mirroring the
    /// classifier's counter policy.
    pub fn record_event(&self, event: &Event) {
        let service = event.unit.as_str();
        match event.kind {
            EventKind::Start => self.starts.with_label_values(&[service]).inc(),
            EventKind::Stop => self.stops.with_label_values(&[service]).inc(),
            EventKind::Crash => {
                self.stops.with_label_values(&[service]).inc();
                self.crashes.with_label_values(&[service]).inc();
            }
            EventKind::RestartCycle => {
                self.stops.with_label_values(&[service]).inc();
                self.starts.with_label_values(&[service]).inc();
                self.restarts.with_label_values(&[service]).inc();
            }
            EventKind::Transition => {}
        }
    }

    /// Render the registry in Prometheus exposition format.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Serve `/metrics` until the shutdown signal flips.
pub fn spawn_exporter(
    metrics: Arc<ServiceMetrics>,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!("Prometheus metrics available at http://{}/metrics", addr);
                listener
            }
            Err(e) => {
                tracing::error!("Failed to bind metrics endpoint on {}: {}", addr, e);
                return;
            }
        };

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!("Metrics accept error: {}", e);
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let metrics = metrics.clone();

                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                            let metrics = metrics.clone();
                            async move { handle_request(req, &metrics) }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            tracing::debug!("Metrics connection error: {}", e);
                        }
                    });
                }
                _ = shutdown.changed() => {
                    tracing::info!("Metrics exporter shutting down");
                    break;
                }
            }
        }
    })
}

fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: &ServiceMetrics,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(metrics.render())))
            .unwrap()),
        "/health" | "/healthz" => Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from("OK")))
            .unwrap()),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from("Not Found")))
            .unwrap()),
    }
}
