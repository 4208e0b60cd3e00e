// Configuration management

use crate::error::{Result, UnitwatchError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Unit names to monitor. This set is authoritative: persisted state
    /// for units not listed here is dropped on load.
    pub monitored_services: Vec<String>,
    /// Plain-text transition log (parsed by the stats reporter).
    pub log_file: PathBuf,
    /// Structured JSON-Lines event log.
    pub event_log_file: PathBuf,
    /// JSON persistence file for per-unit counters.
    pub persistence_file: PathBuf,
    /// Interval between summary tables, in seconds.
    pub stats_interval_secs: u64,
    /// Port for the Prometheus /metrics endpoint.
    pub metrics_port: u16,
    /// Bounded retry for per-unit bus calls.
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitored_services: Vec::new(),
            log_file: PathBuf::from("/tmp/unitwatch.log"),
            event_log_file: PathBuf::from("/var/lib/unitwatch/events.jsonl"),
            persistence_file: PathBuf::from("/var/lib/unitwatch/unit_states.json"),
            stats_interval_secs: 60,
            metrics_port: 9090,
            max_retries: 3,
            retry_delay_ms: 500,
            debug: false,
        }
    }
}

impl Config {
    /// Get default config path: ~/.config/unitwatch/config.yaml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("unitwatch").join("config.yaml"))
    }

    /// Load config from path, falling back to defaults if not found
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| Self::default_path().unwrap_or_default());

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_yaml::from_str(&contents)
                .map_err(|e| UnitwatchError::Config(format!("{}: {}", config_path.display(), e)))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to path
    pub fn save(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// A monitor without units is a configuration error, not a valid
    /// idle mode.
    pub fn validate(&self) -> Result<()> {
        if self.monitored_services.is_empty() {
            return Err(UnitwatchError::Config(
                "no services configured; pass --services or set monitored_services".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Padding width for unit names in log lines: the longest monitored
    /// name, so columns line up.
    pub fn name_pad(&self) -> usize {
        self.monitored_services
            .iter()
            .map(|s| s.len())
            .max()
            .unwrap_or(0)
    }
}
