// Durable unit-state store
//
// One JSON object keyed by unit name. The monitored set from config is
// authoritative: load drops persisted units that are no longer
// monitored and zero-initializes monitored units the file lacks.

use crate::error::{Result, UnitwatchError};
use crate::systemd::models::UnitRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct UnitStateStore {
    path: PathBuf,
}

impl UnitStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load records for the monitored set. Never fails fatally: a
    /// missing or corrupt file falls back to all-default records.
    pub fn load(&self, monitored_units: &[String]) -> HashMap<String, UnitRecord> {
        let persisted: HashMap<String, UnitRecord> = match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => {
                    tracing::info!("Unit states loaded from {}", self.path.display());
                    map
                }
                Err(e) => {
                    tracing::error!(
                        "Corrupt persistence file {}: {}. Initializing default states.",
                        self.path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "Persistence file not found: {}. Initializing new states.",
                    self.path.display()
                );
                HashMap::new()
            }
            Err(e) => {
                tracing::error!(
                    "Error reading {}: {}. Initializing default states.",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }
        };

        let mut records = HashMap::with_capacity(monitored_units.len());
        for unit in monitored_units {
            let record = persisted.get(unit).cloned().unwrap_or_default();
            records.insert(unit.clone(), record);
        }

        for dropped in persisted.keys().filter(|k| !records.contains_key(*k)) {
            tracing::info!("Removed unmonitored unit from state: {}", dropped);
        }

        records
    }

    /// Persist the full record map. Write-then-rename so a crash mid-save
    /// cannot leave a truncated file. Failure is reported to the caller,
    /// who keeps running with in-memory state.
    pub fn save(&self, records: &HashMap<String, UnitRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UnitwatchError::Persistence(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| UnitwatchError::Persistence(format!("serialize failed: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            UnitwatchError::Persistence(format!("write {} failed: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            UnitwatchError::Persistence(format!(
                "rename to {} failed: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!("Unit states saved to {}", self.path.display());
        Ok(())
    }
}
