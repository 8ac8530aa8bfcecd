use crate::health_types::HealthDataType;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedDevice {
    pub id: Uuid,
    pub client_name: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub last_seen_at: DateTime<Utc>,
}

impl PairedDevice {
    pub fn is_reachable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

fn default_enabled_types() -> HashSet<HealthDataType> {
    [
        HealthDataType::StepCount,
        HealthDataType::DistanceWalkingRunning,
        HealthDataType::ActiveEnergyBurned,
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfiguration {
    #[serde(default = "default_enabled_types")]
    pub enabled_types: HashSet<HealthDataType>,
    #[serde(default)]
    pub last_export_at: Option<DateTime<Utc>>,
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            enabled_types: default_enabled_types(),
            last_export_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreData {
    #[serde(default)]
    devices: Vec<PairedDevice>,
    #[serde(default)]
    config: SyncConfiguration,
}

/// Durable home for PairedDevice and SyncConfiguration, guarded by a single
/// lock so a request observes a consistent view of both. Persisted as plain
/// JSON, written atomically via a staging file and rename.
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreData>,
}

impl Store {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            StoreData::default()
        };
        let store = Self {
            path,
            inner: Mutex::new(data),
        };
        if !store.path.exists() {
            store.persist()?;
        }
        Ok(store)
    }

    pub fn enabled_types(&self) -> HashSet<HealthDataType> {
        self.inner.lock().config.enabled_types.clone()
    }

    pub fn set_enabled_types(&self, types: HashSet<HealthDataType>) -> Result<(), StoreError> {
        self.inner.lock().config.enabled_types = types;
        self.persist()
    }

    pub fn last_export_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().config.last_export_at
    }

    pub fn record_export(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.lock().config.last_export_at = Some(at);
        self.persist()
    }

    pub fn insert_device(&self, device: PairedDevice) -> Result<(), StoreError> {
        self.inner.lock().devices.push(device);
        self.persist()
    }

    /// Finds an active, non-expired device by its token hash, touching
    /// `last_seen_at` on success.
    pub fn find_active_by_token_hash(&self, token_hash: &str) -> Option<PairedDevice> {
        let now = Utc::now();
        let found = {
            let mut guard = self.inner.lock();
            let device = guard
                .devices
                .iter_mut()
                .find(|d| d.token_hash == token_hash && d.is_reachable(now))?;
            device.last_seen_at = now;
            device.clone()
        };
        let _ = self.persist();
        Some(found)
    }

    pub fn revoke_all(&self) -> Result<(), StoreError> {
        {
            let mut guard = self.inner.lock();
            for device in guard.devices.iter_mut() {
                device.is_active = false;
            }
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let json = {
            let guard = self.inner.lock();
            serde_json::to_string_pretty(&*guard)?
        };
        write_json_atomic(&self.path, &json)
    }
}

fn write_json_atomic(dest: &Path, json: &str) -> Result<(), StoreError> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let staging = parent.join(format!(".{}.tmp", Uuid::new_v4()));
    {
        let mut file = File::create(&staging)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&staging, dest)?;
    #[cfg(unix)]
    {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
