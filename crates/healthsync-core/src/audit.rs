use crate::crypto::{sha256_hex, sign_audit_entry};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};
use uuid::Uuid;

const MAX_ROTATIONS: usize = 5;
const RETENTION_DAYS: i64 = 90;
const PURGE_THROTTLE: StdDuration = StdDuration::from_secs(24 * 3600);

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit log serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventRecord {
    pub id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
    pub prev_hash: String,
    pub hash: String,
    pub signature: String,
}

/// Append-only, hash-chained, Ed25519-signed audit log. Entries are stored
/// one JSON object per line so a tail -f or a line scanner can follow it
/// live.
pub struct AuditLog {
    path: PathBuf,
    signer: SigningKey,
    inner: Mutex<LogState>,
    max_bytes: u64,
    last_purge: Mutex<Option<Instant>>,
}

struct LogState {
    last_hash: String,
}

impl AuditLog {
    pub fn new<P: AsRef<Path>>(path: P, signer: SigningKey, max_bytes: u64) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let last_hash = Self::load_last_hash(&path)?;
        Ok(Self {
            path,
            signer,
            inner: Mutex::new(LogState { last_hash }),
            max_bytes,
            last_purge: Mutex::new(None),
        })
    }

    fn load_last_hash(path: &Path) -> Result<String, AuditError> {
        if !path.exists() {
            return Ok("CHAIN_START".to_string());
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut last_hash = "CHAIN_START".to_string();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEventRecord = serde_json::from_str(&line)?;
            last_hash = entry.hash;
        }
        Ok(last_hash)
    }

    /// Appends `event_type`/`details` to the chain. If `details` carries a
    /// `requestId` field it is also surfaced as a structured log line, so
    /// request tracing doesn't require grepping the audit file.
    pub fn record(&self, event_type: &str, details: serde_json::Value) -> Result<AuditEventRecord, AuditError> {
        self.rotate_if_needed()?;
        if let Some(request_id) = details.get("requestId") {
            tracing::info!(event_type = event_type, request_id = %request_id, "audit event");
        }
        let mut state = self.inner.lock();
        let prev_hash = state.last_hash.clone();
        let mut value = serde_json::json!({
            "id": Uuid::new_v4(),
            "event_type": event_type,
            "timestamp": Utc::now(),
            "details": details,
            "prev_hash": prev_hash,
        });
        let hash = sha256_hex(value.to_string().as_bytes());
        value["hash"] = serde_json::Value::String(hash.clone());
        let sig = sign_audit_entry(&self.signer, value.to_string().as_bytes());
        value["signature"] = serde_json::Value::String(general_purpose::STANDARD.encode(sig.to_bytes()));

        let record: AuditEventRecord = serde_json::from_value(value)?;
        self.write_record(&record)?;
        state.last_hash = hash;
        Ok(record)
    }

    fn write_record(&self, record: &AuditEventRecord) -> Result<(), AuditError> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        file.flush()?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<(), AuditError> {
        let mut state = self.inner.lock();
        if let Ok(metadata) = fs::metadata(&self.path) {
            if metadata.len() < self.max_bytes {
                return Ok(());
            }
        } else {
            return Ok(());
        }
        for i in (1..=MAX_ROTATIONS).rev() {
            let rotated = self.path_with_suffix(i);
            if rotated.exists() {
                if i == MAX_ROTATIONS {
                    fs::remove_file(&rotated)?;
                } else {
                    fs::rename(&rotated, self.path_with_suffix(i + 1))?;
                }
            }
        }
        if self.path.exists() {
            fs::rename(&self.path, self.path_with_suffix(1))?;
        }
        state.last_hash = "CHAIN_START".to_string();
        Ok(())
    }

    fn path_with_suffix(&self, index: usize) -> PathBuf {
        let mut p = self.path.clone();
        let filename = p.file_name().unwrap().to_string_lossy().to_string();
        p.set_file_name(format!("{}.{}", filename, index));
        p
    }

    /// Most recent records first, optionally filtered to `since` and capped
    /// at `limit`.
    pub fn read_recent(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEventRecord>, AuditError> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEventRecord = serde_json::from_str(&line)?;
            if let Some(since_ts) = since {
                if entry.timestamp < since_ts {
                    continue;
                }
            }
            entries.push(entry);
        }
        entries.reverse();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Drops records older than the retention window and resigns the
    /// remaining chain from `CHAIN_START` so hash continuity holds. Returns
    /// the number of records removed.
    pub fn purge_expired(&self) -> Result<usize, AuditError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let cutoff = Utc::now() - ChronoDuration::days(RETENTION_DAYS);
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut kept = Vec::new();
        let mut removed = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEventRecord = serde_json::from_str(&line)?;
            if entry.timestamp < cutoff {
                removed += 1;
            } else {
                kept.push(entry);
            }
        }
        if removed == 0 {
            return Ok(0);
        }

        let mut state = self.inner.lock();
        let mut prev_hash = "CHAIN_START".to_string();
        let mut rebuilt = Vec::with_capacity(kept.len());
        for mut entry in kept {
            entry.prev_hash = prev_hash.clone();
            let mut value = serde_json::to_value(&entry)?;
            if let Some(obj) = value.as_object_mut() {
                obj.remove("hash");
                obj.remove("signature");
            }
            let hash = sha256_hex(value.to_string().as_bytes());
            let sig = sign_audit_entry(&self.signer, value.to_string().as_bytes());
            entry.hash = hash.clone();
            entry.signature = general_purpose::STANDARD.encode(sig.to_bytes());
            prev_hash = hash;
            rebuilt.push(entry);
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for entry in &rebuilt {
                writeln!(tmp, "{}", serde_json::to_string(entry)?)?;
            }
            tmp.flush()?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        state.last_hash = prev_hash;
        Ok(removed)
    }

    /// Runs `purge_expired` at most once per 24 hours of process uptime.
    pub fn purge_expired_if_needed(&self) -> Result<usize, AuditError> {
        let mut gate = self.last_purge.lock();
        let now = Instant::now();
        if let Some(last) = *gate {
            if now.duration_since(last) < PURGE_THROTTLE {
                return Ok(0);
            }
        }
        *gate = Some(now);
        drop(gate);
        self.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn signer() -> SigningKey {
        SigningKey::generate(&mut rand::rngs::OsRng)
    }

    #[test]
    fn chain_and_rotation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::new(path.clone(), signer(), 512).unwrap();
        for i in 0..50 {
            let e = log.record("pairing.accepted", serde_json::json!({"i": i})).unwrap();
            assert!(!e.hash.is_empty());
        }
        assert!(path.with_file_name("audit.log.1").exists());
    }

    #[test]
    fn read_recent_returns_newest_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::new(path, signer(), 4096).unwrap();
        log.record("a", serde_json::json!({})).unwrap();
        log.record("b", serde_json::json!({})).unwrap();
        let recent = log.read_recent(None, None).unwrap();
        assert_eq!(recent[0].event_type, "b");
        assert_eq!(recent[1].event_type, "a");
    }

    #[test]
    fn purge_expired_drops_old_records_and_keeps_chain_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::new(path, signer(), 1 << 20).unwrap();
        log.record("old", serde_json::json!({})).unwrap();
        let removed = {
            // simulate an expired record by rewriting its timestamp directly
            let contents = fs::read_to_string(&log.path).unwrap();
            let mut entry: AuditEventRecord = serde_json::from_str(contents.trim()).unwrap();
            entry.timestamp = Utc::now() - ChronoDuration::days(RETENTION_DAYS + 1);
            fs::write(&log.path, format!("{}\n", serde_json::to_string(&entry).unwrap())).unwrap();
            log.purge_expired().unwrap()
        };
        assert_eq!(removed, 1);
        assert!(log.read_recent(None, None).unwrap().is_empty());
    }

    #[test]
    fn purge_expired_if_needed_throttles_to_once_per_window() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::new(path, signer(), 1 << 20).unwrap();
        log.record("a", serde_json::json!({})).unwrap();
        let first = log.purge_expired_if_needed().unwrap();
        let second = log.purge_expired_if_needed().unwrap();
        assert_eq!(first, 0); // nothing expired yet, but the gate still advances
        assert_eq!(second, 0); // second call within the window is a no-op regardless
    }
}
