use crate::crypto::{constant_time_eq, sha256_hex};
use crate::store::{PairedDevice, Store, StoreError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// 54-symbol unambiguous alphabet: excludes I, L, O (upper and lower) and
/// the digits 0 and 1, which are visually confusable in a printed code.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
const CODE_LENGTH: usize = 8;
const PENDING_TTL_SECS: i64 = 5 * 60;
const MAX_FAILED_ATTEMPTS: u32 = 5;
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("no pairing session is pending")]
    NoPendingSession,
    #[error("invalid pairing code")]
    InvalidCode,
    #[error("pairing code has expired")]
    ExpiredCode,
    #[error("too many failed pairing attempts")]
    TooManyAttempts,
    #[error("failed to persist paired device")]
    StoreFailure,
}

impl From<StoreError> for PairingError {
    fn from(_: StoreError) -> Self {
        PairingError::StoreFailure
    }
}

#[derive(Debug, Clone)]
pub struct PendingPairing {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub failed_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingQRCode {
    pub version: String,
    pub host: String,
    pub port: u16,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub certificate_fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingResult {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

fn generate_code() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = (rng.next_u32() as usize) % CODE_ALPHABET.len();
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Single logical owner of the at-most-one pending pairing slot. All
/// operations touching the slot take the same async mutex, so
/// `handle_pair_request` never interleaves observably with
/// `generate_qr_code` or with itself.
pub struct PairingService {
    store: Arc<Store>,
    pending: Mutex<Option<PendingPairing>>,
}

impl PairingService {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            pending: Mutex::new(None),
        }
    }

    /// Overwrites any existing pending session with a freshly drawn code.
    pub async fn generate_qr_code(&self, host: String, port: u16, fingerprint: String) -> PairingQRCode {
        let code = generate_code();
        let expires_at = Utc::now() + ChronoDuration::seconds(PENDING_TTL_SECS);
        {
            let mut guard = self.pending.lock().await;
            *guard = Some(PendingPairing {
                code: code.clone(),
                expires_at,
                failed_attempts: 0,
            });
        }
        PairingQRCode {
            version: "1".to_string(),
            host,
            port,
            code,
            expires_at,
            certificate_fingerprint: fingerprint,
        }
    }

    pub async fn handle_pair_request(
        &self,
        code: &str,
        client_name: &str,
    ) -> Result<PairingResult, PairingError> {
        let mut guard = self.pending.lock().await;
        let pending = guard.as_mut().ok_or(PairingError::NoPendingSession)?;

        if pending.failed_attempts >= MAX_FAILED_ATTEMPTS {
            *guard = None;
            return Err(PairingError::TooManyAttempts);
        }
        if Utc::now() >= pending.expires_at {
            *guard = None;
            return Err(PairingError::ExpiredCode);
        }
        if !constant_time_eq(code.as_bytes(), pending.code.as_bytes()) {
            pending.failed_attempts += 1;
            return Err(PairingError::InvalidCode);
        }
        *guard = None;
        drop(guard);

        let mut token_bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut token_bytes);
        let token = hex::encode(token_bytes);
        let token_hash = sha256_hex(token.as_bytes());
        let name_hash = sha256_hex(client_name.as_bytes());
        let anonymized_name = format!("Client-{}", name_hash[..8].to_uppercase());
        let expires_at = Utc::now() + ChronoDuration::days(TOKEN_TTL_DAYS);

        let device = PairedDevice {
            id: Uuid::new_v4(),
            client_name: anonymized_name,
            token_hash,
            expires_at,
            is_active: true,
            last_seen_at: Utc::now(),
        };
        self.store.insert_device(device)?;

        Ok(PairingResult { token, expires_at })
    }

    /// Looks up an active, non-expired paired device by the SHA-256 of
    /// `token`. Safe to call concurrently with `handle_pair_request` and
    /// `revoke_all`.
    pub fn validate_token(&self, token: &str) -> bool {
        let hash = sha256_hex(token.as_bytes());
        self.store.find_active_by_token_hash(&hash).is_some()
    }

    pub fn revoke_all(&self) -> Result<(), StoreError> {
        self.store.revoke_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn service() -> PairingService {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::load_or_create(dir.path().join("store.json")).unwrap());
        PairingService::new(store)
    }

    #[tokio::test]
    async fn code_alphabet_excludes_ambiguous_glyphs() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            for c in code.chars() {
                assert!(!"IlO01".contains(c), "ambiguous glyph {c} in generated code");
            }
        }
    }

    #[tokio::test]
    async fn wrong_code_increments_failed_attempts_and_keeps_slot() {
        let svc = service();
        let qr = svc.generate_qr_code("host".into(), 4433, "fp".into()).await;
        let wrong = if qr.code == "AAAAAAAA" { "BBBBBBBB" } else { "AAAAAAAA" };
        let err = svc.handle_pair_request(wrong, "Test Mac").await.unwrap_err();
        assert_eq!(err, PairingError::InvalidCode);
        let guard = svc.pending.lock().await;
        assert_eq!(guard.as_ref().unwrap().failed_attempts, 1);
    }

    #[tokio::test]
    async fn five_failures_clear_slot_and_sixth_attempt_is_too_many() {
        let svc = service();
        let qr = svc.generate_qr_code("host".into(), 4433, "fp".into()).await;
        let wrong = if qr.code == "AAAAAAAA" { "BBBBBBBB" } else { "AAAAAAAA" };
        for _ in 0..5 {
            let _ = svc.handle_pair_request(wrong, "Test Mac").await;
        }
        let err = svc.handle_pair_request(&qr.code, "Test Mac").await.unwrap_err();
        assert_eq!(err, PairingError::TooManyAttempts);
    }

    #[tokio::test]
    async fn successful_pairing_anonymizes_client_name() {
        let svc = service();
        let qr = svc.generate_qr_code("host".into(), 4433, "fp".into()).await;
        let result = svc.handle_pair_request(&qr.code, "Test Mac").await.unwrap();
        assert!(svc.validate_token(&result.token));
        let hash = sha256_hex(result.token.as_bytes());
        let device = svc.store.find_active_by_token_hash(&hash).unwrap();
        assert!(device.client_name.starts_with("Client-"));
        assert_eq!(device.client_name.len(), 15);
    }

    #[tokio::test]
    async fn revoke_all_invalidates_every_token() {
        let svc = service();
        let qr = svc.generate_qr_code("host".into(), 4433, "fp".into()).await;
        let result = svc.handle_pair_request(&qr.code, "Test Mac").await.unwrap();
        svc.revoke_all().unwrap();
        assert!(!svc.validate_token(&result.token));
    }
}
