use crate::crypto::generate_tls_signing_key;
use crate::paths::identity_cert_path;
use crate::secure_storage::{get_identity_key, has_identity_key, store_identity_key};
use crate::x509::{build_self_signed_certificate, fingerprint_sha256_hex};
use p256::ecdsa::SigningKey;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),
    #[error("certificate signing failed: {0}")]
    CertificateSigningFailed(String),
    #[error("keystore io failed: {0}")]
    KeystoreIoFailed(String),
}

#[derive(Clone)]
pub struct Identity {
    pub signing_key: SigningKey,
    pub certificate_der: Vec<u8>,
    pub fingerprint: String,
}

/// Owns the persistent (identity, certificate, fingerprint) triple for the
/// lifetime of the process. All persistent operations are serialized on a
/// single-flight lock so an app pre-warm racing a server start never
/// generates two identities.
pub struct IdentityStore {
    device_id: String,
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl IdentityStore {
    pub fn new(device_id: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_id: device_id.into(),
            data_dir: data_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn load_or_create_identity(&self) -> Result<Identity, IdentityError> {
        let _guard = self.lock.lock().await;

        if has_identity_key(&self.device_id) {
            let pkcs8 = Zeroizing::new(
                get_identity_key(&self.device_id)
                    .map_err(|e| IdentityError::KeystoreIoFailed(e.to_string()))?,
            );
            let signing_key = SigningKey::from_pkcs8_der(&pkcs8)
                .map_err(|e| IdentityError::KeyGenerationFailed(e.to_string()))?;
            let certificate_der = load_or_rebuild_certificate(&self.data_dir, &signing_key)?;
            let fingerprint = fingerprint_sha256_hex(&certificate_der);
            return Ok(Identity {
                signing_key,
                certificate_der,
                fingerprint,
            });
        }

        let signing_key = generate_tls_signing_key();
        let pkcs8_doc = signing_key
            .to_pkcs8_der()
            .map_err(|e| IdentityError::KeyGenerationFailed(e.to_string()))?;
        let pkcs8 = Zeroizing::new(pkcs8_doc.as_bytes().to_vec());
        store_identity_key(&self.device_id, &pkcs8)
            .map_err(|e| IdentityError::KeystoreIoFailed(e.to_string()))?;

        let certificate_der = build_self_signed_certificate(&signing_key);
        persist_certificate(&self.data_dir, &certificate_der)
            .map_err(|e| IdentityError::CertificateSigningFailed(e.to_string()))?;
        let fingerprint = fingerprint_sha256_hex(&certificate_der);
        Ok(Identity {
            signing_key,
            certificate_der,
            fingerprint,
        })
    }

    /// Throwaway identity that never touches the keystore or disk, for
    /// tests and short-lived listeners.
    pub fn create_ephemeral_identity() -> Identity {
        let signing_key = generate_tls_signing_key();
        let certificate_der = build_self_signed_certificate(&signing_key);
        let fingerprint = fingerprint_sha256_hex(&certificate_der);
        Identity {
            signing_key,
            certificate_der,
            fingerprint,
        }
    }
}

/// Reuses the cached certificate bytes for the loaded key whenever present,
/// so a client's pinned fingerprint survives a process restart; only mints a
/// fresh certificate the first time a key is loaded without one cached.
fn load_or_rebuild_certificate(data_dir: &Path, signing_key: &SigningKey) -> Result<Vec<u8>, IdentityError> {
    let path = identity_cert_path(data_dir);
    if let Ok(bytes) = fs::read(&path) {
        return Ok(bytes);
    }
    let certificate_der = build_self_signed_certificate(signing_key);
    persist_certificate(data_dir, &certificate_der)
        .map_err(|e| IdentityError::CertificateSigningFailed(e.to_string()))?;
    Ok(certificate_der)
}

fn persist_certificate(data_dir: &Path, certificate_der: &[u8]) -> anyhow::Result<()> {
    let path = identity_cert_path(data_dir);
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let staging = parent.join(format!(".{}.tmp", Uuid::new_v4()));
    {
        let mut file = File::create(&staging)?;
        file.write_all(certificate_der)?;
        file.sync_all()?;
    }
    fs::rename(&staging, &path)?;
    Ok(())
}
