use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use keyring::Entry;

const SERVICE_NAME: &str = "org.healthsync.local";
const TLS_KEY_LABEL: &str = "HealthSync Local TLS";

/// Persist the server's PKCS#8-encoded P-256 private key under the device
/// keystore, scoped to "available only while device is unlocked, this
/// device only" by the keyring backend's own access-control policy.
pub fn store_identity_key(device_id: &str, pkcs8_der: &[u8]) -> Result<()> {
    let entry = entry(device_id)?;
    let encoded = general_purpose::STANDARD.encode(pkcs8_der);
    entry
        .set_password(&encoded)
        .map_err(|e| anyhow!("store identity key: {e}"))?;
    Ok(())
}

pub fn get_identity_key(device_id: &str) -> Result<Vec<u8>> {
    let entry = entry(device_id)?;
    let encoded = entry
        .get_password()
        .map_err(|e| anyhow!("load identity key: {e}"))?;
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| anyhow!("decode identity key: {e}"))
}

pub fn delete_identity_key(device_id: &str) -> Result<()> {
    let entry = entry(device_id)?;
    entry
        .delete_password()
        .map_err(|e| anyhow!("delete identity key: {e}"))?;
    Ok(())
}

pub fn has_identity_key(device_id: &str) -> bool {
    entry(device_id)
        .and_then(|e| e.get_password().map_err(|e| anyhow!("{e}")))
        .is_ok()
}

fn entry(device_id: &str) -> Result<Entry> {
    Entry::new(SERVICE_NAME, &format!("{}:{}", TLS_KEY_LABEL, device_id))
        .map_err(|e| anyhow!("keyring init: {e}"))
}
