use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const APP_QUALIFIER: &str = "org";
pub const APP_ORG: &str = "healthsync";
pub const APP_NAME: &str = "healthsync";

/// The OS-default data directory, used when the CLI is not given an
/// explicit `--data-dir` override.
pub fn data_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn log_dir(base: &Path) -> PathBuf {
    base.join("logs")
}

pub fn store_path(base: &Path) -> PathBuf {
    base.join("store.json")
}

pub fn audit_log_path(base: &Path) -> PathBuf {
    log_dir(base).join("audit.log")
}

/// Certificate bytes aren't sensitive and don't need the keystore; they're
/// cached on disk so the fingerprint a client pinned at pairing time stays
/// valid across restarts of the same identity.
pub fn identity_cert_path(base: &Path) -> PathBuf {
    base.join("identity.cert.der")
}
