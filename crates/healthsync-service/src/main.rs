use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey as AuditSigningKey;
use healthsync_core::audit::AuditLog;
use healthsync_core::crypto::generate_audit_signing_key;
use healthsync_core::identity::IdentityStore;
use healthsync_core::pairing::PairingService;
use healthsync_core::paths;
use healthsync_core::store::Store;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use healthsync_service::http::EngineContext;
use healthsync_service::listener::TlsListener;
use healthsync_service::simulated_provider::SimulatedHealthProvider;

#[derive(Parser, Debug)]
#[command(author, version, about = "HealthSync Local device-resident sync service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a device identity and a default sync configuration.
    Init {
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Start the TLS listener and serve the API until interrupted.
    Run {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Preferred bind port; 0 or omitted picks any free port.
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Process bootstrap options, parsed once at startup from CLI flags.
struct ServiceConfig {
    data_dir: PathBuf,
    port: Option<u16>,
}

/// Process-level read-only view, printed by `init`/`run` for local
/// inspection only — it never crosses the network.
#[derive(Debug, Serialize)]
struct DeviceSnapshot {
    device_id: String,
    started_at: DateTime<Utc>,
    listener: Option<ListenerInfo>,
}

#[derive(Debug, Serialize)]
struct ListenerInfo {
    port: u16,
    fingerprint: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init { data_dir } => init_command(resolve_config(data_dir, None)).await,
        Commands::Run { data_dir, port } => run_command(resolve_config(data_dir, port)).await,
    }
}

fn resolve_config(data_dir_override: Option<PathBuf>, port: Option<u16>) -> Result<ServiceConfig> {
    let data_dir = match data_dir_override {
        Some(p) => p,
        None => paths::data_dir()?,
    };
    Ok(ServiceConfig { data_dir, port })
}

async fn init_command(config: Result<ServiceConfig>) -> Result<()> {
    let config = config?;
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(paths::log_dir(&config.data_dir))?;

    let device_id = load_or_create_device_id(&config.data_dir)?;
    let identity_store = IdentityStore::new(device_id.clone(), config.data_dir.clone());
    let identity = identity_store.load_or_create_identity().await?;
    let store = Store::load_or_create(paths::store_path(&config.data_dir))?;

    println!("Device ID: {device_id}");
    println!("Certificate fingerprint: {}", identity.fingerprint);
    println!(
        "Enabled types: {:?}",
        store
            .enabled_types()
            .into_iter()
            .collect::<Vec<_>>()
    );
    Ok(())
}

async fn run_command(config: Result<ServiceConfig>) -> Result<()> {
    let config = config?;
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(paths::log_dir(&config.data_dir))?;

    let device_id = load_or_create_device_id(&config.data_dir)?;
    let identity_store = IdentityStore::new(device_id.clone(), config.data_dir.clone());
    let identity = identity_store.load_or_create_identity().await?;

    let store = Arc::new(Store::load_or_create(paths::store_path(&config.data_dir))?);
    let pairing = Arc::new(PairingService::new(store.clone()));

    let audit_signing_key = load_or_create_audit_signing_key(&config.data_dir)?;
    let audit = Arc::new(AuditLog::new(
        paths::audit_log_path(&config.data_dir),
        audit_signing_key,
        5 * 1024 * 1024,
    )?);

    let provider: Arc<dyn healthsync_core::provider::HealthProvider> =
        Arc::new(SimulatedHealthProvider::new());

    let unlocked = Arc::new(AtomicBool::new(!simulate_locked_from_env()));
    let unlocked_for_closure = unlocked.clone();
    let ctx = Arc::new(EngineContext::new(
        store.clone(),
        pairing.clone(),
        audit.clone(),
        provider,
        "HealthSync Local".to_string(),
        Box::new(move || unlocked_for_closure.load(Ordering::Relaxed)),
    ));

    let tls_listener = TlsListener::new(ctx.clone(), config.port);
    let snapshot = match tls_listener.start(identity).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            let _ = audit.record(
                "service.start_failed",
                serde_json::json!({"reason": err.to_string()}),
            );
            return Err(anyhow!("listener start failed: {err}"));
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let purge_task = spawn_purge_loop(audit.clone(), shutdown_rx.clone());

    let _ = audit.record(
        "service.start",
        serde_json::json!({"port": snapshot.port}),
    );

    let device_snapshot = DeviceSnapshot {
        device_id,
        started_at: Utc::now(),
        listener: Some(ListenerInfo { port: snapshot.port, fingerprint: snapshot.fingerprint.clone() }),
    };
    info!(
        port = snapshot.port,
        fingerprint = %snapshot.fingerprint,
        "service started – listener ready"
    );
    println!("{}", serde_json::to_string_pretty(&device_snapshot)?);

    signal::ctrl_c().await?;
    info!("service stopping");

    let _ = shutdown_tx.send(true);
    tls_listener.stop();
    purge_task.abort();
    let _ = audit.record("service.stop", serde_json::json!({}));

    Ok(())
}

/// Runs `purge_expired_if_needed` on an hourly tick; the audit log's own
/// 24-hour gate keeps the actual purge to at most once a day regardless of
/// tick frequency.
fn spawn_purge_loop(audit: Arc<AuditLog>, mut shutdown_rx: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match audit.purge_expired_if_needed() {
                        Ok(removed) if removed > 0 => info!(removed, "audit retention sweep"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "audit retention sweep failed"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

fn simulate_locked_from_env() -> bool {
    std::env::var("HEALTHSYNC_SIMULATE_LOCKED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn load_or_create_device_id(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("device_id.txt");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(trimmed);
        }
    }
    let id = uuid::Uuid::new_v4().to_string();
    std::fs::write(&path, &id)?;
    Ok(id)
}

/// The audit log's Ed25519 signing key is process-local and not the kind of
/// secret the device keystore's "unlocked-only" policy is meant for (it
/// protects tamper-evidence, not health data) — persisted as a plain file in
/// the data directory, same trust tier as the cached TLS certificate.
fn load_or_create_audit_signing_key(data_dir: &Path) -> Result<AuditSigningKey> {
    let path = data_dir.join("audit_signing.key");
    if let Ok(bytes) = std::fs::read(&path) {
        if let Ok(arr) = <[u8; 32]>::try_from(bytes.as_slice()) {
            return Ok(AuditSigningKey::from_bytes(&arr));
        }
    }
    let key = generate_audit_signing_key();
    std::fs::write(&path, key.to_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(key)
}
