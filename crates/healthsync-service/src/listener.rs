//! TLS listener: binds a TCP port, terminates TLS 1.3 with the server's
//! self-signed identity, advertises the service over mDNS, and spawns an
//! isolated task per accepted connection running the HTTP engine. Bind,
//! loop `accept`, spawn, log and drop connection-level errors without
//! touching the listener itself.

use crate::http::{self, EngineContext};
use healthsync_core::identity::Identity;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use parking_lot::Mutex;
use rustls::{Certificate, PrivateKey, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

const READY_TIMEOUT: Duration = Duration::from_secs(5);
const MDNS_SERVICE_TYPE: &str = "_healthsync._tcp.local.";

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("listener did not become ready in time")]
    StartTimeout,
    #[error("listener start was cancelled")]
    StartCancelled,
    #[error("tls configuration error: {0}")]
    TlsConfig(String),
    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct ListenerSnapshot {
    pub port: u16,
}

impl ListenerSnapshot {
    pub fn with_fingerprint(self, fingerprint: String) -> FullSnapshot {
        FullSnapshot { port: self.port, fingerprint }
    }
}

#[derive(Debug, Clone)]
pub struct FullSnapshot {
    pub port: u16,
    pub fingerprint: String,
}

struct RunningState {
    port: u16,
    fingerprint: String,
    accept_task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    mdns_daemon: Option<ServiceDaemon>,
}

/// Owns the bound socket, the TLS acceptor, and the mDNS advertisement for
/// the lifetime of one `start`/`stop` cycle. `start`/`stop` may be called
/// repeatedly; each `start` rebuilds everything from a fresh `Identity`.
pub struct TlsListener {
    ctx: Arc<EngineContext>,
    preferred_port: Option<u16>,
    state: Mutex<Option<RunningState>>,
}

impl TlsListener {
    pub fn new(ctx: Arc<EngineContext>, preferred_port: Option<u16>) -> Self {
        Self {
            ctx,
            preferred_port,
            state: Mutex::new(None),
        }
    }

    /// Binds the socket, builds the TLS 1.3 server config from `identity`,
    /// and starts accepting connections. The readiness watch channel is
    /// created and subscribed to *before* the accept task is spawned so a
    /// fast transition to ready can never be missed by a caller racing
    /// `start()` with a readiness wait.
    pub async fn start(&self, identity: Identity) -> Result<FullSnapshot, ListenerError> {
        if self.state.lock().is_some() {
            self.stop();
        }

        let tls_config = build_tls_config(&identity)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let addr: SocketAddr = ([0, 0, 0, 0], self.preferred_port.unwrap_or(0)).into();
        let tcp = TcpListener::bind(addr).await?;
        let port = tcp.local_addr()?.port();

        let (ready_tx, mut ready_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mdns_daemon = advertise_mdns(port);

        let ctx = self.ctx.clone();
        let accept_task = tokio::spawn(accept_loop(tcp, acceptor, ctx, shutdown_rx, ready_tx));

        let became_ready = timeout(READY_TIMEOUT, async {
            loop {
                if *ready_rx.borrow() {
                    return;
                }
                if ready_rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;

        if became_ready.is_err() {
            accept_task.abort();
            return Err(ListenerError::StartTimeout);
        }
        if accept_task.is_finished() {
            return Err(ListenerError::StartCancelled);
        }

        let fingerprint = identity.fingerprint.clone();
        *self.state.lock() = Some(RunningState {
            port,
            fingerprint: fingerprint.clone(),
            accept_task,
            shutdown_tx,
            mdns_daemon,
        });

        info!(port, fingerprint = %fingerprint, "tls listener ready");
        Ok(FullSnapshot { port, fingerprint })
    }

    /// Idempotent: cancels in-flight accepts and clears port/fingerprint.
    /// In-flight connections run to their natural completion.
    pub fn stop(&self) {
        let Some(state) = self.state.lock().take() else {
            return;
        };
        let _ = state.shutdown_tx.send(true);
        state.accept_task.abort();
        if let Some(daemon) = state.mdns_daemon {
            if let Err(e) = daemon.shutdown() {
                warn!(error = %e, "mdns shutdown failed");
            }
        }
        info!(port = state.port, "tls listener stopped");
    }

    pub fn snapshot(&self) -> Option<FullSnapshot> {
        self.state
            .lock()
            .as_ref()
            .map(|s| FullSnapshot { port: s.port, fingerprint: s.fingerprint.clone() })
    }
}

fn build_tls_config(identity: &Identity) -> Result<ServerConfig, ListenerError> {
    use p256::pkcs8::EncodePrivateKey;

    let cert = Certificate(identity.certificate_der.clone());
    let key_der = identity
        .signing_key
        .to_pkcs8_der()
        .map_err(|e| ListenerError::TlsConfig(e.to_string()))?;
    let key = PrivateKey(key_der.as_bytes().to_vec());

    ServerConfig::builder()
        .with_safe_default_cipher_suites()
        .with_safe_default_kx_groups()
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ListenerError::TlsConfig(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .map_err(|e| ListenerError::TlsConfig(e.to_string()))
}

/// Best-effort Bonjour advertisement. A missing or broken mDNS responder
/// (sandboxed CI, no multicast) degrades to a logged warning, never a
/// startup failure.
fn advertise_mdns(port: u16) -> Option<ServiceDaemon> {
    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "mdns daemon unavailable, advertisement skipped");
            return None;
        }
    };
    let instance = format!("healthsync-{port}");
    let host = format!("{instance}.local.");
    let service = match ServiceInfo::new(
        MDNS_SERVICE_TYPE,
        &instance,
        &host,
        "",
        port,
        None::<std::collections::HashMap<String, String>>,
    ) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "mdns service info build failed, advertisement skipped");
            return None;
        }
    };
    match daemon.register(service) {
        Ok(()) => Some(daemon),
        Err(e) => {
            warn!(error = %e, "mdns register failed, advertisement skipped");
            None
        }
    }
}

async fn accept_loop(
    tcp: TcpListener,
    acceptor: TlsAcceptor,
    ctx: Arc<EngineContext>,
    mut shutdown_rx: watch::Receiver<bool>,
    ready_tx: watch::Sender<bool>,
) {
    let _ = ready_tx.send(true);
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = tcp.accept() => {
                let (socket, _peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    match acceptor.accept(socket).await {
                        Ok(tls_stream) => http::handle_connection(tls_stream, ctx).await,
                        Err(e) => warn!(error = %e, "tls handshake failed"),
                    }
                });
            }
        }
    }
}
