pub mod handlers;
pub mod parse;
pub mod rate_limit;
pub mod response;
pub mod router;

pub use parse::{read_request, ParseError, ParsedRequest};
pub use rate_limit::RateLimiter;
pub use response::{json_response, HttpResponse};

use healthsync_core::audit::AuditLog;
use healthsync_core::pairing::PairingService;
use healthsync_core::provider::HealthProvider;
use healthsync_core::store::Store;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Everything a request handler needs to serve one connection. Built once at
/// service start and shared (via `Arc`) across every spawned connection task
/// — no handler ever touches process-global state outside this struct.
pub struct EngineContext {
    pub store: Arc<Store>,
    pub pairing: Arc<PairingService>,
    pub audit: Arc<AuditLog>,
    pub provider: Arc<dyn HealthProvider>,
    pub rate_limiter: RateLimiter,
    pub device_name: String,
    pub device_unlocked: Box<dyn Fn() -> bool + Send + Sync>,
}

impl EngineContext {
    pub fn new(
        store: Arc<Store>,
        pairing: Arc<PairingService>,
        audit: Arc<AuditLog>,
        provider: Arc<dyn HealthProvider>,
        device_name: String,
        device_unlocked: Box<dyn Fn() -> bool + Send + Sync>,
    ) -> Self {
        Self {
            store,
            pairing,
            audit,
            provider,
            rate_limiter: RateLimiter::new(),
            device_name,
            device_unlocked,
        }
    }
}

/// Reads one request off `stream`, dispatches it, and writes the response.
/// A structural parse failure still gets a canonical error response — the
/// connection is dropped afterward either way, never the listener.
pub async fn handle_connection<S>(mut stream: S, ctx: Arc<EngineContext>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = match parse::read_request(&mut stream).await {
        Ok(req) => router::dispatch(&ctx, req).await,
        Err(ParseError::BodyTooLarge) => {
            json_response(413, &json!({"message": "request exceeds size limits"}))
        }
        Err(ParseError::Incomplete) => {
            json_response(408, &json!({"message": "request timed out"}))
        }
        Err(ParseError::InvalidRequest) => {
            json_response(400, &json!({"message": "malformed request"}))
        }
    };
    if let Err(err) = response.write_to(&mut stream).await {
        warn!(error = %err, "failed to write response, dropping connection");
        return;
    }
    // Every response carries `Connection: close`; shut down cleanly (TLS
    // close_notify included) rather than letting the peer observe a bare
    // socket close, which some TLS clients treat as a truncation error.
    let _ = stream.shutdown().await;
}
