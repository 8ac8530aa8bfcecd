use super::response::{json_response, HttpResponse};
use super::EngineContext;
use crate::http::ParsedRequest;
use chrono::{DateTime, Utc};
use healthsync_core::crypto::sha256_hex;
use healthsync_core::health_types::{HealthDataResponse, HealthDataType};
use healthsync_core::pairing::PairingError;
use serde::Deserialize;
use serde_json::json;

const MAX_LIMIT: i64 = 10_000;
const DEFAULT_LIMIT: i64 = 1_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairRequestBody {
    code: String,
    client_name: String,
}

pub async fn pair(ctx: &EngineContext, req: &ParsedRequest, request_id: &str) -> HttpResponse {
    let body: PairRequestBody = match serde_json::from_slice(&req.body) {
        Ok(b) => b,
        Err(_) => {
            let _ = ctx.audit.record(
                "security.unauthorized_access",
                json!({"path": req.path, "reason": "malformed pairing request", "requestId": request_id}),
            );
            return json_response(400, &json!({"message": "malformed pairing request"}));
        }
    };

    match ctx.pairing.handle_pair_request(&body.code, &body.client_name).await {
        Ok(result) => {
            let client_hash = sha256_hex(body.client_name.as_bytes());
            let _ = ctx
                .audit
                .record("auth.pair", json!({"clientHash": client_hash, "requestId": request_id}));
            json_response(200, &json!({"token": result.token, "expiresAt": result.expires_at}))
        }
        Err(err) => {
            let _ = ctx.audit.record(
                "security.unauthorized_access",
                json!({"path": req.path, "reason": err.to_string(), "requestId": request_id}),
            );
            json_response(400, &json!({"message": pairing_error_message(&err)}))
        }
    }
}

fn pairing_error_message(err: &PairingError) -> &'static str {
    match err {
        PairingError::NoPendingSession => "no pairing session is pending",
        PairingError::InvalidCode => "invalid pairing code",
        PairingError::ExpiredCode => "pairing code has expired",
        PairingError::TooManyAttempts => "too many failed pairing attempts",
        PairingError::StoreFailure => "unable to complete pairing",
    }
}

pub async fn status(ctx: &EngineContext) -> HttpResponse {
    let enabled: Vec<HealthDataType> = ctx.store.enabled_types().into_iter().collect();
    json_response(
        200,
        &json!({
            "status": "ok",
            "version": "1",
            "deviceName": ctx.device_name,
            "enabledTypes": enabled,
            "lastExportAt": ctx.store.last_export_at(),
            "serverTime": Utc::now(),
        }),
    )
}

pub async fn health_types(ctx: &EngineContext) -> HttpResponse {
    let enabled: Vec<HealthDataType> = ctx.store.enabled_types().into_iter().collect();
    json_response(200, &json!({"enabledTypes": enabled}))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthDataRequestBody {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    types: Vec<HealthDataType>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

pub async fn health_data(ctx: &EngineContext, req: &ParsedRequest, request_id: &str) -> HttpResponse {
    let body: HealthDataRequestBody = match serde_json::from_slice(&req.body) {
        Ok(b) => b,
        Err(_) => return json_response(400, &json!({"message": "malformed health data request"})),
    };

    if body.types.is_empty() {
        return json_response(400, &json!({"message": "types must be non-empty"}));
    }
    if body.start > body.end {
        return json_response(400, &json!({"message": "start must not be after end"}));
    }
    let limit = body.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    if limit <= 0 {
        return json_response(400, &json!({"message": "limit must be greater than zero"}));
    }
    let offset = body.offset.unwrap_or(0).max(0) as usize;

    let enabled = ctx.store.enabled_types();
    if !body.types.iter().all(|t| enabled.contains(t)) {
        let _ = ctx.audit.record(
            "security.unauthorized_access",
            json!({"path": req.path, "requestId": request_id}),
        );
        return json_response(403, &json!({"message": "one or more requested types are not enabled"}));
    }

    if !(ctx.device_unlocked)() {
        let _ = ctx
            .audit
            .record("data.read", json!({"status": "locked", "requestId": request_id}));
        return json_response(423, &HealthDataResponse::locked());
    }

    let response = ctx
        .provider
        .fetch_samples(&body.types, body.start, body.end, limit as usize, offset)
        .await;
    let _ = ctx.audit.record(
        "data.read",
        json!({
            "status": serde_json::to_value(&response.status).unwrap_or(json!(null)),
            "count": response.returned_count,
            "hasMore": response.has_more,
            "requestId": request_id,
        }),
    );
    if response.status == healthsync_core::health_types::HealthDataStatus::Ok {
        let _ = ctx.store.record_export(Utc::now());
    }
    json_response(200, &response)
}
