use super::response::{json_response, HttpResponse};
use super::{handlers, EngineContext, ParsedRequest};
use healthsync_core::crypto::sha256_hex;
use serde_json::json;

pub async fn dispatch(ctx: &EngineContext, req: ParsedRequest) -> HttpResponse {
    let request_id = uuid::Uuid::new_v4().to_string();
    match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/api/v1/pair") => handlers::pair(ctx, &req, &request_id).await,
        ("GET", "/api/v1/status") => match authorize(ctx, &req, &request_id).await {
            Ok(_) => handlers::status(ctx).await,
            Err(resp) => resp,
        },
        ("GET", "/api/v1/health/types") => match authorize(ctx, &req, &request_id).await {
            Ok(_) => handlers::health_types(ctx).await,
            Err(resp) => resp,
        },
        ("POST", "/api/v1/health/data") => match authorize(ctx, &req, &request_id).await {
            Ok(_) => handlers::health_data(ctx, &req, &request_id).await,
            Err(resp) => resp,
        },
        _ => json_response(404, &json!({"message": "not found"})),
    }
}

/// Bearer-token authentication followed by per-token rate limiting. Pairing
/// is exempt: it is the one route a client hits before it has a token.
async fn authorize(ctx: &EngineContext, req: &ParsedRequest, request_id: &str) -> Result<String, HttpResponse> {
    let token = match extract_bearer_token(req) {
        Some(t) => t,
        None => {
            let _ = ctx.audit.record(
                "security.unauthorized_access",
                json!({"path": req.path, "requestId": request_id}),
            );
            return Err(json_response(401, &json!({"message": "missing bearer token"})));
        }
    };

    if !ctx.pairing.validate_token(&token) {
        let _ = ctx.audit.record(
            "security.unauthorized_access",
            json!({"path": req.path, "requestId": request_id}),
        );
        return Err(json_response(401, &json!({"message": "invalid or expired token"})));
    }

    let token_hash = sha256_hex(token.as_bytes());
    if !ctx.rate_limiter.check(&token_hash) {
        let _ = ctx.audit.record(
            "security.rate_limit_exceeded",
            json!({"path": req.path, "requestId": request_id}),
        );
        return Err(json_response(429, &json!({"message": "rate limit exceeded"})));
    }

    Ok(token)
}

fn extract_bearer_token(req: &ParsedRequest) -> Option<String> {
    let header = req.header("authorization")?;
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = parts.next()?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request_with_auth(value: Option<&str>) -> ParsedRequest {
        let mut headers = HashMap::new();
        if let Some(v) = value {
            headers.insert("authorization".to_string(), v.to_string());
        }
        ParsedRequest {
            method: "GET".to_string(),
            path: "/api/v1/status".to_string(),
            headers,
            body: vec![],
        }
    }

    #[test]
    fn extracts_bearer_token() {
        let req = request_with_auth(Some("Bearer abc123"));
        assert_eq!(extract_bearer_token(&req), Some("abc123".to_string()));
    }

    #[test]
    fn rejects_non_bearer_scheme() {
        let req = request_with_auth(Some("Basic abc123"));
        assert_eq!(extract_bearer_token(&req), None);
    }

    #[test]
    fn rejects_missing_header() {
        let req = request_with_auth(None);
        assert_eq!(extract_bearer_token(&req), None);
    }
}
