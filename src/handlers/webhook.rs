use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha1::Sha1;

use crate::errors::AppError;
use crate::services::gateway::GatewayOutcome;
use crate::services::payment;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Debug, Deserialize)]
pub struct GatewayCallback {
    pub payment_id: String,
    pub transaction_id: Option<String>,
    pub outcome: String,
    pub reason: Option<String>,
}

/// Base64 HMAC-SHA1 of the raw request body.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    let result = mac.finalize().into_bytes();
    Some(base64::engine::general_purpose::STANDARD.encode(result))
}

fn validate_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

// POST /webhooks/payments
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    // Signature check is skipped when no secret is configured (dev mode).
    let secret = &state.config.gateway_webhook_secret;
    if !secret.is_empty() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() {
            tracing::warn!("missing X-Gateway-Signature header");
            return Err(AppError::Forbidden("missing signature".to_string()));
        }
        if !validate_signature(secret, signature, &body) {
            tracing::warn!("invalid gateway signature");
            return Err(AppError::Forbidden("invalid signature".to_string()));
        }
    }

    let callback: GatewayCallback = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("malformed callback: {e}")))?;

    tracing::info!(
        payment_id = %callback.payment_id,
        outcome = %callback.outcome,
        "gateway callback"
    );

    match GatewayOutcome::parse(&callback.outcome) {
        Some(GatewayOutcome::Success) => {
            let transaction_id = callback.transaction_id.as_deref().ok_or_else(|| {
                AppError::Validation("transaction_id is required for SUCCESS".to_string())
            })?;
            let payment = payment::mark_success(&state, &callback.payment_id, transaction_id)?;
            Ok((
                StatusCode::OK,
                Json(json!({ "status": payment.status, "invoice_number": payment.invoice_number })),
            ))
        }
        Some(GatewayOutcome::Failed) => {
            let reason = callback
                .reason
                .as_deref()
                .unwrap_or("gateway reported failure");
            let payment = payment::mark_failed(&state, &callback.payment_id, reason)?;
            Ok((StatusCode::OK, Json(json!({ "status": payment.status }))))
        }
        _ => Ok((StatusCode::ACCEPTED, Json(json!({ "status": "ignored" })))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"payment_id":"p-1","outcome":"FAILED"}"#;
        let signature = sign_payload("whsec", body).unwrap();
        assert!(validate_signature("whsec", &signature, body));
        assert!(!validate_signature("other", &signature, body));
        assert!(!validate_signature("whsec", &signature, b"{}"));
        assert!(!validate_signature("whsec", "not base64!", body));
    }
}
