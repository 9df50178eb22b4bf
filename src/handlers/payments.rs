use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::auth::authenticate;
use crate::models::Payment;
use crate::services::payment;
use crate::state::AppState;

// GET /api/payments/:id
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Payment>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(payment::get(&state, &actor, &id)?))
}

#[derive(Deserialize)]
pub struct RefundBody {
    /// Minor currency units.
    pub amount: i64,
    pub reason: Option<String>,
}

// POST /api/payments/:id/refund
pub async fn refund_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<Json<Payment>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    if !actor.is_admin() {
        return Err(AppError::Forbidden("only admins may issue refunds".to_string()));
    }
    let reason = body.reason.as_deref().unwrap_or("manual refund");
    Ok(Json(payment::refund(&state, &id, body.amount, reason).await?))
}
