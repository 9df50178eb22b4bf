use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::auth::authenticate;
use crate::models::{Booking, CatalogAction, CatalogRequest, RejectionRequest};
use crate::services::{assignment, catalog, rejection};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    pub(crate) fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, 500)
    }
}

#[derive(Deserialize, Default)]
pub struct ReviewBody {
    pub notes: Option<String>,
}

// GET /api/admin/bookings/unassigned
pub async fn get_unassigned(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let bookings = assignment::list_unassigned(&state, &actor, query.limit() as usize)?;
    Ok(Json(bookings))
}

// GET /api/admin/rejection-requests
pub async fn get_rejection_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RejectionRequest>>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(rejection::list_pending(&state, &actor, query.limit())?))
}

// POST /api/admin/rejection-requests/:id/approve
pub async fn approve_rejection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ReviewBody>>,
) -> Result<Json<RejectionRequest>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(rejection::approve(&state, &actor, &id, body.notes).await?))
}

// POST /api/admin/rejection-requests/:id/deny
pub async fn deny_rejection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ReviewBody>>,
) -> Result<Json<RejectionRequest>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(rejection::deny(&state, &actor, &id, body.notes).await?))
}

// GET /api/admin/catalog-requests
pub async fn get_catalog_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<CatalogRequest>>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(catalog::list_pending(&state, &actor, query.limit())?))
}

#[derive(Deserialize)]
pub struct AdminCatalogBody {
    pub provider_id: String,
    pub service_id: String,
    pub action: CatalogAction,
    pub notes: Option<String>,
}

// POST /api/admin/catalog-requests
pub async fn create_catalog_change(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AdminCatalogBody>,
) -> Result<(StatusCode, Json<CatalogRequest>), AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let request = catalog::apply_as_admin(
        &state,
        &actor,
        &body.provider_id,
        &body.service_id,
        body.action,
        body.notes,
    )?;
    Ok((StatusCode::CREATED, Json(request)))
}

// POST /api/admin/catalog-requests/:id/approve
pub async fn approve_catalog_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<ReviewBody>>,
) -> Result<Json<CatalogRequest>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(catalog::approve(&state, &actor, &id, body.notes).await?))
}

#[derive(Deserialize)]
pub struct CatalogRejectBody {
    pub reason: String,
    pub notes: Option<String>,
}

// POST /api/admin/catalog-requests/:id/reject
pub async fn reject_catalog_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<CatalogRejectBody>,
) -> Result<Json<CatalogRequest>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(
        catalog::reject(&state, &actor, &id, &body.reason, body.notes).await?,
    ))
}
