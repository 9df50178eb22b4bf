use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::admin::LimitQuery;
use crate::handlers::auth::authenticate;
use crate::models::{CatalogAction, CatalogRequest};
use crate::services::catalog;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CatalogBody {
    pub service_id: String,
    pub action: CatalogAction,
}

// POST /api/catalog-requests
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CatalogBody>,
) -> Result<(StatusCode, Json<CatalogRequest>), AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let request = catalog::submit(&state, &actor, &body.service_id, body.action)?;
    Ok((StatusCode::CREATED, Json(request)))
}

// GET /api/catalog-requests
pub async fn list_own_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<CatalogRequest>>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(catalog::list_for_provider(&state, &actor, query.limit())?))
}
