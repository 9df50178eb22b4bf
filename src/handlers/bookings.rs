use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::auth::authenticate;
use crate::models::{Booking, NewBooking, RejectionRequest};
use crate::services::booking::{self, Cancellation};
use crate::services::privacy::{self, BookingView};
use crate::services::{assignment, rejection};
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let booking = booking::create(&state, &actor, input)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(privacy::view_booking(&state, &actor, &id)?))
}

// POST /api/bookings/:id/accept
pub async fn accept_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(booking::accept(&state, &actor, &id).await?))
}

#[derive(Deserialize)]
pub struct ReasonBody {
    pub reason: String,
}

// POST /api/bookings/:id/reject
pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(booking::reject(&state, &actor, &id, &body.reason).await?))
}

// POST /api/bookings/:id/start
pub async fn start_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(booking::start_service(&state, &actor, &id)?))
}

#[derive(Deserialize, Default)]
pub struct CompleteBody {
    pub notes: Option<String>,
}

// POST /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<CompleteBody>>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(
        booking::complete_service(&state, &actor, &id, body.notes.as_deref()).await?,
    ))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Cancellation>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(booking::cancel(&state, &actor, &id).await?))
}

#[derive(Deserialize)]
pub struct RescheduleBody {
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
}

// POST /api/bookings/:id/reschedule
pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RescheduleBody>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(booking::reschedule(
        &state,
        &actor,
        &id,
        body.scheduled_date,
        body.scheduled_time,
    )?))
}

#[derive(Deserialize)]
pub struct AssignBody {
    pub provider_id: String,
}

// POST /api/bookings/:id/assign
pub async fn assign_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AssignBody>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&headers, &state.config)?;
    Ok(Json(
        assignment::assign(&state, &actor, &id, &body.provider_id).await?,
    ))
}

// POST /api/bookings/:id/rejection-requests
pub async fn request_rejection(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReasonBody>,
) -> Result<(StatusCode, Json<RejectionRequest>), AppError> {
    let actor = authenticate(&headers, &state.config)?;
    let request = rejection::request_rejection(&state, &actor, &id, &body.reason)?;
    Ok((StatusCode::CREATED, Json(request)))
}
