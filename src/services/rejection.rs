use uuid::Uuid;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{
    Actor, Assignment, Booking, RejectionRequest, RequestStatus, Review, Reviewable, Role,
    Verdict,
};
use crate::services::booking::{load_booking, store_booking};
use crate::services::notifier::{dispatch, Notification};
use crate::services::now;
use crate::state::AppState;

/// Files a provider's request to be released from a booking they hold.
/// Only one request per booking may be pending at a time.
pub fn request_rejection(
    state: &AppState,
    actor: &Actor,
    booking_id: &str,
    reason: &str,
) -> Result<RejectionRequest, AppError> {
    if actor.role != Role::Provider {
        return Err(AppError::Forbidden(
            "only providers may request to be released from a booking".to_string(),
        ));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("a rejection reason is required".to_string()));
    }

    let mut db = state.db();
    let tx = db.transaction()?;

    let booking = load_booking(&tx, booking_id)?;
    if !booking.provider.is_assigned_to(&actor.id) {
        return Err(AppError::Forbidden(format!(
            "booking {booking_id} is not assigned to this provider"
        )));
    }
    if !booking.status.is_open() {
        return Err(AppError::InvalidState {
            action: "request rejection",
            status: booking.status.as_str(),
        });
    }
    if let Some(existing) = queries::find_pending_rejection(&tx, booking_id)? {
        return Err(AppError::Conflict(format!(
            "rejection request {} is already pending for booking {booking_id}",
            existing.id
        )));
    }

    let request = RejectionRequest {
        id: Uuid::new_v4().to_string(),
        booking_id: booking_id.to_string(),
        provider_id: actor.id.clone(),
        reason: reason.to_string(),
        status: RequestStatus::Pending,
        requested_at: now(),
        review: None,
    };
    queries::insert_rejection_request(&tx, &request).map_err(|e| {
        if db::is_constraint_violation(&e) {
            AppError::Conflict(format!(
                "a rejection request is already pending for booking {booking_id}"
            ))
        } else {
            AppError::Internal(e)
        }
    })?;
    tx.commit()?;

    tracing::info!(
        request_id = %request.id,
        booking_id,
        provider_id = %actor.id,
        "rejection requested"
    );
    Ok(request)
}

/// Releases the provider: the booking goes back to the unassigned pool with
/// its status unchanged.
pub async fn approve(
    state: &AppState,
    actor: &Actor,
    request_id: &str,
    notes: Option<String>,
) -> Result<RejectionRequest, AppError> {
    adjudicate(state, actor, request_id, Verdict::Approve, notes).await
}

/// Keeps the provider bound to the booking.
pub async fn deny(
    state: &AppState,
    actor: &Actor,
    request_id: &str,
    notes: Option<String>,
) -> Result<RejectionRequest, AppError> {
    adjudicate(state, actor, request_id, Verdict::Reject, notes).await
}

async fn adjudicate(
    state: &AppState,
    actor: &Actor,
    request_id: &str,
    verdict: Verdict,
    notes: Option<String>,
) -> Result<RejectionRequest, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only admins may resolve rejection requests".to_string(),
        ));
    }

    let (request, provider_phone) = {
        let mut db = state.db();
        let tx = db.transaction()?;

        let mut request = queries::get_rejection_request(&tx, request_id)?
            .ok_or_else(|| AppError::not_found("rejection request", request_id))?;
        request.resolve(
            verdict,
            Review {
                reviewer_id: actor.id.clone(),
                reviewed_at: now(),
                notes: notes.filter(|n| !n.trim().is_empty()),
            },
        )?;
        if !queries::resolve_rejection_request(&tx, &request)? {
            return Err(AppError::Conflict(format!(
                "rejection request {request_id} was resolved concurrently"
            )));
        }

        if request.status == RequestStatus::Approved {
            let mut booking = load_booking(&tx, &request.booking_id)?;
            if release(&mut booking, &request.provider_id) {
                store_booking(&tx, &mut booking)?;
            } else {
                tracing::warn!(
                    booking_id = %booking.id,
                    status = booking.status.as_str(),
                    "approved rejection left booking untouched"
                );
            }
        }

        let phone = queries::get_provider(&tx, &request.provider_id)?.and_then(|p| p.phone);
        tx.commit()?;
        (request, phone)
    };

    tracing::info!(
        request_id,
        booking_id = %request.booking_id,
        status = request.status.as_str(),
        "rejection request resolved"
    );

    dispatch(
        state.notifier.as_ref(),
        Notification::RejectionResolved {
            booking_id: request.booking_id.clone(),
            approved: request.status == RequestStatus::Approved,
        },
        provider_phone.as_deref(),
    )
    .await;

    Ok(request)
}

/// Unbinds `provider_id` if it still holds an open booking.
fn release(booking: &mut Booking, provider_id: &str) -> bool {
    if booking.provider.is_assigned_to(provider_id) && booking.status.is_open() {
        booking.provider = Assignment::Unassigned;
        true
    } else {
        false
    }
}

pub fn list_pending(state: &AppState, actor: &Actor, limit: i64) -> Result<Vec<RejectionRequest>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only admins may review rejection requests".to_string(),
        ));
    }
    let db = state.db();
    Ok(queries::list_pending_rejections(&db, limit)?)
}
