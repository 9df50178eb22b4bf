use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Actor, Assignment, Booking, BookingAction, BookingPaymentStatus, BookingStatus, NewBooking,
    Payment, PaymentTiming, Role,
};
use crate::services::notifier::{dispatch, Notification};
use crate::services::refund::{refund_amount, RefundPolicy};
use crate::services::{now, payment};
use crate::state::AppState;

pub(crate) fn load_booking(conn: &Connection, id: &str) -> Result<Booking, AppError> {
    queries::get_booking(conn, id)?.ok_or_else(|| AppError::not_found("booking", id))
}

/// Writes the booking back if nobody changed it since it was read.
pub(crate) fn store_booking(conn: &Connection, booking: &mut Booking) -> Result<(), AppError> {
    booking.updated_at = now();
    if !queries::update_booking(conn, booking)? {
        return Err(AppError::Conflict(format!(
            "booking {} was modified concurrently",
            booking.id
        )));
    }
    booking.version += 1;
    Ok(())
}

/// Runs one read-validate-write unit against a booking inside a transaction.
fn transition<F>(state: &AppState, booking_id: &str, apply: F) -> Result<Booking, AppError>
where
    F: FnOnce(&Connection, &mut Booking) -> Result<(), AppError>,
{
    let mut db = state.db();
    let tx = db.transaction()?;
    let mut booking = load_booking(&tx, booking_id)?;
    let before = booking.status;
    apply(&tx, &mut booking)?;
    store_booking(&tx, &mut booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id,
        from = before.as_str(),
        to = booking.status.as_str(),
        "booking updated"
    );
    Ok(booking)
}

fn ensure_provider_or_admin(booking: &Booking, actor: &Actor) -> Result<(), AppError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Provider if booking.provider.is_assigned_to(&actor.id) => Ok(()),
        _ => Err(AppError::Forbidden(format!(
            "only the assigned provider may act on booking {}",
            booking.id
        ))),
    }
}

fn ensure_customer_or_admin(booking: &Booking, actor: &Actor) -> Result<(), AppError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Customer if booking.customer_id == actor.id => Ok(()),
        _ => Err(AppError::Forbidden(format!(
            "only the booking's customer may act on booking {}",
            booking.id
        ))),
    }
}

fn customer_phone(state: &AppState, customer_id: &str) -> Option<String> {
    let db = state.db();
    match queries::get_customer(&db, customer_id) {
        Ok(customer) => customer.and_then(|c| c.phone),
        Err(e) => {
            tracing::warn!(customer_id, error = %e, "could not look up customer phone, skipping notification");
            None
        }
    }
}

fn provider_phone(state: &AppState, provider: &Assignment) -> Option<String> {
    let id = provider.provider_id()?;
    let db = state.db();
    match queries::get_provider(&db, id) {
        Ok(provider) => provider.and_then(|p| p.phone),
        Err(e) => {
            tracing::warn!(provider_id = id, error = %e, "could not look up provider phone, skipping notification");
            None
        }
    }
}

pub fn get(state: &AppState, booking_id: &str) -> Result<Booking, AppError> {
    let db = state.db();
    load_booking(&db, booking_id)
}

pub fn create(state: &AppState, actor: &Actor, input: NewBooking) -> Result<Booking, AppError> {
    match actor.role {
        Role::Admin => {}
        Role::Customer if actor.id == input.customer_id => {}
        _ => {
            return Err(AppError::Forbidden(
                "bookings are created by the customer or an admin".to_string(),
            ))
        }
    }

    let now = now();
    if input.scheduled_date.and_time(input.scheduled_time) <= now {
        return Err(AppError::Validation(
            "scheduled date and time must be in the future".to_string(),
        ));
    }
    if input.duration_hours < 1 {
        return Err(AppError::Validation(
            "duration must be at least one hour".to_string(),
        ));
    }
    if input.total_amount <= 0 {
        return Err(AppError::Validation(
            "total amount must be greater than zero".to_string(),
        ));
    }

    let mut db = state.db();
    let tx = db.transaction()?;

    if queries::get_customer(&tx, &input.customer_id)?.is_none() {
        return Err(AppError::not_found("customer", &input.customer_id));
    }
    let service = queries::get_service(&tx, &input.service_id)?
        .ok_or_else(|| AppError::not_found("service", &input.service_id))?;
    if !service.active {
        return Err(AppError::Validation(format!(
            "service {} is not currently offered",
            service.id
        )));
    }
    if let Some(patient_id) = input.patient_id.as_deref() {
        let patient = queries::get_patient(&tx, patient_id)?
            .ok_or_else(|| AppError::not_found("patient", patient_id))?;
        if patient.customer_id != input.customer_id {
            return Err(AppError::Validation(format!(
                "patient {patient_id} does not belong to customer {}",
                input.customer_id
            )));
        }
    }

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        customer_id: input.customer_id,
        service_id: input.service_id,
        patient_id: input.patient_id,
        provider: Assignment::Unassigned,
        status: BookingStatus::Pending,
        scheduled_date: input.scheduled_date,
        scheduled_time: input.scheduled_time,
        duration_hours: input.duration_hours,
        total_amount: input.total_amount,
        payment_status: BookingPaymentStatus::Pending,
        payment_method: input.payment_method,
        payment_timing: input.payment_timing,
        notes: input.notes.filter(|n| !n.trim().is_empty()),
        version: 0,
        created_at: now,
        updated_at: now,
    };
    queries::insert_booking(&tx, &booking)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        customer_id = %booking.customer_id,
        scheduled = %booking.scheduled_start(),
        "booking created"
    );
    Ok(booking)
}

/// PENDING → CONFIRMED. Advance-payment bookings are charged right after.
pub async fn accept(state: &AppState, actor: &Actor, booking_id: &str) -> Result<Booking, AppError> {
    let mut opened = None;
    let booking = transition(state, booking_id, |conn, booking| {
        ensure_provider_or_admin(booking, actor)?;
        booking.apply(BookingAction::Accept)?;
        if booking.payment_timing == PaymentTiming::Advance {
            opened = open_payment(conn, state, booking)?;
        }
        Ok(())
    })?;

    dispatch(
        state.notifier.as_ref(),
        Notification::BookingConfirmed {
            booking_id: booking.id.clone(),
            scheduled: booking.scheduled_start(),
        },
        customer_phone(state, &booking.customer_id).as_deref(),
    )
    .await;

    if let Some(payment) = opened {
        payment::charge(state, payment).await?;
        return get(state, booking_id);
    }
    Ok(booking)
}

/// PENDING → CANCELLED, by the provider declining the job.
pub async fn reject(
    state: &AppState,
    actor: &Actor,
    booking_id: &str,
    reason: &str,
) -> Result<Booking, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("a rejection reason is required".to_string()));
    }

    let booking = transition(state, booking_id, |_, booking| {
        ensure_provider_or_admin(booking, actor)?;
        booking.apply(BookingAction::Reject)?;
        booking.append_note(&format!("Rejected: {reason}"));
        Ok(())
    })?;

    dispatch(
        state.notifier.as_ref(),
        Notification::BookingRejected {
            booking_id: booking.id.clone(),
        },
        customer_phone(state, &booking.customer_id).as_deref(),
    )
    .await;

    Ok(booking)
}

/// CONFIRMED → IN_PROGRESS. Needs a bound provider.
pub fn start_service(state: &AppState, actor: &Actor, booking_id: &str) -> Result<Booking, AppError> {
    transition(state, booking_id, |_, booking| {
        ensure_provider_or_admin(booking, actor)?;
        booking.apply(BookingAction::Start)?;
        if booking.provider == Assignment::Unassigned {
            return Err(AppError::Validation(format!(
                "booking {} has no assigned provider",
                booking.id
            )));
        }
        Ok(())
    })
}

/// IN_PROGRESS → COMPLETED. Post-service bookings are charged right after.
pub async fn complete_service(
    state: &AppState,
    actor: &Actor,
    booking_id: &str,
    notes: Option<&str>,
) -> Result<Booking, AppError> {
    let mut opened = None;
    let booking = transition(state, booking_id, |conn, booking| {
        ensure_provider_or_admin(booking, actor)?;
        booking.apply(BookingAction::Complete)?;
        if let Some(notes) = notes {
            booking.append_note(notes);
        }
        if booking.payment_timing == PaymentTiming::PostService {
            opened = open_payment(conn, state, booking)?;
        }
        Ok(())
    })?;

    if let Some(payment) = opened {
        payment::charge(state, payment).await?;
        return get(state, booking_id);
    }
    Ok(booking)
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub booking: Booking,
    pub refunded: i64,
}

/// PENDING/CONFIRMED → CANCELLED, refunding a paid booking per the refund policy.
/// Refused while the booking's charge is still in flight.
pub async fn cancel(state: &AppState, actor: &Actor, booking_id: &str) -> Result<Cancellation, AppError> {
    let booking = transition(state, booking_id, |conn, booking| {
        ensure_customer_or_admin(booking, actor)?;
        if !booking.status.can_be_cancelled() {
            return Err(AppError::InvalidState {
                action: BookingAction::Cancel.as_str(),
                status: booking.status.as_str(),
            });
        }
        if let Some(payment) = queries::get_payment_for_booking(conn, &booking.id)? {
            if payment.status.is_settling() {
                return Err(AppError::Conflict(format!(
                    "payment for booking {} is still being processed",
                    booking.id
                )));
            }
        }
        booking.apply(BookingAction::Cancel)?;
        Ok(())
    })?;

    let owed = refund_amount(&booking, now(), &RefundPolicy::from_config(&state.config));
    let mut refunded = 0;
    if owed > 0 {
        let payment_id = {
            let db = state.db();
            queries::get_payment_for_booking(&db, &booking.id)?.map(|p| p.id)
        };
        match payment_id {
            Some(payment_id) => {
                match payment::refund(state, &payment_id, owed, "booking cancelled").await {
                    Ok(_) => refunded = owed,
                    Err(e) => tracing::warn!(
                        booking_id,
                        payment_id = %payment_id,
                        error = %e,
                        "refund after cancellation failed"
                    ),
                }
            }
            None => tracing::warn!(booking_id, "paid booking has no payment record"),
        }
    }

    let event = Notification::BookingCancelled {
        booking_id: booking.id.clone(),
        refunded,
    };
    dispatch(
        state.notifier.as_ref(),
        event.clone(),
        customer_phone(state, &booking.customer_id).as_deref(),
    )
    .await;
    dispatch(
        state.notifier.as_ref(),
        event,
        provider_phone(state, &booking.provider).as_deref(),
    )
    .await;

    Ok(Cancellation {
        booking: get(state, booking_id)?,
        refunded,
    })
}

/// Moves a PENDING/CONFIRMED booking to a new future slot. The status is kept,
/// so a confirmed booking stays confirmed.
pub fn reschedule(
    state: &AppState,
    actor: &Actor,
    booking_id: &str,
    new_date: NaiveDate,
    new_time: NaiveTime,
) -> Result<Booking, AppError> {
    if new_date.and_time(new_time) <= now() {
        return Err(AppError::Validation(
            "new date and time must be in the future".to_string(),
        ));
    }

    transition(state, booking_id, |_, booking| {
        ensure_customer_or_admin(booking, actor)?;
        booking.apply(BookingAction::Reschedule)?;
        let previous = booking.scheduled_start();
        booking.scheduled_date = new_date;
        booking.scheduled_time = new_time;
        booking.append_note(&format!(
            "Rescheduled from {} to {}",
            previous.format("%Y-%m-%d %H:%M"),
            booking.scheduled_start().format("%Y-%m-%d %H:%M")
        ));
        Ok(())
    })
}

/// Opens the booking's payment unless one already exists.
fn open_payment(conn: &Connection, state: &AppState, booking: &Booking) -> Result<Option<Payment>, AppError> {
    if queries::get_payment_for_booking(conn, &booking.id)?.is_some() {
        tracing::warn!(booking_id = %booking.id, "payment already exists, not charging again");
        return Ok(None);
    }
    payment::open(conn, booking, state.gateway.name()).map(Some)
}
