use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Actor, Booking, BookingPaymentStatus, Payment, PaymentStatus, Role};
use crate::services::booking::{load_booking, store_booking};
use crate::services::gateway::GatewayOutcome;
use crate::services::notifier::{dispatch, Notification};
use crate::services::now;
use crate::state::AppState;

const INVOICE_ATTEMPTS: usize = 5;

fn load_payment(conn: &Connection, id: &str) -> Result<Payment, AppError> {
    queries::get_payment(conn, id)?.ok_or_else(|| AppError::not_found("payment", id))
}

fn store_payment(conn: &Connection, payment: &mut Payment) -> Result<(), AppError> {
    payment.updated_at = now();
    if !queries::update_payment(conn, payment)? {
        return Err(AppError::Conflict(format!(
            "payment {} was modified concurrently",
            payment.id
        )));
    }
    payment.version += 1;
    Ok(())
}

/// Keeps the booking's payment status in step with its payment.
fn sync_booking(conn: &Connection, booking_id: &str, status: BookingPaymentStatus) -> Result<(), AppError> {
    let mut booking = load_booking(conn, booking_id)?;
    if booking.payment_status != status {
        booking.payment_status = status;
        store_booking(conn, &mut booking)?;
    }
    Ok(())
}

/// Prefix followed by eight uppercase hex characters.
pub fn generate_invoice_number(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}{}", &random[..8])
}

fn next_invoice_number(conn: &Connection, prefix: &str) -> Result<String, AppError> {
    for _ in 0..INVOICE_ATTEMPTS {
        let candidate = generate_invoice_number(prefix);
        if !queries::invoice_number_exists(conn, &candidate)? {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict(
        "could not allocate a unique invoice number".to_string(),
    ))
}

pub fn validate_refund_amount(amount: i64, balance: i64) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::InvalidAmount(format!(
            "refund amount must be positive, got {amount}"
        )));
    }
    if amount > balance {
        return Err(AppError::InvalidAmount(format!(
            "refund of {amount} exceeds refundable balance of {balance}"
        )));
    }
    Ok(())
}

/// Opens the single payment record for a booking.
pub fn create(conn: &Connection, booking: &Booking, gateway: &str) -> Result<Payment, AppError> {
    if queries::get_payment_for_booking(conn, &booking.id)?.is_some() {
        return Err(AppError::Conflict(format!(
            "booking {} already has a payment",
            booking.id
        )));
    }

    let now = now();
    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        customer_id: booking.customer_id.clone(),
        amount: booking.total_amount,
        refunded_amount: 0,
        refund_reserved: 0,
        method: booking.payment_method,
        gateway: gateway.to_string(),
        transaction_id: None,
        status: PaymentStatus::Pending,
        timing: booking.payment_timing,
        invoice_number: None,
        paid_at: None,
        failure_reason: None,
        gateway_response: None,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    queries::insert_payment(conn, &payment).map_err(|e| {
        if crate::db::is_constraint_violation(&e) {
            AppError::Conflict(format!("booking {} already has a payment", booking.id))
        } else {
            AppError::Internal(e)
        }
    })?;
    Ok(payment)
}

/// Opens the payment and moves it to PROCESSING inside the caller's
/// transaction, so the booking transition and the charge claim commit together.
pub fn open(conn: &Connection, booking: &Booking, gateway: &str) -> Result<Payment, AppError> {
    let mut payment = create(conn, booking, gateway)?;
    payment.status = PaymentStatus::Processing;
    store_payment(conn, &mut payment)?;
    Ok(payment)
}

/// Charges an opened payment through the gateway and records the outcome.
/// A declined or failed charge yields a FAILED payment, not an error.
pub async fn charge(state: &AppState, payment: Payment) -> Result<Payment, AppError> {
    tracing::info!(
        payment_id = %payment.id,
        booking_id = %payment.booking_id,
        amount = payment.amount,
        "charging booking"
    );

    let result = state
        .gateway
        .initiate(payment.amount, payment.method, &payment.customer_id)
        .await;

    let payment = match result {
        Ok(receipt) if receipt.outcome == GatewayOutcome::Success => {
            mark_success(state, &payment.id, &receipt.transaction_id)?
        }
        Ok(receipt) => {
            let reason = receipt
                .message
                .unwrap_or_else(|| format!("gateway reported {}", receipt.outcome.as_str()));
            record_failure(state, &payment.id, Some(&receipt.transaction_id), &reason)?
        }
        Err(e) => record_failure(state, &payment.id, None, &format!("gateway error: {e:#}"))?,
    };

    if payment.status == PaymentStatus::Failed {
        let phone = {
            let db = state.db();
            queries::get_customer(&db, &payment.customer_id)?.and_then(|c| c.phone)
        };
        dispatch(
            state.notifier.as_ref(),
            Notification::PaymentFailed {
                booking_id: payment.booking_id.clone(),
                reason: payment.failure_reason.clone().unwrap_or_default(),
            },
            phone.as_deref(),
        )
        .await;
    }

    Ok(payment)
}

/// Settles a payment. The invoice number is issued on the first success only;
/// repeating the call on a settled payment changes nothing.
pub fn mark_success(state: &AppState, payment_id: &str, transaction_id: &str) -> Result<Payment, AppError> {
    let mut db = state.db();
    let tx = db.transaction()?;
    let mut payment = load_payment(&tx, payment_id)?;

    match payment.status {
        PaymentStatus::Success => return Ok(payment),
        status if status.is_settling() => {}
        status => {
            return Err(AppError::InvalidState {
                action: "mark payment successful",
                status: status.as_str(),
            })
        }
    }

    let now = now();
    payment.status = PaymentStatus::Success;
    payment.transaction_id = Some(transaction_id.to_string());
    payment.paid_at = Some(now);
    payment.failure_reason = None;
    if payment.invoice_number.is_none() {
        payment.invoice_number = Some(next_invoice_number(&tx, &state.config.invoice_prefix)?);
    }
    store_payment(&tx, &mut payment)?;
    sync_booking(&tx, &payment.booking_id, BookingPaymentStatus::Paid)?;
    tx.commit()?;

    tracing::info!(
        payment_id,
        transaction_id,
        invoice = payment.invoice_number.as_deref().unwrap_or_default(),
        "payment succeeded"
    );
    Ok(payment)
}

pub fn mark_failed(state: &AppState, payment_id: &str, reason: &str) -> Result<Payment, AppError> {
    record_failure(state, payment_id, None, reason)
}

fn record_failure(
    state: &AppState,
    payment_id: &str,
    transaction_id: Option<&str>,
    reason: &str,
) -> Result<Payment, AppError> {
    let mut db = state.db();
    let tx = db.transaction()?;
    let mut payment = load_payment(&tx, payment_id)?;

    if !payment.status.is_settling() {
        return Err(AppError::InvalidState {
            action: "mark payment failed",
            status: payment.status.as_str(),
        });
    }

    payment.status = PaymentStatus::Failed;
    payment.failure_reason = Some(reason.to_string());
    if let Some(transaction_id) = transaction_id {
        payment.transaction_id = Some(transaction_id.to_string());
    }
    store_payment(&tx, &mut payment)?;
    sync_booking(&tx, &payment.booking_id, BookingPaymentStatus::Failed)?;
    tx.commit()?;

    tracing::warn!(payment_id, reason, "payment failed");
    Ok(payment)
}

/// Returns `amount` to the customer through the gateway. The amount is
/// reserved against the balance before the gateway is called and released
/// again if the gateway does not confirm the refund. Refunding the whole
/// balance leaves the payment REFUNDED, anything less PARTIALLY_REFUNDED.
pub async fn refund(
    state: &AppState,
    payment_id: &str,
    amount: i64,
    reason: &str,
) -> Result<Payment, AppError> {
    let transaction_id = reserve_refund(state, payment_id, amount)?;

    let receipt = match state.gateway.refund(&transaction_id, amount).await {
        Ok(receipt) => receipt,
        Err(e) => {
            let msg = format!("refund error: {e:#}");
            release_refund(state, payment_id, amount, &msg)?;
            return Err(AppError::Gateway(msg));
        }
    };
    if receipt.outcome != GatewayOutcome::Success {
        let msg = format!(
            "refund {}: {}",
            receipt.outcome.as_str(),
            receipt.message.as_deref().unwrap_or("no details")
        );
        release_refund(state, payment_id, amount, &msg)?;
        return Err(AppError::Gateway(msg));
    }

    let mut db = state.db();
    let tx = db.transaction()?;
    let mut payment = load_payment(&tx, payment_id)?;
    payment.refund_reserved -= amount;
    payment.refunded_amount += amount;
    let (status, booking_status) = if payment.refunded_amount == payment.amount {
        (PaymentStatus::Refunded, BookingPaymentStatus::Refunded)
    } else {
        (
            PaymentStatus::PartiallyRefunded,
            BookingPaymentStatus::PartiallyRefunded,
        )
    };
    payment.status = status;
    payment.gateway_response = Some(format!("refund {} ({reason})", receipt.refund_id));
    store_payment(&tx, &mut payment)?;
    sync_booking(&tx, &payment.booking_id, booking_status)?;
    tx.commit()?;

    tracing::info!(
        payment_id,
        amount,
        refunded_total = payment.refunded_amount,
        status = payment.status.as_str(),
        reason,
        "payment refunded"
    );
    Ok(payment)
}

/// Claims `amount` of the refundable balance and returns the transaction to refund.
fn reserve_refund(state: &AppState, payment_id: &str, amount: i64) -> Result<String, AppError> {
    let mut db = state.db();
    let tx = db.transaction()?;
    let mut payment = load_payment(&tx, payment_id)?;
    if !payment.status.is_refundable() {
        return Err(AppError::InvalidState {
            action: "refund payment",
            status: payment.status.as_str(),
        });
    }
    validate_refund_amount(amount, payment.refundable_balance())?;
    let transaction_id = payment.transaction_id.clone().ok_or_else(|| {
        AppError::Validation(format!("payment {payment_id} has no gateway transaction"))
    })?;

    payment.refund_reserved += amount;
    store_payment(&tx, &mut payment)?;
    tx.commit()?;
    Ok(transaction_id)
}

fn release_refund(state: &AppState, payment_id: &str, amount: i64, message: &str) -> Result<(), AppError> {
    let mut db = state.db();
    let tx = db.transaction()?;
    let mut payment = load_payment(&tx, payment_id)?;
    payment.refund_reserved -= amount;
    payment.failure_reason = Some(message.to_string());
    store_payment(&tx, &mut payment)?;
    tx.commit()?;

    tracing::warn!(payment_id, amount, message, "refund not completed");
    Ok(())
}

/// A payment as seen by its customer or an admin.
pub fn get(state: &AppState, actor: &Actor, payment_id: &str) -> Result<Payment, AppError> {
    let db = state.db();
    let payment = load_payment(&db, payment_id)?;
    match actor.role {
        Role::Admin => Ok(payment),
        Role::Customer if payment.customer_id == actor.id => Ok(payment),
        _ => Err(AppError::Forbidden(format!(
            "payment {payment_id} is not visible to this account"
        ))),
    }
}
