use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Actor, Assignment, Booking, BookingPaymentStatus, BookingStatus, Customer, Patient, Role,
};
use crate::services::booking::load_booking;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disclosure {
    pub visible: bool,
    pub message: String,
}

/// Decides whether `viewer` may see protected contact details for a service
/// on `service_date`. Providers only see them from the day before the service
/// through the day after; everyone else always does.
pub fn disclose(service_date: NaiveDate, viewer: Role, today: NaiveDate) -> Disclosure {
    match viewer {
        Role::Customer | Role::Admin => Disclosure {
            visible: true,
            message: "available".to_string(),
        },
        Role::Provider => {
            let opens = service_date - Duration::days(1);
            let closes = service_date + Duration::days(1);

            if today < opens {
                Disclosure {
                    visible: false,
                    message: "available 24 hours before service".to_string(),
                }
            } else if today > closes {
                Disclosure {
                    visible: false,
                    message: "no longer available (expired 24 hours after service)".to_string(),
                }
            } else {
                Disclosure {
                    visible: true,
                    message: format!("available for service on {service_date}"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtectedField {
    pub value: Option<String>,
    pub visible: bool,
    pub message: String,
}

impl ProtectedField {
    fn evaluate(value: Option<&str>, service_date: NaiveDate, viewer: Role, today: NaiveDate) -> Self {
        let Disclosure { visible, message } = disclose(service_date, viewer, today);
        Self {
            value: if visible { value.map(str::to_string) } else { None },
            visible,
            message,
        }
    }
}

/// A booking as a particular viewer is allowed to see it.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: String,
    pub status: BookingStatus,
    pub service_id: String,
    pub provider: Assignment,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_hours: i32,
    pub total_amount: i64,
    pub payment_status: BookingPaymentStatus,
    pub notes: Option<String>,
    pub customer_name: String,
    pub patient_name: Option<String>,
    pub customer_phone: ProtectedField,
    pub customer_address: ProtectedField,
    pub emergency_contact_phone: ProtectedField,
}

pub fn project(
    booking: &Booking,
    customer: &Customer,
    patient: Option<&Patient>,
    viewer: Role,
    today: NaiveDate,
) -> BookingView {
    let date = booking.scheduled_date;

    BookingView {
        id: booking.id.clone(),
        status: booking.status,
        service_id: booking.service_id.clone(),
        provider: booking.provider.clone(),
        scheduled_date: booking.scheduled_date,
        scheduled_time: booking.scheduled_time,
        duration_hours: booking.duration_hours,
        total_amount: booking.total_amount,
        payment_status: booking.payment_status,
        notes: booking.notes.clone(),
        customer_name: customer.name.clone(),
        patient_name: patient.map(|p| p.name.clone()),
        customer_phone: ProtectedField::evaluate(customer.phone.as_deref(), date, viewer, today),
        customer_address: ProtectedField::evaluate(customer.address.as_deref(), date, viewer, today),
        emergency_contact_phone: ProtectedField::evaluate(
            patient.and_then(|p| p.emergency_contact_phone.as_deref()),
            date,
            viewer,
            today,
        ),
    }
}

/// Loads a booking and projects it for `actor`, evaluated against today's date.
pub fn view_booking(state: &AppState, actor: &Actor, booking_id: &str) -> Result<BookingView, AppError> {
    let db = state.db();
    let booking = load_booking(&db, booking_id)?;

    let allowed = match actor.role {
        Role::Admin => true,
        Role::Customer => booking.customer_id == actor.id,
        Role::Provider => booking.provider.is_assigned_to(&actor.id),
    };
    if !allowed {
        return Err(AppError::Forbidden(format!(
            "booking {booking_id} is not visible to this account"
        )));
    }

    let customer = queries::get_customer(&db, &booking.customer_id)?
        .ok_or_else(|| AppError::not_found("customer", &booking.customer_id))?;
    let patient = match booking.patient_id.as_deref() {
        Some(id) => queries::get_patient(&db, id)?,
        None => None,
    };

    let today = Utc::now().date_naive();
    Ok(project(&booking, &customer, patient.as_ref(), actor.role, today))
}
