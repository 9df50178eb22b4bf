pub mod twilio;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::CatalogAction;

/// State changes worth telling a customer or provider about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BookingConfirmed {
        booking_id: String,
        scheduled: NaiveDateTime,
    },
    BookingRejected {
        booking_id: String,
    },
    BookingCancelled {
        booking_id: String,
        refunded: i64,
    },
    ProviderAssigned {
        booking_id: String,
        scheduled: NaiveDateTime,
    },
    RejectionResolved {
        booking_id: String,
        approved: bool,
    },
    CatalogRequestResolved {
        service_id: String,
        action: CatalogAction,
        approved: bool,
    },
    PaymentFailed {
        booking_id: String,
        reason: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::BookingConfirmed { .. } => "booking_confirmed",
            Notification::BookingRejected { .. } => "booking_rejected",
            Notification::BookingCancelled { .. } => "booking_cancelled",
            Notification::ProviderAssigned { .. } => "provider_assigned",
            Notification::RejectionResolved { .. } => "rejection_resolved",
            Notification::CatalogRequestResolved { .. } => "catalog_request_resolved",
            Notification::PaymentFailed { .. } => "payment_failed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::BookingConfirmed { booking_id, scheduled } => format!(
                "Your booking {booking_id} is confirmed for {}.",
                scheduled.format("%b %-d at %-I:%M %p")
            ),
            Notification::BookingRejected { booking_id } => {
                format!("Your booking {booking_id} could not be accepted.")
            }
            Notification::BookingCancelled { booking_id, refunded } if *refunded > 0 => format!(
                "Booking {booking_id} was cancelled. A refund of {} is on its way.",
                format_amount(*refunded)
            ),
            Notification::BookingCancelled { booking_id, .. } => {
                format!("Booking {booking_id} was cancelled.")
            }
            Notification::ProviderAssigned { booking_id, scheduled } => format!(
                "You have been assigned booking {booking_id} on {}.",
                scheduled.format("%b %-d at %-I:%M %p")
            ),
            Notification::RejectionResolved { booking_id, approved: true } => {
                format!("Your request to be released from booking {booking_id} was approved.")
            }
            Notification::RejectionResolved { booking_id, approved: false } => format!(
                "Your request to be released from booking {booking_id} was declined. Please continue with the service."
            ),
            Notification::CatalogRequestResolved {
                service_id,
                action,
                approved,
            } => format!(
                "Your request to {} service {service_id} was {}.",
                match action {
                    CatalogAction::Add => "add",
                    CatalogAction::Remove => "remove",
                },
                if *approved { "approved" } else { "rejected" }
            ),
            Notification::PaymentFailed { booking_id, reason } => {
                format!("Payment for booking {booking_id} failed: {reason}")
            }
        }
    }
}

fn format_amount(minor_units: i64) -> String {
    format!("{}.{:02}", minor_units / 100, minor_units % 100)
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Notification, recipient: &str) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Notification, recipient: &str) -> anyhow::Result<()> {
        tracing::info!(kind = event.kind(), recipient, message = %event.message(), "notification");
        Ok(())
    }
}

/// Fire-and-forget delivery: failures are logged, never returned.
pub async fn dispatch(notifier: &dyn Notifier, event: Notification, recipient: Option<&str>) {
    let Some(recipient) = recipient.filter(|r| !r.is_empty()) else {
        tracing::debug!(kind = event.kind(), "no recipient contact, skipping notification");
        return;
    };

    if let Err(e) = notifier.notify(&event, recipient).await {
        tracing::warn!(error = %e, kind = event.kind(), recipient, "notification failed");
    }
}
