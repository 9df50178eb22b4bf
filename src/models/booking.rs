use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::payment::{PaymentMethod, PaymentTiming};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub customer_id: String,
    pub service_id: String,
    pub patient_id: Option<String>,
    pub provider: Assignment,
    pub status: BookingStatus,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_hours: i32,
    /// Minor currency units.
    pub total_amount: i64,
    pub payment_status: BookingPaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_timing: PaymentTiming,
    pub notes: Option<String>,
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn scheduled_start(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.scheduled_time)
    }

    /// Moves the booking along the status table, leaving it untouched when
    /// the action is not allowed from the current status.
    pub fn apply(&mut self, action: BookingAction) -> Result<BookingStatus, AppError> {
        match self.status.next(action) {
            Some(next) => {
                self.status = next;
                Ok(next)
            }
            None => Err(AppError::InvalidState {
                action: action.as_str(),
                status: self.status.as_str(),
            }),
        }
    }

    pub fn append_note(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
            _ => line.to_string(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "provider_id", rename_all = "snake_case")]
pub enum Assignment {
    Unassigned,
    Assigned(String),
}

impl Assignment {
    pub fn from_column(provider_id: Option<String>) -> Self {
        match provider_id {
            Some(id) => Assignment::Assigned(id),
            None => Assignment::Unassigned,
        }
    }

    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Assignment::Assigned(id) => Some(id),
            Assignment::Unassigned => None,
        }
    }

    pub fn is_assigned_to(&self, provider_id: &str) -> bool {
        self.provider_id() == Some(provider_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Accept,
    Reject,
    Start,
    Complete,
    Cancel,
    Reschedule,
}

impl BookingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingAction::Accept => "accept",
            BookingAction::Reject => "reject",
            BookingAction::Start => "start service",
            BookingAction::Complete => "complete service",
            BookingAction::Cancel => "cancel",
            BookingAction::Reschedule => "reschedule",
        }
    }
}

impl BookingStatus {
    pub fn next(self, action: BookingAction) -> Option<BookingStatus> {
        use BookingAction::*;
        use BookingStatus::*;

        match (self, action) {
            (Pending, Accept) => Some(Confirmed),
            (Pending, Reject) => Some(Cancelled),
            (Confirmed, Start) => Some(InProgress),
            (InProgress, Complete) => Some(Completed),
            (Pending | Confirmed, Cancel) => Some(Cancelled),
            // Rescheduling moves the slot, not the status.
            (status @ (Pending | Confirmed), Reschedule) => Some(status),
            _ => None,
        }
    }

    pub fn can_be_cancelled(self) -> bool {
        self.next(BookingAction::Cancel).is_some()
    }

    /// Statuses in which a booking may sit without a provider.
    pub fn is_open(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "IN_PROGRESS" => Some(BookingStatus::InProgress),
            "COMPLETED" => Some(BookingStatus::Completed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl BookingPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingPaymentStatus::Pending => "PENDING",
            BookingPaymentStatus::Paid => "PAID",
            BookingPaymentStatus::Failed => "FAILED",
            BookingPaymentStatus::Refunded => "REFUNDED",
            BookingPaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingPaymentStatus::Pending),
            "PAID" => Some(BookingPaymentStatus::Paid),
            "FAILED" => Some(BookingPaymentStatus::Failed),
            "REFUNDED" => Some(BookingPaymentStatus::Refunded),
            "PARTIALLY_REFUNDED" => Some(BookingPaymentStatus::PartiallyRefunded),
            _ => None,
        }
    }
}

/// Customer input for a new booking.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub customer_id: String,
    pub service_id: String,
    pub patient_id: Option<String>,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_hours: i32,
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_timing: PaymentTiming,
    pub notes: Option<String>,
}
