use chrono::NaiveDateTime;

use crate::config::AppConfig;
use crate::models::{Booking, BookingPaymentStatus, BookingStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundPolicy {
    /// Percentage of the total returned once the scheduled start has passed.
    pub after_start_percent: u8,
}

impl RefundPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            after_start_percent: config.refund_after_start_percent.min(100),
        }
    }
}

impl Default for RefundPolicy {
    fn default() -> Self {
        Self {
            after_start_percent: 50,
        }
    }
}

/// Amount owed back to the customer for a cancelled, paid booking.
/// Full refund before the scheduled start, the policy share after it.
pub fn refund_amount(booking: &Booking, now: NaiveDateTime, policy: &RefundPolicy) -> i64 {
    if booking.status != BookingStatus::Cancelled
        || booking.payment_status != BookingPaymentStatus::Paid
    {
        return 0;
    }

    if now < booking.scheduled_start() {
        booking.total_amount
    } else {
        let share = i128::from(booking.total_amount) * i128::from(policy.after_start_percent) / 100;
        // Never larger than the total, so it always fits back into i64.
        i64::try_from(share).unwrap_or(booking.total_amount)
    }
}
