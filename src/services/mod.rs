pub mod assignment;
pub mod booking;
pub mod catalog;
pub mod gateway;
pub mod notifier;
pub mod payment;
pub mod privacy;
pub mod refund;
pub mod rejection;

use chrono::{NaiveDateTime, Utc};

/// Wall-clock time as stored in the database.
pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
