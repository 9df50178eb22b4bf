use std::collections::VecDeque;

use rusqlite::Connection;

use crate::db::queries::{self, PoolCursor};
use crate::errors::AppError;
use crate::models::{Actor, Assignment, Availability, Booking};
use crate::services::booking::{load_booking, store_booking};
use crate::services::notifier::{dispatch, Notification};
use crate::state::AppState;

const POOL_PAGE_SIZE: i64 = 50;

fn ensure_admin(actor: &Actor, what: &str) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("only admins may {what}")))
    }
}

/// Binds a verified, available provider to a booking. The booking status is
/// left as it is.
pub async fn assign(
    state: &AppState,
    actor: &Actor,
    booking_id: &str,
    provider_id: &str,
) -> Result<Booking, AppError> {
    ensure_admin(actor, "assign providers")?;

    let (booking, provider_phone) = {
        let mut db = state.db();
        let tx = db.transaction()?;

        let mut booking = load_booking(&tx, booking_id)?;
        if booking.status.is_terminal() {
            return Err(AppError::InvalidState {
                action: "assign provider",
                status: booking.status.as_str(),
            });
        }

        let provider = queries::get_provider(&tx, provider_id)?
            .ok_or_else(|| AppError::not_found("provider", provider_id))?;
        if !provider.verified {
            return Err(AppError::ProviderUnavailable(format!(
                "provider {provider_id} is not verified"
            )));
        }
        if provider.availability != Availability::Available {
            return Err(AppError::ProviderUnavailable(format!(
                "provider {provider_id} is {}",
                provider.availability.as_str()
            )));
        }

        booking.provider = Assignment::Assigned(provider.id.clone());
        store_booking(&tx, &mut booking)?;
        tx.commit()?;
        (booking, provider.phone)
    };

    tracing::info!(booking_id, provider_id, "provider assigned");

    dispatch(
        state.notifier.as_ref(),
        Notification::ProviderAssigned {
            booking_id: booking.id.clone(),
            scheduled: booking.scheduled_start(),
        },
        provider_phone.as_deref(),
    )
    .await;

    Ok(booking)
}

/// Bookings waiting for a provider, earliest scheduled first. Rows are read
/// a page at a time as the iterator is advanced; calling
/// [`find_unassigned`] again starts over from the beginning.
pub struct UnassignedPool<'c> {
    conn: &'c Connection,
    cursor: Option<PoolCursor>,
    buffered: VecDeque<Booking>,
    page_size: i64,
    exhausted: bool,
}

impl<'c> UnassignedPool<'c> {
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn fill(&mut self) -> anyhow::Result<()> {
        let page = queries::get_unassigned_bookings(self.conn, self.cursor.as_ref(), self.page_size)?;
        if (page.len() as i64) < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(PoolCursor::after(last));
        }
        self.buffered.extend(page);
        Ok(())
    }
}

impl Iterator for UnassignedPool<'_> {
    type Item = anyhow::Result<Booking>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}

pub fn find_unassigned(conn: &Connection) -> UnassignedPool<'_> {
    UnassignedPool {
        conn,
        cursor: None,
        buffered: VecDeque::new(),
        page_size: POOL_PAGE_SIZE,
        exhausted: false,
    }
}

/// The first `limit` bookings of the unassigned pool.
pub fn list_unassigned(state: &AppState, actor: &Actor, limit: usize) -> Result<Vec<Booking>, AppError> {
    ensure_admin(actor, "browse the unassigned pool")?;
    let db = state.db();
    let bookings = find_unassigned(&db)
        .take(limit)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(bookings)
}
