use anyhow::{anyhow, Context};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Assignment, Availability, Booking, BookingPaymentStatus, BookingStatus, CatalogAction,
    CatalogRequest, Customer, Patient, Payment, PaymentMethod, PaymentStatus, PaymentTiming,
    Provider, RejectionRequest, RequestStatus, Requester, Review, Service,
};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_dt(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT).with_context(|| format!("bad timestamp: {s}"))
}

fn parse_opt_dt(s: Option<String>) -> anyhow::Result<Option<NaiveDateTime>> {
    s.as_deref().map(parse_dt).transpose()
}

// ── Customers & Patients ──

pub fn insert_customer(conn: &Connection, customer: &Customer) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO customers (id, name, email, phone, address) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            customer.id,
            customer.name,
            customer.email,
            customer.phone,
            customer.address,
        ],
    )?;
    Ok(())
}

pub fn get_customer(conn: &Connection, id: &str) -> anyhow::Result<Option<Customer>> {
    let customer = conn
        .query_row(
            "SELECT id, name, email, phone, address FROM customers WHERE id = ?1",
            params![id],
            |row| {
                Ok(Customer {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    phone: row.get(3)?,
                    address: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(customer)
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO patients (id, customer_id, name, emergency_contact_name, emergency_contact_phone)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            patient.id,
            patient.customer_id,
            patient.name,
            patient.emergency_contact_name,
            patient.emergency_contact_phone,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &str) -> anyhow::Result<Option<Patient>> {
    let patient = conn
        .query_row(
            "SELECT id, customer_id, name, emergency_contact_name, emergency_contact_phone
             FROM patients WHERE id = ?1",
            params![id],
            |row| {
                Ok(Patient {
                    id: row.get(0)?,
                    customer_id: row.get(1)?,
                    name: row.get(2)?,
                    emergency_contact_name: row.get(3)?,
                    emergency_contact_phone: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(patient)
}

// ── Providers & Services ──

pub fn insert_provider(conn: &Connection, provider: &Provider) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO providers (id, name, phone, verified, availability) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            provider.id,
            provider.name,
            provider.phone,
            provider.verified as i32,
            provider.availability.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get_provider(conn: &Connection, id: &str) -> anyhow::Result<Option<Provider>> {
    let row = conn
        .query_row(
            "SELECT id, name, phone, verified, availability FROM providers WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i32>(3)? != 0,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, name, phone, verified, availability)| {
        let availability = Availability::parse(&availability)
            .ok_or_else(|| anyhow!("unknown availability: {availability}"))?;
        Ok(Provider {
            id,
            name,
            phone,
            verified,
            availability,
        })
    })
    .transpose()
}

pub fn set_provider_availability(
    conn: &Connection,
    id: &str,
    availability: Availability,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE providers SET availability = ?1 WHERE id = ?2",
        params![availability.as_str(), id],
    )?;
    Ok(count > 0)
}

pub fn insert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, name, active) VALUES (?1, ?2, ?3)",
        params![service.id, service.name, service.active as i32],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, name, active FROM services WHERE id = ?1",
            params![id],
            |row| {
                Ok(Service {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    active: row.get::<_, i32>(2)? != 0,
                })
            },
        )
        .optional()?;
    Ok(service)
}

pub fn provider_offers(conn: &Connection, provider_id: &str, service_id: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM provider_services WHERE provider_id = ?1 AND service_id = ?2",
        params![provider_id, service_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn add_provider_service(conn: &Connection, provider_id: &str, service_id: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO provider_services (provider_id, service_id) VALUES (?1, ?2)
         ON CONFLICT(provider_id, service_id) DO NOTHING",
        params![provider_id, service_id],
    )?;
    Ok(())
}

pub fn remove_provider_service(
    conn: &Connection,
    provider_id: &str,
    service_id: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM provider_services WHERE provider_id = ?1 AND service_id = ?2",
        params![provider_id, service_id],
    )?;
    Ok(count > 0)
}

pub fn list_provider_services(conn: &Connection, provider_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT service_id FROM provider_services WHERE provider_id = ?1 ORDER BY service_id",
    )?;
    let rows = stmt.query_map(params![provider_id], |row| row.get(0))?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, service_id, patient_id, provider_id, status, \
     scheduled_date, scheduled_time, duration_hours, total_amount, payment_status, \
     payment_method, payment_timing, notes, version, created_at, updated_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            booking.id,
            booking.customer_id,
            booking.service_id,
            booking.patient_id,
            booking.provider.provider_id(),
            booking.status.as_str(),
            booking.scheduled_date.format(DATE_FMT).to_string(),
            booking.scheduled_time.format(TIME_FMT).to_string(),
            booking.duration_hours,
            booking.total_amount,
            booking.payment_status.as_str(),
            booking.payment_method.as_str(),
            booking.payment_timing.as_str(),
            booking.notes,
            booking.version,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    result.transpose()
}

/// Writes every mutable booking field, provided nobody else has written the
/// row since `booking.version` was read. Returns false on a lost race.
pub fn update_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           provider_id = ?2,
           status = ?3,
           scheduled_date = ?4,
           scheduled_time = ?5,
           payment_status = ?6,
           notes = ?7,
           updated_at = ?8,
           version = version + 1
         WHERE id = ?1 AND version = ?9",
        params![
            booking.id,
            booking.provider.provider_id(),
            booking.status.as_str(),
            booking.scheduled_date.format(DATE_FMT).to_string(),
            booking.scheduled_time.format(TIME_FMT).to_string(),
            booking.payment_status.as_str(),
            booking.notes,
            fmt_dt(&booking.updated_at),
            booking.version,
        ],
    )?;
    Ok(count > 0)
}

/// Position in the unassigned pool; pages resume strictly after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCursor {
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub id: String,
}

impl PoolCursor {
    pub fn after(booking: &Booking) -> Self {
        Self {
            scheduled_date: booking.scheduled_date,
            scheduled_time: booking.scheduled_time,
            id: booking.id.clone(),
        }
    }
}

pub fn get_unassigned_bookings(
    conn: &Connection,
    after: Option<&PoolCursor>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    // Empty strings sort before every stored date, so no cursor means "from the start".
    let (date, time, id) = match after {
        Some(c) => (
            c.scheduled_date.format(DATE_FMT).to_string(),
            c.scheduled_time.format(TIME_FMT).to_string(),
            c.id.clone(),
        ),
        None => (String::new(), String::new(), String::new()),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE provider_id IS NULL
           AND status NOT IN ('CANCELLED', 'COMPLETED')
           AND (scheduled_date, scheduled_time, id) > (?1, ?2, ?3)
         ORDER BY scheduled_date ASC, scheduled_time ASC, id ASC
         LIMIT ?4"
    ))?;

    let rows = stmt.query_map(params![date, time, id, limit], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let status_str: String = row.get(5)?;
    let date_str: String = row.get(6)?;
    let time_str: String = row.get(7)?;
    let payment_status_str: String = row.get(10)?;
    let method_str: String = row.get(11)?;
    let timing_str: String = row.get(12)?;
    let created_at_str: String = row.get(15)?;
    let updated_at_str: String = row.get(16)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        service_id: row.get(2)?,
        patient_id: row.get(3)?,
        provider: Assignment::from_column(row.get(4)?),
        status: BookingStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("unknown booking status: {status_str}"))?,
        scheduled_date: NaiveDate::parse_from_str(&date_str, DATE_FMT)
            .with_context(|| format!("bad scheduled date: {date_str}"))?,
        scheduled_time: NaiveTime::parse_from_str(&time_str, TIME_FMT)
            .with_context(|| format!("bad scheduled time: {time_str}"))?,
        duration_hours: row.get(8)?,
        total_amount: row.get(9)?,
        payment_status: BookingPaymentStatus::parse(&payment_status_str)
            .ok_or_else(|| anyhow!("unknown payment status: {payment_status_str}"))?,
        payment_method: PaymentMethod::parse(&method_str)
            .ok_or_else(|| anyhow!("unknown payment method: {method_str}"))?,
        payment_timing: PaymentTiming::parse(&timing_str)
            .ok_or_else(|| anyhow!("unknown payment timing: {timing_str}"))?,
        notes: row.get(13)?,
        version: row.get(14)?,
        created_at: parse_dt(&created_at_str)?,
        updated_at: parse_dt(&updated_at_str)?,
    })
}

// ── Rejection Requests ──

const REJECTION_COLUMNS: &str = "id, booking_id, provider_id, reason, status, requested_at, \
     reviewer_id, reviewed_at, admin_notes";

pub fn insert_rejection_request(conn: &Connection, request: &RejectionRequest) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO rejection_requests ({REJECTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            request.id,
            request.booking_id,
            request.provider_id,
            request.reason,
            request.status.as_str(),
            fmt_dt(&request.requested_at),
            request.review.as_ref().map(|r| r.reviewer_id.as_str()),
            request.review.as_ref().map(|r| fmt_dt(&r.reviewed_at)),
            request.review.as_ref().and_then(|r| r.notes.as_deref()),
        ],
    )?;
    Ok(())
}

pub fn get_rejection_request(conn: &Connection, id: &str) -> anyhow::Result<Option<RejectionRequest>> {
    let result = conn
        .query_row(
            &format!("SELECT {REJECTION_COLUMNS} FROM rejection_requests WHERE id = ?1"),
            params![id],
            |row| Ok(parse_rejection_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn find_pending_rejection(conn: &Connection, booking_id: &str) -> anyhow::Result<Option<RejectionRequest>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {REJECTION_COLUMNS} FROM rejection_requests
                 WHERE booking_id = ?1 AND status = 'PENDING'"
            ),
            params![booking_id],
            |row| Ok(parse_rejection_row(row)),
        )
        .optional()?;
    result.transpose()
}

/// Stores the verdict only if the request is still pending.
pub fn resolve_rejection_request(conn: &Connection, request: &RejectionRequest) -> anyhow::Result<bool> {
    let review = request
        .review
        .as_ref()
        .ok_or_else(|| anyhow!("rejection request {} has no review", request.id))?;
    let count = conn.execute(
        "UPDATE rejection_requests
         SET status = ?2, reviewer_id = ?3, reviewed_at = ?4, admin_notes = ?5
         WHERE id = ?1 AND status = 'PENDING'",
        params![
            request.id,
            request.status.as_str(),
            review.reviewer_id,
            fmt_dt(&review.reviewed_at),
            review.notes,
        ],
    )?;
    Ok(count > 0)
}

pub fn list_pending_rejections(conn: &Connection, limit: i64) -> anyhow::Result<Vec<RejectionRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REJECTION_COLUMNS} FROM rejection_requests
         WHERE status = 'PENDING' ORDER BY requested_at ASC, id ASC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], |row| Ok(parse_rejection_row(row)))?;

    let mut requests = vec![];
    for row in rows {
        requests.push(row??);
    }
    Ok(requests)
}

fn parse_review(
    reviewer_id: Option<String>,
    reviewed_at: Option<String>,
    notes: Option<String>,
) -> anyhow::Result<Option<Review>> {
    match (reviewer_id, parse_opt_dt(reviewed_at)?) {
        (Some(reviewer_id), Some(reviewed_at)) => Ok(Some(Review {
            reviewer_id,
            reviewed_at,
            notes,
        })),
        _ => Ok(None),
    }
}

fn parse_rejection_row(row: &rusqlite::Row) -> anyhow::Result<RejectionRequest> {
    let status_str: String = row.get(4)?;
    let requested_at_str: String = row.get(5)?;

    Ok(RejectionRequest {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        provider_id: row.get(2)?,
        reason: row.get(3)?,
        status: RequestStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("unknown request status: {status_str}"))?,
        requested_at: parse_dt(&requested_at_str)?,
        review: parse_review(row.get(6)?, row.get(7)?, row.get(8)?)?,
    })
}

// ── Catalog Requests ──

const CATALOG_COLUMNS: &str = "id, provider_id, service_id, action, requested_by, status, \
     requested_at, reviewer_id, reviewed_at, rejection_reason, notes";

pub fn insert_catalog_request(conn: &Connection, request: &CatalogRequest) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO catalog_requests ({CATALOG_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            request.id,
            request.provider_id,
            request.service_id,
            request.action.as_str(),
            request.requested_by.as_str(),
            request.status.as_str(),
            fmt_dt(&request.requested_at),
            request.review.as_ref().map(|r| r.reviewer_id.as_str()),
            request.review.as_ref().map(|r| fmt_dt(&r.reviewed_at)),
            request.rejection_reason,
            request.review.as_ref().and_then(|r| r.notes.as_deref()),
        ],
    )?;
    Ok(())
}

pub fn get_catalog_request(conn: &Connection, id: &str) -> anyhow::Result<Option<CatalogRequest>> {
    let result = conn
        .query_row(
            &format!("SELECT {CATALOG_COLUMNS} FROM catalog_requests WHERE id = ?1"),
            params![id],
            |row| Ok(parse_catalog_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn find_pending_catalog_request(
    conn: &Connection,
    provider_id: &str,
    service_id: &str,
    action: CatalogAction,
) -> anyhow::Result<Option<CatalogRequest>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {CATALOG_COLUMNS} FROM catalog_requests
                 WHERE provider_id = ?1 AND service_id = ?2 AND action = ?3 AND status = 'PENDING'"
            ),
            params![provider_id, service_id, action.as_str()],
            |row| Ok(parse_catalog_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn resolve_catalog_request(conn: &Connection, request: &CatalogRequest) -> anyhow::Result<bool> {
    let review = request
        .review
        .as_ref()
        .ok_or_else(|| anyhow!("catalog request {} has no review", request.id))?;
    let count = conn.execute(
        "UPDATE catalog_requests
         SET status = ?2, reviewer_id = ?3, reviewed_at = ?4, rejection_reason = ?5, notes = ?6
         WHERE id = ?1 AND status = 'PENDING'",
        params![
            request.id,
            request.status.as_str(),
            review.reviewer_id,
            fmt_dt(&review.reviewed_at),
            request.rejection_reason,
            review.notes,
        ],
    )?;
    Ok(count > 0)
}

pub fn list_pending_catalog_requests(conn: &Connection, limit: i64) -> anyhow::Result<Vec<CatalogRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATALOG_COLUMNS} FROM catalog_requests
         WHERE status = 'PENDING' ORDER BY requested_at ASC, id ASC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], |row| Ok(parse_catalog_row(row)))?;

    let mut requests = vec![];
    for row in rows {
        requests.push(row??);
    }
    Ok(requests)
}

pub fn list_provider_catalog_requests(
    conn: &Connection,
    provider_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<CatalogRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATALOG_COLUMNS} FROM catalog_requests
         WHERE provider_id = ?1 ORDER BY requested_at DESC, id DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![provider_id, limit], |row| Ok(parse_catalog_row(row)))?;

    let mut requests = vec![];
    for row in rows {
        requests.push(row??);
    }
    Ok(requests)
}

fn parse_catalog_row(row: &rusqlite::Row) -> anyhow::Result<CatalogRequest> {
    let action_str: String = row.get(3)?;
    let requested_by_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let requested_at_str: String = row.get(6)?;

    Ok(CatalogRequest {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        service_id: row.get(2)?,
        action: CatalogAction::parse(&action_str)
            .ok_or_else(|| anyhow!("unknown catalog action: {action_str}"))?,
        requested_by: Requester::parse(&requested_by_str)
            .ok_or_else(|| anyhow!("unknown requester: {requested_by_str}"))?,
        status: RequestStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("unknown request status: {status_str}"))?,
        requested_at: parse_dt(&requested_at_str)?,
        rejection_reason: row.get(9)?,
        review: parse_review(row.get(7)?, row.get(8)?, row.get(10)?)?,
    })
}

// ── Payments ──

const PAYMENT_COLUMNS: &str = "id, booking_id, customer_id, amount, refunded_amount, method, \
     gateway, transaction_id, status, timing, invoice_number, paid_at, failure_reason, \
     gateway_response, version, created_at, updated_at, refund_reserved";

pub fn insert_payment(conn: &Connection, payment: &Payment) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            payment.id,
            payment.booking_id,
            payment.customer_id,
            payment.amount,
            payment.refunded_amount,
            payment.method.as_str(),
            payment.gateway,
            payment.transaction_id,
            payment.status.as_str(),
            payment.timing.as_str(),
            payment.invoice_number,
            payment.paid_at.as_ref().map(fmt_dt),
            payment.failure_reason,
            payment.gateway_response,
            payment.version,
            fmt_dt(&payment.created_at),
            fmt_dt(&payment.updated_at),
            payment.refund_reserved,
        ],
    )?;
    Ok(())
}

pub fn get_payment(conn: &Connection, id: &str) -> anyhow::Result<Option<Payment>> {
    let result = conn
        .query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id],
            |row| Ok(parse_payment_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_payment_for_booking(conn: &Connection, booking_id: &str) -> anyhow::Result<Option<Payment>> {
    let result = conn
        .query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = ?1"),
            params![booking_id],
            |row| Ok(parse_payment_row(row)),
        )
        .optional()?;
    result.transpose()
}

/// Compare-and-swap on `payment.version`, like [`update_booking`].
pub fn update_payment(conn: &Connection, payment: &Payment) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE payments SET
           refunded_amount = ?2,
           transaction_id = ?3,
           status = ?4,
           invoice_number = ?5,
           paid_at = ?6,
           failure_reason = ?7,
           gateway_response = ?8,
           updated_at = ?9,
           refund_reserved = ?11,
           version = version + 1
         WHERE id = ?1 AND version = ?10",
        params![
            payment.id,
            payment.refunded_amount,
            payment.transaction_id,
            payment.status.as_str(),
            payment.invoice_number,
            payment.paid_at.as_ref().map(fmt_dt),
            payment.failure_reason,
            payment.gateway_response,
            fmt_dt(&payment.updated_at),
            payment.version,
            payment.refund_reserved,
        ],
    )?;
    Ok(count > 0)
}

pub fn invoice_number_exists(conn: &Connection, invoice_number: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE invoice_number = ?1",
        params![invoice_number],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn parse_payment_row(row: &rusqlite::Row) -> anyhow::Result<Payment> {
    let method_str: String = row.get(5)?;
    let status_str: String = row.get(8)?;
    let timing_str: String = row.get(9)?;
    let created_at_str: String = row.get(15)?;
    let updated_at_str: String = row.get(16)?;

    Ok(Payment {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        customer_id: row.get(2)?,
        amount: row.get(3)?,
        refunded_amount: row.get(4)?,
        refund_reserved: row.get(17)?,
        method: PaymentMethod::parse(&method_str)
            .ok_or_else(|| anyhow!("unknown payment method: {method_str}"))?,
        gateway: row.get(6)?,
        transaction_id: row.get(7)?,
        status: PaymentStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("unknown payment status: {status_str}"))?,
        timing: PaymentTiming::parse(&timing_str)
            .ok_or_else(|| anyhow!("unknown payment timing: {timing_str}"))?,
        invoice_number: row.get(10)?,
        paid_at: parse_opt_dt(row.get(11)?)?,
        failure_reason: row.get(12)?,
        gateway_response: row.get(13)?,
        version: row.get(14)?,
        created_at: parse_dt(&created_at_str)?,
        updated_at: parse_dt(&updated_at_str)?,
    })
}
