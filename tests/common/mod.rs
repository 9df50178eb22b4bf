#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};

use caredesk::config::AppConfig;
use caredesk::db::{self, queries};
use caredesk::models::{
    Actor, Availability, Booking, Customer, NewBooking, Patient, PaymentMethod, PaymentTiming,
    Provider, Role, Service,
};
use caredesk::services::gateway::{ChargeReceipt, GatewayOutcome, PaymentGateway, RefundReceipt};
use caredesk::services::notifier::{Notification, Notifier};
use caredesk::state::AppState;

// ── Mock Collaborators ──

/// Yields once per call so concurrent operations interleave at the gateway.
pub struct MockGateway {
    pub charge_outcome: GatewayOutcome,
    pub refund_outcome: Arc<Mutex<GatewayOutcome>>,
    pub charges: Arc<Mutex<Vec<i64>>>,
    pub refunds: Arc<Mutex<Vec<(String, i64)>>>,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initiate(
        &self,
        amount: i64,
        _method: PaymentMethod,
        _customer_ref: &str,
    ) -> anyhow::Result<ChargeReceipt> {
        tokio::task::yield_now().await;
        let mut charges = self.charges.lock().unwrap();
        charges.push(amount);
        Ok(ChargeReceipt {
            transaction_id: format!("txn-{}", charges.len()),
            outcome: self.charge_outcome,
            message: match self.charge_outcome {
                GatewayOutcome::Success => None,
                _ => Some("card declined".to_string()),
            },
        })
    }

    async fn refund(&self, transaction_id: &str, amount: i64) -> anyhow::Result<RefundReceipt> {
        tokio::task::yield_now().await;
        let outcome = *self.refund_outcome.lock().unwrap();
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((transaction_id.to_string(), amount));
        Ok(RefundReceipt {
            refund_id: format!("rf-{}", refunds.len()),
            outcome,
            message: match outcome {
                GatewayOutcome::Success => None,
                _ => Some("refund declined".to_string()),
            },
        })
    }
}

pub struct MockNotifier {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, event: &Notification, recipient: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((event.kind().to_string(), recipient.to_string()));
        Ok(())
    }
}

// ── Harness ──

pub struct Harness {
    pub state: Arc<AppState>,
    pub charges: Arc<Mutex<Vec<i64>>>,
    pub refunds: Arc<Mutex<Vec<(String, i64)>>>,
    pub refund_outcome: Arc<Mutex<GatewayOutcome>>,
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl Harness {
    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }
}

pub const CUSTOMER_PHONE: &str = "+15550001111";
pub const PROVIDER_PHONE: &str = "+15550003333";

pub fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        api_token: "test-token".to_string(),
        refund_after_start_percent: 50,
        gateway_success_rate: 1.0,
        gateway_webhook_secret: String::new(), // empty = skip signature validation
        invoice_prefix: "INV-".to_string(),
        twilio_account_sid: String::new(),
        twilio_auth_token: String::new(),
        twilio_phone_number: String::new(),
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), GatewayOutcome::Success)
}

pub fn harness_with(config: AppConfig, charge_outcome: GatewayOutcome) -> Harness {
    let conn = db::init_db(":memory:").unwrap();
    let charges = Arc::new(Mutex::new(vec![]));
    let refunds = Arc::new(Mutex::new(vec![]));
    let refund_outcome = Arc::new(Mutex::new(GatewayOutcome::Success));
    let sent = Arc::new(Mutex::new(vec![]));

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
        gateway: Box::new(MockGateway {
            charge_outcome,
            refund_outcome: Arc::clone(&refund_outcome),
            charges: Arc::clone(&charges),
            refunds: Arc::clone(&refunds),
        }),
        notifier: Box::new(MockNotifier {
            sent: Arc::clone(&sent),
        }),
    });
    seed(&state);

    Harness {
        state,
        charges,
        refunds,
        refund_outcome,
        sent,
    }
}

/// Two customers, three providers (one bookable), three services.
fn seed(state: &AppState) {
    let db = state.db();

    queries::insert_customer(
        &db,
        &Customer {
            id: "cust-1".to_string(),
            name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            phone: Some(CUSTOMER_PHONE.to_string()),
            address: Some("12 Elm St".to_string()),
        },
    )
    .unwrap();
    queries::insert_customer(
        &db,
        &Customer {
            id: "cust-2".to_string(),
            name: "Ben Ito".to_string(),
            email: "ben@example.com".to_string(),
            phone: None,
            address: None,
        },
    )
    .unwrap();
    queries::insert_patient(
        &db,
        &Patient {
            id: "pat-1".to_string(),
            customer_id: "cust-1".to_string(),
            name: "Ravi Rao".to_string(),
            emergency_contact_name: Some("Mira Rao".to_string()),
            emergency_contact_phone: Some("+15550002222".to_string()),
        },
    )
    .unwrap();

    for (id, phone, verified, availability) in [
        ("prov-1", Some(PROVIDER_PHONE), true, Availability::Available),
        ("prov-2", None, true, Availability::Busy),
        ("prov-3", None, false, Availability::Available),
    ] {
        queries::insert_provider(
            &db,
            &Provider {
                id: id.to_string(),
                name: format!("Provider {id}"),
                phone: phone.map(str::to_string),
                verified,
                availability,
            },
        )
        .unwrap();
    }

    for (id, active) in [("svc-nursing", true), ("svc-physio", true), ("svc-retired", false)] {
        queries::insert_service(
            &db,
            &Service {
                id: id.to_string(),
                name: id.trim_start_matches("svc-").to_string(),
                active,
            },
        )
        .unwrap();
    }
    queries::add_provider_service(&db, "prov-1", "svc-nursing").unwrap();
}

// ── Actors & Fixtures ──

pub fn customer() -> Actor {
    Actor::new("cust-1", Role::Customer)
}

pub fn provider() -> Actor {
    Actor::new("prov-1", Role::Provider)
}

pub fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

/// 10:00 on the day `days` from today.
pub fn slot(days: i64) -> (NaiveDate, NaiveTime) {
    (
        Utc::now().date_naive() + Duration::days(days),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    )
}

pub fn new_booking(days_ahead: i64, total_amount: i64, timing: PaymentTiming) -> NewBooking {
    let (scheduled_date, scheduled_time) = slot(days_ahead);
    NewBooking {
        customer_id: "cust-1".to_string(),
        service_id: "svc-nursing".to_string(),
        patient_id: Some("pat-1".to_string()),
        scheduled_date,
        scheduled_time,
        duration_hours: 2,
        total_amount,
        payment_method: PaymentMethod::Card,
        payment_timing: timing,
        notes: None,
    }
}

/// Moves a stored booking's slot without going through the state machine.
pub fn backdate(state: &AppState, booking_id: &str, days_ago: i64) {
    let date = Utc::now().date_naive() - Duration::days(days_ago);
    state
        .db()
        .execute(
            "UPDATE bookings SET scheduled_date = ?1 WHERE id = ?2",
            rusqlite::params![date.format("%Y-%m-%d").to_string(), booking_id],
        )
        .unwrap();
}

pub fn payment_for(state: &AppState, booking: &Booking) -> caredesk::models::Payment {
    queries::get_payment_for_booking(&state.db(), &booking.id)
        .unwrap()
        .expect("booking has a payment")
}
