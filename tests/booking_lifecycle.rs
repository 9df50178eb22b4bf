mod common;

use caredesk::db::queries;
use caredesk::errors::AppError;
use caredesk::models::{
    Actor, Assignment, Availability, BookingPaymentStatus, BookingStatus, CatalogAction, PaymentStatus,
    PaymentTiming, RequestStatus, Requester, Role,
};
use caredesk::services::gateway::GatewayOutcome;
use caredesk::services::{assignment, booking, catalog, payment, privacy, rejection};

use common::*;

// ── Booking State Machine ──

#[tokio::test]
async fn test_advance_booking_is_charged_on_accept() {
    let h = harness();
    let state = &h.state;

    let created = booking::create(state, &customer(), new_booking(3, 50_000, PaymentTiming::Advance)).unwrap();
    assert_eq!(created.status, BookingStatus::Pending);
    assert_eq!(created.provider, Assignment::Unassigned);
    assert_eq!(created.payment_status, BookingPaymentStatus::Pending);

    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();
    let accepted = booking::accept(state, &provider(), &created.id).await.unwrap();

    assert_eq!(accepted.status, BookingStatus::Confirmed);
    assert_eq!(accepted.payment_status, BookingPaymentStatus::Paid);
    assert_eq!(*h.charges.lock().unwrap(), vec![50_000]);

    let paid = payment_for(state, &accepted);
    assert_eq!(paid.status, PaymentStatus::Success);
    assert_eq!(paid.transaction_id.as_deref(), Some("txn-1"));
    assert!(paid.paid_at.is_some());
    let invoice = paid.invoice_number.unwrap();
    assert!(invoice.starts_with("INV-"));
    assert_eq!(invoice.len(), 12);

    let kinds = h.sent_kinds();
    assert!(kinds.contains(&"provider_assigned".to_string()));
    assert!(kinds.contains(&"booking_confirmed".to_string()));
}

#[tokio::test]
async fn test_accept_twice_is_invalid_state() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();

    booking::accept(state, &admin(), &created.id).await.unwrap();
    let err = booking::accept(state, &admin(), &created.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidState {
            action: "accept",
            status: "CONFIRMED"
        }
    ));
    assert_eq!(h.charges.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_accepts_only_one_wins() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::PostService)).unwrap();

    let (admin_a, admin_b) = (admin(), admin());
    let (a, b) = tokio::join!(
        booking::accept(state, &admin_a, &created.id),
        booking::accept(state, &admin_b, &created.id)
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
}

#[tokio::test]
async fn test_only_assigned_provider_may_accept() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();

    let err = booking::accept(state, &provider(), &created.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = booking::accept(state, &customer(), &created.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_reject_cancels_pending_booking() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();

    let err = booking::reject(state, &provider(), &created.id, "  ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let rejected = booking::reject(state, &provider(), &created.id, "fully booked").await.unwrap();
    assert_eq!(rejected.status, BookingStatus::Cancelled);
    assert!(rejected.notes.unwrap().contains("fully booked"));
    assert!(h.charges.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_contact_lookup_failure_skips_notification() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    state
        .db()
        .execute_batch("ALTER TABLE customers RENAME TO customers_archived")
        .unwrap();

    let rejected = booking::reject(state, &admin(), &created.id, "fully booked").await.unwrap();
    assert_eq!(rejected.status, BookingStatus::Cancelled);
    assert!(!h.sent_kinds().contains(&"booking_rejected".to_string()));
}

#[tokio::test]
async fn test_post_service_booking_is_charged_on_completion() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 12_000, PaymentTiming::PostService)).unwrap();
    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();

    let accepted = booking::accept(state, &provider(), &created.id).await.unwrap();
    assert_eq!(accepted.payment_status, BookingPaymentStatus::Pending);
    assert!(h.charges.lock().unwrap().is_empty());

    let err = booking::complete_service(state, &provider(), &created.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { status: "CONFIRMED", .. }));

    let started = booking::start_service(state, &provider(), &created.id).unwrap();
    assert_eq!(started.status, BookingStatus::InProgress);

    let completed = booking::complete_service(state, &provider(), &created.id, Some("vitals normal"))
        .await
        .unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
    assert_eq!(completed.payment_status, BookingPaymentStatus::Paid);
    assert!(completed.notes.unwrap().contains("vitals normal"));
    assert_eq!(*h.charges.lock().unwrap(), vec![12_000]);

    let err = booking::cancel(state, &customer(), &created.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { status: "COMPLETED", .. }));
}

#[tokio::test]
async fn test_start_requires_assigned_provider() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::PostService)).unwrap();
    booking::accept(state, &admin(), &created.id).await.unwrap();

    let err = booking::start_service(state, &admin(), &created.id).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(booking::get(state, &created.id).unwrap().status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_failed_charge_leaves_booking_confirmed() {
    let h = harness_with(test_config(), GatewayOutcome::Failed);
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();

    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();
    assert_eq!(accepted.status, BookingStatus::Confirmed);
    assert_eq!(accepted.payment_status, BookingPaymentStatus::Failed);

    let failed = payment_for(state, &accepted);
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    assert!(failed.invoice_number.is_none());
    assert!(h.sent_kinds().contains(&"payment_failed".to_string()));

    let cancelled = booking::cancel(state, &customer(), &created.id).await.unwrap();
    assert_eq!(cancelled.refunded, 0);
    assert!(h.refunds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_validation() {
    let h = harness();
    let state = &h.state;

    let mut past = new_booking(3, 10_000, PaymentTiming::Advance);
    past.scheduled_date = slot(-1).0;
    assert!(matches!(
        booking::create(state, &customer(), past).unwrap_err(),
        AppError::Validation(_)
    ));

    let mut retired = new_booking(3, 10_000, PaymentTiming::Advance);
    retired.service_id = "svc-retired".to_string();
    assert!(matches!(
        booking::create(state, &customer(), retired).unwrap_err(),
        AppError::Validation(_)
    ));

    let mut foreign_patient = new_booking(3, 10_000, PaymentTiming::Advance);
    foreign_patient.customer_id = "cust-2".to_string();
    assert!(matches!(
        booking::create(state, &admin(), foreign_patient).unwrap_err(),
        AppError::Validation(_)
    ));

    let zero = new_booking(3, 0, PaymentTiming::Advance);
    assert!(matches!(
        booking::create(state, &customer(), zero).unwrap_err(),
        AppError::Validation(_)
    ));

    let someone_else = Actor::new("cust-2", Role::Customer);
    assert!(matches!(
        booking::create(state, &someone_else, new_booking(3, 10_000, PaymentTiming::Advance)).unwrap_err(),
        AppError::Forbidden(_)
    ));
}

// ── Refunds ──

#[tokio::test]
async fn test_cancel_before_start_refunds_in_full() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 50_000, PaymentTiming::Advance)).unwrap();
    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();
    booking::accept(state, &provider(), &created.id).await.unwrap();

    let cancellation = booking::cancel(state, &customer(), &created.id).await.unwrap();
    assert_eq!(cancellation.refunded, 50_000);
    assert_eq!(cancellation.booking.status, BookingStatus::Cancelled);
    assert_eq!(cancellation.booking.payment_status, BookingPaymentStatus::Refunded);
    assert_eq!(
        *h.refunds.lock().unwrap(),
        vec![("txn-1".to_string(), 50_000)]
    );

    let refunded = payment_for(state, &cancellation.booking);
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    assert_eq!(refunded.refunded_amount, 50_000);

    let sent = h.sent.lock().unwrap();
    let cancelled_to: Vec<&str> = sent
        .iter()
        .filter(|(kind, _)| kind == "booking_cancelled")
        .map(|(_, to)| to.as_str())
        .collect();
    assert_eq!(cancelled_to, vec![CUSTOMER_PHONE, PROVIDER_PHONE]);
}

#[tokio::test]
async fn test_cancel_after_start_refunds_half() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 50_000, PaymentTiming::Advance)).unwrap();
    booking::accept(state, &admin(), &created.id).await.unwrap();
    backdate(state, &created.id, 1);

    let cancellation = booking::cancel(state, &admin(), &created.id).await.unwrap();
    assert_eq!(cancellation.refunded, 25_000);
    assert_eq!(
        cancellation.booking.payment_status,
        BookingPaymentStatus::PartiallyRefunded
    );

    let partial = payment_for(state, &cancellation.booking);
    assert_eq!(partial.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.refunded_amount, 25_000);
    assert_eq!(partial.refundable_balance(), 25_000);
}

#[tokio::test]
async fn test_refund_percentage_comes_from_config() {
    let mut config = test_config();
    config.refund_after_start_percent = 20;
    let h = harness_with(config, GatewayOutcome::Success);
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 50_000, PaymentTiming::Advance)).unwrap();
    booking::accept(state, &admin(), &created.id).await.unwrap();
    backdate(state, &created.id, 1);

    let cancellation = booking::cancel(state, &customer(), &created.id).await.unwrap();
    assert_eq!(cancellation.refunded, 10_000);
}

#[tokio::test]
async fn test_only_the_customer_may_cancel() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();

    let err = booking::cancel(state, &provider(), &created.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = booking::cancel(state, &Actor::new("cust-2", Role::Customer), &created.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

// ── Reschedule ──

#[tokio::test]
async fn test_reschedule_keeps_status_and_records_old_slot() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::PostService)).unwrap();
    booking::accept(state, &admin(), &created.id).await.unwrap();

    let (date, time) = slot(10);
    let moved = booking::reschedule(state, &customer(), &created.id, date, time).unwrap();
    assert_eq!(moved.status, BookingStatus::Confirmed);
    assert_eq!(moved.scheduled_date, date);
    assert!(moved.notes.unwrap().starts_with("Rescheduled from"));

    let (past, _) = slot(-2);
    let err = booking::reschedule(state, &customer(), &created.id, past, time).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    booking::cancel(state, &customer(), &created.id).await.unwrap();
    let err = booking::reschedule(state, &customer(), &created.id, date, time).unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidState {
            action: "reschedule",
            status: "CANCELLED"
        }
    ));
}

// ── Provider Assignment ──

#[tokio::test]
async fn test_assignment_guards() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();

    let err = assignment::assign(state, &admin(), &created.id, "prov-3").await.unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable(_)));

    let err = assignment::assign(state, &admin(), &created.id, "prov-2").await.unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable(_)));

    let err = assignment::assign(state, &admin(), &created.id, "prov-404").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = assignment::assign(state, &admin(), "no-such-booking", "prov-1").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = assignment::assign(state, &customer(), &created.id, "prov-1").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    queries::set_provider_availability(&state.db(), "prov-1", Availability::Offline).unwrap();
    let err = assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable(_)));
    queries::set_provider_availability(&state.db(), "prov-1", Availability::Available).unwrap();
    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();

    booking::cancel(state, &customer(), &created.id).await.unwrap();
    let err = assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { status: "CANCELLED", .. }));
}

#[tokio::test]
async fn test_assignment_keeps_status() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::PostService)).unwrap();

    let assigned = assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();
    assert_eq!(assigned.status, BookingStatus::Pending);
    assert!(assigned.provider.is_assigned_to("prov-1"));
    assert_eq!(assigned.version, created.version + 1);
}

#[tokio::test]
async fn test_unassigned_pool_is_ordered_and_restartable() {
    let h = harness();
    let state = &h.state;

    let later = booking::create(state, &customer(), new_booking(9, 10_000, PaymentTiming::Advance)).unwrap();
    let soonest = booking::create(state, &customer(), new_booking(2, 10_000, PaymentTiming::Advance)).unwrap();
    let middle = booking::create(state, &customer(), new_booking(5, 10_000, PaymentTiming::Advance)).unwrap();
    let taken = booking::create(state, &customer(), new_booking(1, 10_000, PaymentTiming::Advance)).unwrap();
    let dropped = booking::create(state, &customer(), new_booking(4, 10_000, PaymentTiming::Advance)).unwrap();

    assignment::assign(state, &admin(), &taken.id, "prov-1").await.unwrap();
    booking::cancel(state, &customer(), &dropped.id).await.unwrap();

    let expected = vec![soonest.id.clone(), middle.id.clone(), later.id.clone()];
    {
        let db = state.db();
        for _ in 0..2 {
            let ids: Vec<String> = assignment::find_unassigned(&db)
                .with_page_size(1)
                .map(|b| b.unwrap().id)
                .collect();
            assert_eq!(ids, expected);
        }

        let first: Vec<String> = assignment::find_unassigned(&db)
            .take(1)
            .map(|b| b.unwrap().id)
            .collect();
        assert_eq!(first, vec![soonest.id.clone()]);
    }

    let listed = assignment::list_unassigned(state, &admin(), 2).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(matches!(
        assignment::list_unassigned(state, &provider(), 2).unwrap_err(),
        AppError::Forbidden(_)
    ));
}

// ── Rejection Requests ──

#[tokio::test]
async fn test_rejection_request_lifecycle() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::PostService)).unwrap();
    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();
    booking::accept(state, &provider(), &created.id).await.unwrap();

    let first = rejection::request_rejection(state, &provider(), &created.id, "family emergency").unwrap();
    assert_eq!(first.status, RequestStatus::Pending);

    let err = rejection::request_rejection(state, &provider(), &created.id, "still busy").unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let denied = rejection::deny(state, &admin(), &first.id, Some("please attend".to_string()))
        .await
        .unwrap();
    assert_eq!(denied.status, RequestStatus::Rejected);
    let review = denied.review.unwrap();
    assert_eq!(review.reviewer_id, "admin-1");
    assert_eq!(review.notes.as_deref(), Some("please attend"));
    assert!(booking::get(state, &created.id).unwrap().provider.is_assigned_to("prov-1"));

    let second = rejection::request_rejection(state, &provider(), &created.id, "car broke down").unwrap();
    let approved = rejection::approve(state, &admin(), &second.id, None).await.unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);

    let released = booking::get(state, &created.id).unwrap();
    assert_eq!(released.provider, Assignment::Unassigned);
    assert_eq!(released.status, BookingStatus::Confirmed);
    let pool = assignment::list_unassigned(state, &admin(), 10).unwrap();
    assert!(pool.iter().any(|b| b.id == created.id));

    let err = rejection::approve(state, &admin(), &second.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { status: "APPROVED", .. }));

    // Released, so the former provider has nothing to reject.
    let err = rejection::request_rejection(state, &provider(), &created.id, "again").unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();
    let third = rejection::request_rejection(state, &provider(), &created.id, "injured").unwrap();
    assert_eq!(third.status, RequestStatus::Pending);
    let pending = rejection::list_pending(state, &admin(), 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, third.id);

    let kinds = h.sent_kinds();
    assert_eq!(
        kinds.iter().filter(|k| *k == "rejection_resolved").count(),
        2
    );
}

#[tokio::test]
async fn test_rejection_request_guards() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::PostService)).unwrap();

    let err = rejection::request_rejection(state, &provider(), &created.id, "busy").unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();

    let err = rejection::request_rejection(state, &provider(), &created.id, "   ").unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = rejection::request_rejection(state, &admin(), &created.id, "busy").unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let request = rejection::request_rejection(state, &provider(), &created.id, "busy").unwrap();
    let err = rejection::approve(state, &provider(), &request.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let pending = rejection::list_pending(state, &admin(), 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, request.id);
}

#[tokio::test]
async fn test_approved_rejection_leaves_started_booking_alone() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::PostService)).unwrap();
    assignment::assign(state, &admin(), &created.id, "prov-1").await.unwrap();
    booking::accept(state, &provider(), &created.id).await.unwrap();

    let request = rejection::request_rejection(state, &provider(), &created.id, "unwell").unwrap();
    booking::start_service(state, &provider(), &created.id).unwrap();

    rejection::approve(state, &admin(), &request.id, None).await.unwrap();
    let current = booking::get(state, &created.id).unwrap();
    assert_eq!(current.status, BookingStatus::InProgress);
    assert!(current.provider.is_assigned_to("prov-1"));
}

// ── Service Catalog ──

#[tokio::test]
async fn test_catalog_request_lifecycle() {
    let h = harness();
    let state = &h.state;

    let request = catalog::submit(state, &provider(), "svc-physio", CatalogAction::Add).unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.requested_by, Requester::Provider);

    let err = catalog::submit(state, &provider(), "svc-physio", CatalogAction::Add).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = catalog::submit(state, &provider(), "svc-nursing", CatalogAction::Add).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = catalog::submit(state, &provider(), "svc-physio", CatalogAction::Remove).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = catalog::submit(state, &provider(), "svc-unknown", CatalogAction::Add).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(catalog::list_pending(state, &admin(), 10).unwrap().len(), 1);

    let approved = catalog::approve(state, &admin(), &request.id, None).await.unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(
        queries::list_provider_services(&state.db(), "prov-1").unwrap(),
        vec!["svc-nursing".to_string(), "svc-physio".to_string()]
    );
    assert!(catalog::list_pending(state, &admin(), 10).unwrap().is_empty());

    let err = catalog::approve(state, &admin(), &request.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { .. }));
}

#[tokio::test]
async fn test_catalog_reject_needs_reason_and_changes_nothing() {
    let h = harness();
    let state = &h.state;
    let request = catalog::submit(state, &provider(), "svc-nursing", CatalogAction::Remove).unwrap();

    let err = catalog::reject(state, &admin(), &request.id, "", None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let rejected = catalog::reject(state, &admin(), &request.id, "patients depend on you", None)
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("patients depend on you"));
    assert!(queries::provider_offers(&state.db(), "prov-1", "svc-nursing").unwrap());

    let own = catalog::list_for_provider(state, &provider(), 10).unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].status, RequestStatus::Rejected);
}

#[tokio::test]
async fn test_admin_catalog_change_applies_immediately() {
    let h = harness();
    let state = &h.state;

    let change = catalog::apply_as_admin(
        state,
        &admin(),
        "prov-1",
        "svc-nursing",
        CatalogAction::Remove,
        None,
    )
    .unwrap();
    assert_eq!(change.status, RequestStatus::Approved);
    assert_eq!(change.requested_by, Requester::Admin);
    assert_eq!(change.review.unwrap().reviewer_id, "admin-1");
    assert!(!queries::provider_offers(&state.db(), "prov-1", "svc-nursing").unwrap());
    assert!(queries::list_provider_services(&state.db(), "prov-1").unwrap().is_empty());

    let err = catalog::apply_as_admin(state, &provider(), "prov-1", "svc-physio", CatalogAction::Add, None)
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

// ── Payments ──

#[tokio::test]
async fn test_invoice_is_generated_once() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();
    let first = payment_for(state, &accepted);

    let again = payment::mark_success(state, &first.id, "txn-other").unwrap();
    assert_eq!(again.invoice_number, first.invoice_number);
    assert_eq!(again.transaction_id.as_deref(), Some("txn-1"));
    assert_eq!(again.version, first.version);

    let err = payment::mark_failed(state, &first.id, "late decline").unwrap_err();
    assert!(matches!(err, AppError::InvalidState { status: "SUCCESS", .. }));
}

#[tokio::test]
async fn test_payment_is_created_once_per_booking() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();

    let err = payment::create(&state.db(), &accepted, "mock").unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_refund_amount_validation() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();
    let paid = payment_for(state, &accepted);

    for amount in [10_001, -5, 0] {
        let err = payment::refund(state, &paid.id, amount, "test").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidAmount(_)), "{amount}");
    }
    assert!(h.refunds.lock().unwrap().is_empty());

    let partial = payment::refund(state, &paid.id, 4_000, "goodwill").await.unwrap();
    assert_eq!(partial.status, PaymentStatus::PartiallyRefunded);

    let err = payment::refund(state, &paid.id, 6_001, "too much").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let full = payment::refund(state, &paid.id, 6_000, "rest").await.unwrap();
    assert_eq!(full.status, PaymentStatus::Refunded);
    assert_eq!(full.refunded_amount, 10_000);
    assert_eq!(
        booking::get(state, &created.id).unwrap().payment_status,
        BookingPaymentStatus::Refunded
    );

    let err = payment::refund(state, &paid.id, 1, "nothing left").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { status: "REFUNDED", .. }));
}

#[tokio::test]
async fn test_concurrent_refunds_cannot_exceed_payment() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();
    let paid = payment_for(state, &accepted);

    let (a, b) = tokio::join!(
        payment::refund(state, &paid.id, 10_000, "first"),
        payment::refund(state, &paid.id, 10_000, "second")
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let err = a.err().or(b.err()).unwrap();
    assert!(matches!(err, AppError::InvalidAmount(_)));
    assert_eq!(*h.refunds.lock().unwrap(), vec![("txn-1".to_string(), 10_000)]);

    let settled = payment_for(state, &accepted);
    assert_eq!(settled.status, PaymentStatus::Refunded);
    assert_eq!(settled.refunded_amount, 10_000);
    assert_eq!(settled.refund_reserved, 0);
}

#[tokio::test]
async fn test_manual_refund_during_cancellation_refund() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();
    let paid = payment_for(state, &accepted);

    let cust = customer();
    let (cancelled, manual) = tokio::join!(
        booking::cancel(state, &cust, &created.id),
        payment::refund(state, &paid.id, 5_000, "goodwill")
    );
    assert_eq!(cancelled.unwrap().refunded, 10_000);
    assert!(matches!(manual.unwrap_err(), AppError::InvalidAmount(_)));
    assert_eq!(h.refunds.lock().unwrap().len(), 1);
    assert_eq!(payment_for(state, &accepted).refunded_amount, 10_000);
}

#[tokio::test]
async fn test_declined_refund_releases_reserved_amount() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();
    let paid = payment_for(state, &accepted);

    *h.refund_outcome.lock().unwrap() = GatewayOutcome::Failed;
    let err = payment::refund(state, &paid.id, 4_000, "goodwill").await.unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));

    let after = payment_for(state, &accepted);
    assert_eq!(after.status, PaymentStatus::Success);
    assert_eq!(after.refunded_amount, 0);
    assert_eq!(after.refund_reserved, 0);
    assert!(after.failure_reason.unwrap().contains("refund declined"));

    *h.refund_outcome.lock().unwrap() = GatewayOutcome::Success;
    let full = payment::refund(state, &paid.id, 10_000, "retry").await.unwrap();
    assert_eq!(full.status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_cancel_refused_while_charge_in_flight() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();

    let (adm, cust) = (admin(), customer());
    let (accepted, cancelled) = tokio::join!(
        booking::accept(state, &adm, &created.id),
        booking::cancel(state, &cust, &created.id)
    );
    assert!(matches!(cancelled.unwrap_err(), AppError::Conflict(_)));
    let accepted = accepted.unwrap();
    assert_eq!(accepted.status, BookingStatus::Confirmed);
    assert_eq!(accepted.payment_status, BookingPaymentStatus::Paid);

    let cancellation = booking::cancel(state, &customer(), &created.id).await.unwrap();
    assert_eq!(cancellation.refunded, 10_000);
    assert_eq!(cancellation.booking.status, BookingStatus::Cancelled);
    assert_eq!(cancellation.booking.payment_status, BookingPaymentStatus::Refunded);
    assert_eq!(payment_for(state, &accepted).status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_payment_visibility() {
    let h = harness();
    let state = &h.state;
    let created = booking::create(state, &customer(), new_booking(3, 10_000, PaymentTiming::Advance)).unwrap();
    let accepted = booking::accept(state, &admin(), &created.id).await.unwrap();
    let paid = payment_for(state, &accepted);

    assert!(payment::get(state, &customer(), &paid.id).is_ok());
    assert!(payment::get(state, &admin(), &paid.id).is_ok());
    assert!(matches!(
        payment::get(state, &provider(), &paid.id).unwrap_err(),
        AppError::Forbidden(_)
    ));
}

// ── Privacy ──

#[tokio::test]
async fn test_booking_view_redacts_for_provider_until_window() {
    let h = harness();
    let state = &h.state;
    let far = booking::create(state, &customer(), new_booking(10, 10_000, PaymentTiming::Advance)).unwrap();
    let near = booking::create(state, &customer(), new_booking(1, 10_000, PaymentTiming::Advance)).unwrap();
    assignment::assign(state, &admin(), &far.id, "prov-1").await.unwrap();
    assignment::assign(state, &admin(), &near.id, "prov-1").await.unwrap();

    let hidden = privacy::view_booking(state, &provider(), &far.id).unwrap();
    assert_eq!(hidden.customer_name, "Asha Rao");
    assert!(hidden.customer_phone.value.is_none());
    assert_eq!(hidden.customer_phone.message, "available 24 hours before service");
    assert!(hidden.emergency_contact_phone.value.is_none());

    let shown = privacy::view_booking(state, &provider(), &near.id).unwrap();
    assert_eq!(shown.customer_phone.value.as_deref(), Some(CUSTOMER_PHONE));
    assert!(shown.customer_address.visible);

    let own = privacy::view_booking(state, &customer(), &far.id).unwrap();
    assert_eq!(own.customer_phone.value.as_deref(), Some(CUSTOMER_PHONE));
    assert_eq!(own.customer_phone.message, "available");

    let err = privacy::view_booking(state, &Actor::new("cust-2", Role::Customer), &far.id).unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}
