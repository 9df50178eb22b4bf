pub mod admin;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod health;
pub mod payments;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/accept", post(bookings::accept_booking))
        .route("/api/bookings/:id/reject", post(bookings::reject_booking))
        .route("/api/bookings/:id/start", post(bookings::start_booking))
        .route("/api/bookings/:id/complete", post(bookings::complete_booking))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route(
            "/api/bookings/:id/reschedule",
            post(bookings::reschedule_booking),
        )
        .route("/api/bookings/:id/assign", post(bookings::assign_provider))
        .route(
            "/api/bookings/:id/rejection-requests",
            post(bookings::request_rejection),
        )
        .route(
            "/api/admin/bookings/unassigned",
            get(admin::get_unassigned),
        )
        .route(
            "/api/admin/rejection-requests",
            get(admin::get_rejection_requests),
        )
        .route(
            "/api/admin/rejection-requests/:id/approve",
            post(admin::approve_rejection),
        )
        .route(
            "/api/admin/rejection-requests/:id/deny",
            post(admin::deny_rejection),
        )
        .route(
            "/api/catalog-requests",
            post(catalog::submit_request).get(catalog::list_own_requests),
        )
        .route(
            "/api/admin/catalog-requests",
            post(admin::create_catalog_change).get(admin::get_catalog_requests),
        )
        .route(
            "/api/admin/catalog-requests/:id/approve",
            post(admin::approve_catalog_request),
        )
        .route(
            "/api/admin/catalog-requests/:id/reject",
            post(admin::reject_catalog_request),
        )
        .route("/api/payments/:id", get(payments::get_payment))
        .route("/api/payments/:id/refund", post(payments::refund_payment))
        .route("/webhooks/payments", post(webhook::payment_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
