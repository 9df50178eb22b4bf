use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{
    Actor, CatalogAction, CatalogRequest, RequestStatus, Requester, Review, Reviewable, Role,
    Verdict,
};
use crate::services::notifier::{dispatch, Notification};
use crate::services::now;
use crate::state::AppState;

/// Checks that the service exists and that the change would actually do something.
fn validate_change(
    conn: &Connection,
    provider_id: &str,
    service_id: &str,
    action: CatalogAction,
) -> Result<(), AppError> {
    if queries::get_provider(conn, provider_id)?.is_none() {
        return Err(AppError::not_found("provider", provider_id));
    }
    if queries::get_service(conn, service_id)?.is_none() {
        return Err(AppError::not_found("service", service_id));
    }

    let offered = queries::provider_offers(conn, provider_id, service_id)?;
    match action {
        CatalogAction::Add if offered => Err(AppError::Validation(format!(
            "provider {provider_id} already offers service {service_id}"
        ))),
        CatalogAction::Remove if !offered => Err(AppError::Validation(format!(
            "provider {provider_id} does not offer service {service_id}"
        ))),
        _ => Ok(()),
    }
}

fn apply_change(conn: &Connection, request: &CatalogRequest) -> Result<(), AppError> {
    match request.action {
        CatalogAction::Add => {
            queries::add_provider_service(conn, &request.provider_id, &request.service_id)?
        }
        CatalogAction::Remove => {
            queries::remove_provider_service(conn, &request.provider_id, &request.service_id)?;
        }
    }
    Ok(())
}

fn insert(conn: &Connection, request: &CatalogRequest) -> Result<(), AppError> {
    queries::insert_catalog_request(conn, request).map_err(|e| {
        if db::is_constraint_violation(&e) {
            AppError::Conflict(format!(
                "a {} request for service {} is already pending",
                request.action.as_str(),
                request.service_id
            ))
        } else {
            AppError::Internal(e)
        }
    })
}

/// A provider asks to add or remove one of their own offerable services.
pub fn submit(
    state: &AppState,
    actor: &Actor,
    service_id: &str,
    action: CatalogAction,
) -> Result<CatalogRequest, AppError> {
    if actor.role != Role::Provider {
        return Err(AppError::Forbidden(
            "only providers may submit catalog requests".to_string(),
        ));
    }

    let mut db = state.db();
    let tx = db.transaction()?;

    validate_change(&tx, &actor.id, service_id, action)?;
    if let Some(existing) = queries::find_pending_catalog_request(&tx, &actor.id, service_id, action)? {
        return Err(AppError::Conflict(format!(
            "catalog request {} is already pending",
            existing.id
        )));
    }

    let request = CatalogRequest {
        id: Uuid::new_v4().to_string(),
        provider_id: actor.id.clone(),
        service_id: service_id.to_string(),
        action,
        requested_by: Requester::Provider,
        status: RequestStatus::Pending,
        requested_at: now(),
        rejection_reason: None,
        review: None,
    };
    insert(&tx, &request)?;
    tx.commit()?;

    tracing::info!(
        request_id = %request.id,
        provider_id = %actor.id,
        service_id,
        action = action.as_str(),
        "catalog request submitted"
    );
    Ok(request)
}

/// An admin changes a provider's catalog directly. The change is applied at
/// once and recorded as an already-approved request.
pub fn apply_as_admin(
    state: &AppState,
    actor: &Actor,
    provider_id: &str,
    service_id: &str,
    action: CatalogAction,
    notes: Option<String>,
) -> Result<CatalogRequest, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only admins may change catalogs directly".to_string(),
        ));
    }

    let mut db = state.db();
    let tx = db.transaction()?;

    validate_change(&tx, provider_id, service_id, action)?;

    let now = now();
    let request = CatalogRequest {
        id: Uuid::new_v4().to_string(),
        provider_id: provider_id.to_string(),
        service_id: service_id.to_string(),
        action,
        requested_by: Requester::Admin,
        status: RequestStatus::Approved,
        requested_at: now,
        rejection_reason: None,
        review: Some(Review {
            reviewer_id: actor.id.clone(),
            reviewed_at: now,
            notes: notes.filter(|n| !n.trim().is_empty()),
        }),
    };
    insert(&tx, &request)?;
    apply_change(&tx, &request)?;
    tx.commit()?;

    tracing::info!(
        request_id = %request.id,
        provider_id,
        service_id,
        action = action.as_str(),
        admin_id = %actor.id,
        "catalog changed by admin"
    );
    Ok(request)
}

pub async fn approve(
    state: &AppState,
    actor: &Actor,
    request_id: &str,
    notes: Option<String>,
) -> Result<CatalogRequest, AppError> {
    adjudicate(state, actor, request_id, Verdict::Approve, notes, None).await
}

/// Declines the change. A reason is required and is shown to the provider.
pub async fn reject(
    state: &AppState,
    actor: &Actor,
    request_id: &str,
    reason: &str,
    notes: Option<String>,
) -> Result<CatalogRequest, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("a rejection reason is required".to_string()));
    }
    adjudicate(state, actor, request_id, Verdict::Reject, notes, Some(reason)).await
}

async fn adjudicate(
    state: &AppState,
    actor: &Actor,
    request_id: &str,
    verdict: Verdict,
    notes: Option<String>,
    reason: Option<&str>,
) -> Result<CatalogRequest, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only admins may resolve catalog requests".to_string(),
        ));
    }

    let (request, provider_phone) = {
        let mut db = state.db();
        let tx = db.transaction()?;

        let mut request = queries::get_catalog_request(&tx, request_id)?
            .ok_or_else(|| AppError::not_found("catalog request", request_id))?;
        request.resolve(
            verdict,
            Review {
                reviewer_id: actor.id.clone(),
                reviewed_at: now(),
                notes: notes.filter(|n| !n.trim().is_empty()),
            },
        )?;
        request.rejection_reason = reason.map(str::to_string);

        if !queries::resolve_catalog_request(&tx, &request)? {
            return Err(AppError::Conflict(format!(
                "catalog request {request_id} was resolved concurrently"
            )));
        }
        if request.status == RequestStatus::Approved {
            // The catalog may have moved since the request was filed.
            validate_change(&tx, &request.provider_id, &request.service_id, request.action)?;
            apply_change(&tx, &request)?;
        }

        let phone = queries::get_provider(&tx, &request.provider_id)?.and_then(|p| p.phone);
        tx.commit()?;
        (request, phone)
    };

    tracing::info!(
        request_id,
        provider_id = %request.provider_id,
        status = request.status.as_str(),
        "catalog request resolved"
    );

    dispatch(
        state.notifier.as_ref(),
        Notification::CatalogRequestResolved {
            service_id: request.service_id.clone(),
            action: request.action,
            approved: request.status == RequestStatus::Approved,
        },
        provider_phone.as_deref(),
    )
    .await;

    Ok(request)
}

pub fn list_pending(state: &AppState, actor: &Actor, limit: i64) -> Result<Vec<CatalogRequest>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only admins may review catalog requests".to_string(),
        ));
    }
    let db = state.db();
    Ok(queries::list_pending_catalog_requests(&db, limit)?)
}

/// The calling provider's own requests, newest first.
pub fn list_for_provider(state: &AppState, actor: &Actor, limit: i64) -> Result<Vec<CatalogRequest>, AppError> {
    if actor.role != Role::Provider {
        return Err(AppError::Forbidden(
            "only providers have catalog requests".to_string(),
        ));
    }
    let db = state.db();
    Ok(queries::list_provider_catalog_requests(&db, &actor.id, limit)?)
}
