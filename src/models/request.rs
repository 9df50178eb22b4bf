use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Shared lifecycle of admin-gated requests: created pending, resolved once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RequestStatus::Pending),
            "APPROVED" => Some(RequestStatus::Approved),
            "REJECTED" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approve => "approve request",
            Verdict::Reject => "reject request",
        }
    }

    fn outcome(&self) -> RequestStatus {
        match self {
            Verdict::Approve => RequestStatus::Approved,
            Verdict::Reject => RequestStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub reviewer_id: String,
    pub reviewed_at: NaiveDateTime,
    pub notes: Option<String>,
}

/// A request that an admin resolves exactly once.
pub trait Reviewable {
    fn status(&self) -> RequestStatus;
    fn record(&mut self, status: RequestStatus, review: Review);

    fn resolve(&mut self, verdict: Verdict, review: Review) -> Result<RequestStatus, AppError> {
        let current = self.status();
        if current != RequestStatus::Pending {
            return Err(AppError::InvalidState {
                action: verdict.as_str(),
                status: current.as_str(),
            });
        }
        let next = verdict.outcome();
        self.record(next, review);
        Ok(next)
    }
}

/// A provider asking to be released from a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRequest {
    pub id: String,
    pub booking_id: String,
    pub provider_id: String,
    pub reason: String,
    pub status: RequestStatus,
    pub requested_at: NaiveDateTime,
    pub review: Option<Review>,
}

impl Reviewable for RejectionRequest {
    fn status(&self) -> RequestStatus {
        self.status
    }

    fn record(&mut self, status: RequestStatus, review: Review) {
        self.status = status;
        self.review = Some(review);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogAction {
    Add,
    Remove,
}

impl CatalogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogAction::Add => "ADD",
            CatalogAction::Remove => "REMOVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADD" => Some(CatalogAction::Add),
            "REMOVE" => Some(CatalogAction::Remove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Requester {
    Provider,
    Admin,
}

impl Requester {
    pub fn as_str(&self) -> &'static str {
        match self {
            Requester::Provider => "PROVIDER",
            Requester::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROVIDER" => Some(Requester::Provider),
            "ADMIN" => Some(Requester::Admin),
            _ => None,
        }
    }
}

/// A change to the set of services a provider offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRequest {
    pub id: String,
    pub provider_id: String,
    pub service_id: String,
    pub action: CatalogAction,
    pub requested_by: Requester,
    pub status: RequestStatus,
    pub requested_at: NaiveDateTime,
    pub rejection_reason: Option<String>,
    pub review: Option<Review>,
}

impl Reviewable for CatalogRequest {
    fn status(&self) -> RequestStatus {
        self.status
    }

    fn record(&mut self, status: RequestStatus, review: Review) {
        self.status = status;
        self.review = Some(review);
    }
}
