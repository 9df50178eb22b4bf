use axum::http::{header, HeaderMap};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{Actor, Role};

const ACTOR_ID: &str = "x-actor-id";
const ACTOR_ROLE: &str = "x-actor-role";

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Checks the shared bearer token and reads the calling actor from the
/// `X-Actor-Id` / `X-Actor-Role` headers.
pub fn authenticate(headers: &HeaderMap, config: &AppConfig) -> Result<Actor, AppError> {
    let token = header_value(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if token.is_empty() || token != config.api_token {
        return Err(AppError::Unauthorized);
    }

    let id = header_value(headers, ACTOR_ID).ok_or(AppError::Unauthorized)?;
    let role = header_value(headers, ACTOR_ROLE)
        .and_then(Role::parse)
        .ok_or(AppError::Unauthorized)?;

    Ok(Actor::new(id, role))
}
