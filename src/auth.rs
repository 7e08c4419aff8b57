// Caller identity extractor
//
// Authentication happens upstream; the gateway in front of this service
// forwards the verified user id and role as headers.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::bookings::models::{Actor, ActorRole};
use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Role named in the role header; the system role is never accepted from a request
fn parse_role(value: &str) -> Option<ActorRole> {
    match value.trim().to_ascii_lowercase().as_str() {
        "guest" => Some(ActorRole::Guest),
        "host" => Some(ActorRole::Host),
        "admin" => Some(ActorRole::Admin),
        _ => None,
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("malformed {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?;
        let user_id = Uuid::parse_str(user_id.trim()).map_err(|_| {
            warn!("Rejected request with invalid user id for {}", parts.uri.path());
            ApiError::Unauthorized("user id must be a UUID".to_string())
        })?;

        let role = header(parts, USER_ROLE_HEADER)?;
        let role = parse_role(role).ok_or_else(|| {
            warn!("Rejected request with unknown role '{}' for {}", role, parts.uri.path());
            ApiError::Unauthorized(format!("unknown role '{}'", role))
        })?;

        Ok(Actor::new(user_id, role))
    }
}

/// Require the admin role for admin-only routes
pub fn require_admin(actor: &Actor) -> Result<(), ApiError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "admin role required, caller is {}",
            actor.role
        )))
    }
}
