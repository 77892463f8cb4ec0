use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Actor, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| AppError::Unauthorized(format!("{name} header is not valid text")))
}

/// Identity forwarded by the auth gateway in `x-user-id` / `x-user-role`.
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = Uuid::parse_str(header(parts, USER_ID_HEADER)?.trim()).map_err(|err| {
            debug!(error = %err, "rejected malformed user id");
            AppError::Unauthorized(format!("{USER_ID_HEADER} is not a valid id"))
        })?;

        let raw_role = header(parts, USER_ROLE_HEADER)?;
        let role = Role::parse(raw_role)
            .ok_or_else(|| AppError::Unauthorized(format!("unknown role {raw_role}")))?;

        Ok(Actor::new(user_id, role))
    }
}

/// Fails with 403 unless the caller holds one of `roles`.
pub fn require(actor: &Actor, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&actor.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role {} may not perform this action",
            actor.role.as_str()
        )))
    }
}

/// Admins, or the user the resource belongs to.
pub fn require_self_or_admin(actor: &Actor, owner: Uuid) -> Result<(), AppError> {
    if actor.is_admin() || actor.user_id == owner {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only the owner or an administrator may do this".to_string(),
        ))
    }
}
