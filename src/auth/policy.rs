use mongodb::bson::oid::ObjectId;

use crate::auth::models::{AuthenticatedUser, Role};
use crate::error::AppError;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Ownership policy: the owner of a resource and admins may act on it.
pub fn authorize(actor: &AuthenticatedUser, owner: &ObjectId) -> Decision {
    if actor.is_admin() || actor.id == *owner {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

/// Fail with 401 unless `actor` may act on a resource owned by `owner`.
pub fn ensure_owner(
    actor: &AuthenticatedUser,
    owner: &ObjectId,
    action: &str,
    resource: &str,
    resource_id: &ObjectId,
) -> Result<(), AppError> {
    match authorize(actor, owner) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(AppError::Auth(format!(
            "User {} is not authorized to {} {} {}",
            actor.id, action, resource, resource_id
        ))),
    }
}

/// Fail with 403 unless the actor holds one of `allowed`.
pub fn require_role(actor: &AuthenticatedUser, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "User role \"{}\" is not authorized to access this route",
            actor.role
        )))
    }
}
