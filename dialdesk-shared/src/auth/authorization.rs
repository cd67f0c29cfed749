/// Role checks
///
/// Two roles, ordered `admin > agent`. Agents work records in their tenant;
/// admins additionally manage settings and users and may delete call history.
/// Tenant isolation is not checked here: every query is already scoped by the
/// caller's tenant.
///
/// # Example
///
/// ```
/// use dialdesk_shared::auth::authorization::{require_role, require_ownership_or_admin};
/// use dialdesk_shared::auth::middleware::AuthContext;
/// use dialdesk_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// let agent = AuthContext {
///     user_id: Uuid::new_v4(),
///     tenant_id: Uuid::new_v4(),
///     role: UserRole::Agent,
///     external_id: "idp|1".to_string(),
/// };
///
/// assert!(require_role(&agent, UserRole::Agent).is_ok());
/// assert!(require_role(&agent, UserRole::Admin).is_err());
/// assert!(require_ownership_or_admin(&agent, Some(agent.user_id)).is_ok());
/// ```

use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::user::UserRole;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Insufficient permissions: requires {required:?}, has {actual:?}")]
    InsufficientRole { required: UserRole, actual: UserRole },

    #[error("Not authorized to access this resource")]
    NotOwner,
}

/// Requires the caller's role to be at least `required`
pub fn require_role(auth: &AuthContext, required: UserRole) -> Result<(), AuthzError> {
    if auth.role.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole {
            required,
            actual: auth.role,
        })
    }
}

/// Requires the caller to own the resource or be an admin
///
/// A resource without an owner is only accessible to admins.
pub fn require_ownership_or_admin(
    auth: &AuthContext,
    owner_id: Option<Uuid>,
) -> Result<(), AuthzError> {
    if auth.is_admin() || owner_id == Some(auth.user_id) {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}
