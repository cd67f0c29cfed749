/// User endpoints
///
/// - `GET   /v1/users/me` - The caller
/// - `GET   /v1/users` - List users of the tenant
/// - `POST  /v1/users` - Provision a user for an identity-provider subject (admin)
/// - `PATCH /v1/users/:id` - Change name, role or active flag (admin)
///
/// Users sign in at the identity provider; provisioning only links the
/// provider subject (`external_id`) to this tenant.

use super::validate;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use dialdesk_shared::{
    auth::{authorization::require_role, middleware::AuthContext},
    events::{ChangeAction, EntityKind},
    models::{
        pagination::{Page, PageParams},
        user::{CreateUser, UpdateUser, User, UserRole},
    },
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    /// Identity-provider subject (`sub` claim)
    #[validate(length(min = 1, max = 255, message = "External id must be 1-255 characters"))]
    pub external_id: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(max = 255))]
    pub name: Option<String>,

    /// Defaults to `agent`
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    pub role: Option<UserRole>,

    pub active: Option<bool>,
}

impl UpdateUserRequest {
    /// Whether applying the update takes admin rights away from `user`
    fn removes_admin(&self, user: &User) -> bool {
        let is_active_admin = user.active && user.role == UserRole::Admin;
        let demoted = self.role.is_some_and(|r| r != UserRole::Admin);
        let deactivated = self.active == Some(false);
        is_active_admin && (demoted || deactivated)
    }
}

pub async fn me(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, auth.tenant_id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<User>>> {
    Ok(Json(User::list(&state.db, auth.tenant_id, &params).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    require_role(&auth, UserRole::Admin)?;
    validate(&req)?;

    let user = User::create(
        &state.db,
        CreateUser {
            tenant_id: auth.tenant_id,
            external_id: req.external_id.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            name: req.name,
            role: req.role.unwrap_or(UserRole::Agent),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, tenant_id = %auth.tenant_id, role = user.role.as_str(), "User provisioned");
    state
        .hub
        .emit(auth.tenant_id, EntityKind::User, ChangeAction::Created, user.id, &user);

    Ok((StatusCode::CREATED, Json(user)))
}

/// Update a user
///
/// Refuses (409) to demote or deactivate the tenant's last active admin.
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    require_role(&auth, UserRole::Admin)?;
    validate(&req)?;

    let existing = User::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if req.removes_admin(&existing)
        && User::count_active_admins(&state.db, auth.tenant_id).await? <= 1
    {
        return Err(ApiError::Conflict(
            "Cannot remove the last active admin".to_string(),
        ));
    }

    let user = User::update(
        &state.db,
        auth.tenant_id,
        id,
        UpdateUser {
            name: req.name,
            role: req.role,
            active: req.active,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    tracing::info!(user_id = %user.id, changed_by = %auth.user_id, "User updated");
    state
        .hub
        .emit(auth.tenant_id, EntityKind::User, ChangeAction::Updated, user.id, &user);

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: UserRole, active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            external_id: "idp|1".to_string(),
            email: "a@example.com".to_string(),
            name: None,
            role,
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn update(role: Option<UserRole>, active: Option<bool>) -> UpdateUserRequest {
        UpdateUserRequest {
            name: None,
            role,
            active,
        }
    }

    #[test]
    fn test_removes_admin() {
        let admin = user(UserRole::Admin, true);
        assert!(update(Some(UserRole::Agent), None).removes_admin(&admin));
        assert!(update(None, Some(false)).removes_admin(&admin));
        assert!(!update(Some(UserRole::Admin), Some(true)).removes_admin(&admin));
        assert!(!update(None, None).removes_admin(&admin));

        let agent = user(UserRole::Agent, true);
        assert!(!update(None, Some(false)).removes_admin(&agent));

        let inactive_admin = user(UserRole::Admin, false);
        assert!(!update(Some(UserRole::Agent), None).removes_admin(&inactive_admin));
    }
}
