/// Current tenant
///
/// - `GET   /v1/tenant`
/// - `PATCH /v1/tenant` - Rename (admin)

use super::validate;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Json};
use dialdesk_shared::{
    auth::{authorization::require_role, middleware::AuthContext},
    models::{tenant::Tenant, user::UserRole},
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTenantRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
}

pub async fn get_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Tenant>> {
    let tenant = Tenant::find_by_id(&state.db, auth.tenant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant"))?;
    Ok(Json(tenant))
}

pub async fn update_tenant(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateTenantRequest>,
) -> ApiResult<Json<Tenant>> {
    require_role(&auth, UserRole::Admin)?;
    validate(&req)?;

    let tenant = Tenant::rename(&state.db, auth.tenant_id, req.name.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("Tenant"))?;

    tracing::info!(tenant_id = %tenant.id, "Tenant renamed");
    Ok(Json(tenant))
}
