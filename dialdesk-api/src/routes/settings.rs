/// Tenant telephony settings
///
/// - `GET   /v1/settings` - Any user
/// - `PATCH /v1/settings` - Admin only
///
/// `caller_id` routes inbound calls and SMS to the tenant, so it is unique
/// across tenants (409 on conflict). Set `voicemail_drop_url` to an empty
/// string to turn voicemail drop off.

use super::{normalize_phone_opt, validate};
use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use dialdesk_shared::{
    auth::{authorization::require_role, middleware::AuthContext},
    events::{ChangeAction, EntityKind},
    models::{
        settings::{TenantSettings, UpdateSettings},
        user::UserRole,
    },
};
use serde::Deserialize;
use validator::{Validate, ValidationError};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub caller_id: Option<String>,

    #[validate(range(min = 1, max = 10, message = "Dialer lines must be 1-10"))]
    pub dialer_lines: Option<i32>,

    pub amd_enabled: Option<bool>,

    #[validate(custom(function = "validate_drop_url"))]
    pub voicemail_drop_url: Option<String>,

    pub recording_enabled: Option<bool>,

    #[validate(length(min = 1, max = 64, message = "Timezone must be 1-64 characters"))]
    pub timezone: Option<String>,
}

/// Accepts an empty string (turns the drop off) or an http(s) URL
fn validate_drop_url(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() || value.starts_with("https://") || value.starts_with("http://") {
        Ok(())
    } else {
        let mut err = ValidationError::new("url");
        err.message = Some("Must be an http(s) URL".into());
        Err(err)
    }
}

pub async fn get_settings(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<TenantSettings>> {
    Ok(Json(
        TenantSettings::get_or_create(&state.db, auth.tenant_id).await?,
    ))
}

pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<TenantSettings>> {
    require_role(&auth, UserRole::Admin)?;
    validate(&req)?;

    let update = UpdateSettings {
        caller_id: normalize_phone_opt("caller_id", req.caller_id)?,
        dialer_lines: req.dialer_lines,
        amd_enabled: req.amd_enabled,
        voicemail_drop_url: req.voicemail_drop_url.map(|u| u.trim().to_string()),
        recording_enabled: req.recording_enabled,
        timezone: req.timezone.map(|t| t.trim().to_string()),
    };

    let settings = TenantSettings::update(&state.db, auth.tenant_id, update).await?;

    tracing::info!(tenant_id = %auth.tenant_id, user_id = %auth.user_id, "Settings updated");
    state.hub.emit(
        auth.tenant_id,
        EntityKind::Settings,
        ChangeAction::Updated,
        auth.tenant_id,
        &settings,
    );

    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_url() {
        assert!(validate_drop_url("").is_ok());
        assert!(validate_drop_url("https://cdn.example.com/vm.mp3").is_ok());
        assert!(validate_drop_url("ftp://example.com/vm.mp3").is_err());
    }

    #[test]
    fn test_dialer_lines_range() {
        let req: UpdateSettingsRequest = serde_json::from_str(r#"{ "dialer_lines": 11 }"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateSettingsRequest = serde_json::from_str(r#"{ "dialer_lines": 4 }"#).unwrap();
        assert!(req.validate().is_ok());
    }
}
