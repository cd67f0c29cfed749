/// Call endpoints
///
/// - `GET    /v1/calls?q=&status=&direction=&from=&to=` - List and search
/// - `POST   /v1/calls` - Log a call by hand
/// - `GET    /v1/calls/stats?from=&to=` - Aggregates, default last 7 days
/// - `GET    /v1/calls/:id` - Get
/// - `PATCH  /v1/calls/:id` - Notes, disposition, contact link
/// - `DELETE /v1/calls/:id` - Delete (admin)
/// - `POST   /v1/calls/:id/hangup` - End a live call through the provider
///
/// Calls placed through the provider change status only through the status
/// webhook; `hangup` asks the provider to end the call and returns 202.

use super::{normalize_phone, validate};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use dialdesk_shared::{
    auth::{authorization::require_role, middleware::AuthContext},
    events::{ChangeAction, EntityKind},
    models::{
        call::{Call, CallDirection, CallFilter, CallStats, CallStatus, CreateCall, UpdateCall},
        contact::Contact,
        lead::Lead,
        pagination::{Page, PageParams},
        settings::TenantSettings,
        user::UserRole,
    },
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Number recorded for our side of a logged call when no caller id is set
const UNKNOWN_NUMBER: &str = "unknown";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCallRequest {
    pub direction: CallDirection,

    /// The other party's number
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,

    /// Must be a terminal status; defaults to `completed`
    pub status: Option<CallStatus>,

    #[validate(range(min = 0, max = 86400))]
    pub duration_seconds: Option<i32>,

    pub started_at: Option<DateTime<Utc>>,

    pub contact_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,

    #[validate(length(max = 100))]
    pub disposition: Option<String>,

    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCallRequest {
    #[validate(length(max = 100))]
    pub disposition: Option<String>,

    pub notes: Option<String>,

    pub contact_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl StatsRange {
    /// Resolves the range, defaulting to the 7 days before `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> ApiResult<(DateTime<Utc>, DateTime<Utc>)> {
        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or(to - Duration::days(7));

        if from >= to {
            return Err(ApiError::invalid_field("from", "Must be before `to`"));
        }
        Ok((from, to))
    }
}

async fn check_contact(pool: &PgPool, tenant_id: Uuid, contact_id: Option<Uuid>) -> ApiResult<()> {
    if let Some(id) = contact_id {
        Contact::find_by_id(pool, tenant_id, id)
            .await?
            .ok_or_else(|| ApiError::invalid_field("contact_id", "Unknown contact"))?;
    }
    Ok(())
}

pub async fn list_calls(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
    Query(filter): Query<CallFilter>,
) -> ApiResult<Json<Page<Call>>> {
    let page = Call::list(&state.db, auth.tenant_id, &filter, &params).await?;
    Ok(Json(page))
}

/// Log a call that did not go through the provider
///
/// ```text
/// POST /v1/calls
///
/// { "direction": "outbound", "phone": "+14155552671", "duration_seconds": 95, "disposition": "callback" }
/// ```
///
/// Our side of the call is the tenant caller id. The contact is linked by
/// `contact_id` or, failing that, by phone number.
pub async fn create_call(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateCallRequest>,
) -> ApiResult<(StatusCode, Json<Call>)> {
    validate(&req)?;

    let status = req.status.unwrap_or(CallStatus::Completed);
    if !status.is_terminal() {
        return Err(ApiError::invalid_field(
            "status",
            "A logged call must have ended",
        ));
    }

    let phone = normalize_phone("phone", &req.phone)?;

    check_contact(&state.db, auth.tenant_id, req.contact_id).await?;
    if let Some(lead_id) = req.lead_id {
        Lead::find_by_id(&state.db, auth.tenant_id, lead_id)
            .await?
            .ok_or_else(|| ApiError::invalid_field("lead_id", "Unknown lead"))?;
    }

    let contact_id = match req.contact_id {
        Some(id) => Some(id),
        None => Contact::find_by_phone(&state.db, auth.tenant_id, &phone)
            .await?
            .map(|c| c.id),
    };

    let settings = TenantSettings::get_or_create(&state.db, auth.tenant_id).await?;
    let ours = settings
        .caller_id
        .unwrap_or_else(|| UNKNOWN_NUMBER.to_string());

    let (from_number, to_number) = match req.direction {
        CallDirection::Outbound => (ours, phone),
        CallDirection::Inbound => (phone, ours),
    };

    let call = Call::create(
        &state.db,
        auth.tenant_id,
        CreateCall {
            user_id: Some(auth.user_id),
            contact_id,
            lead_id: req.lead_id,
            dial_session_id: None,
            direction: req.direction,
            from_number,
            to_number,
            status,
            provider_call_sid: None,
            duration_seconds: req.duration_seconds,
            started_at: req.started_at,
            disposition: req.disposition,
            notes: req.notes,
        },
    )
    .await?;

    tracing::info!(call_id = %call.id, user_id = %auth.user_id, "Call logged");
    state
        .hub
        .emit(auth.tenant_id, EntityKind::Call, ChangeAction::Created, call.id, &call);

    Ok((StatusCode::CREATED, Json(call)))
}

pub async fn call_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(range): Query<StatsRange>,
) -> ApiResult<Json<CallStats>> {
    let (from, to) = range.resolve(Utc::now())?;
    Ok(Json(Call::stats(&state.db, auth.tenant_id, from, to).await?))
}

pub async fn get_call(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Call>> {
    let call = Call::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Call"))?;
    Ok(Json(call))
}

pub async fn update_call(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCallRequest>,
) -> ApiResult<Json<Call>> {
    validate(&req)?;
    check_contact(&state.db, auth.tenant_id, req.contact_id).await?;

    let call = Call::update(
        &state.db,
        auth.tenant_id,
        id,
        UpdateCall {
            disposition: req.disposition,
            notes: req.notes,
            contact_id: req.contact_id,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Call"))?;

    state
        .hub
        .emit(auth.tenant_id, EntityKind::Call, ChangeAction::Updated, call.id, &call);

    Ok(Json(call))
}

pub async fn delete_call(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&auth, UserRole::Admin)?;

    if !Call::delete(&state.db, auth.tenant_id, id).await? {
        return Err(ApiError::not_found("Call"));
    }

    tracing::info!(call_id = %id, user_id = %auth.user_id, "Call deleted");
    state.hub.emit_deleted(auth.tenant_id, EntityKind::Call, id);

    Ok(StatusCode::NO_CONTENT)
}

/// End a live call
///
/// Returns 409 if the call has already ended or was never placed through
/// the provider, 502 if the provider rejects the request.
pub async fn hangup_call(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Call>)> {
    let call = Call::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Call"))?;

    if !call.status.is_live() {
        return Err(ApiError::Conflict("Call has already ended".to_string()));
    }

    let sid = call
        .provider_call_sid
        .as_deref()
        .ok_or_else(|| ApiError::Conflict("Call has no provider call".to_string()))?;

    state.provider.hangup(sid).await?;
    tracing::info!(call_id = %call.id, call_sid = sid, user_id = %auth.user_id, "Hangup requested");

    Ok((StatusCode::ACCEPTED, Json(call)))
}
