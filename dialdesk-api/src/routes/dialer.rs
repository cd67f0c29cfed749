/// Parallel dialer sessions
///
/// - `POST /v1/dialer/sessions` - Start a session over a list of leads
/// - `GET  /v1/dialer/sessions` - List, newest first
/// - `GET  /v1/dialer/sessions/:id` - Session with its lines
/// - `POST /v1/dialer/sessions/:id/pause`
/// - `POST /v1/dialer/sessions/:id/resume`
/// - `POST /v1/dialer/sessions/:id/cancel`
///
/// The API only records intent. The dialer worker claims `pending` sessions,
/// places the calls and reacts to pause and cancel on its next tick.
///
/// Only the session's agent or an admin may control it. A transition the
/// current state does not allow is a 409.

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
    auth::{authorization::require_ownership_or_admin, middleware::AuthContext},
    events::{ChangeAction, EntityKind},
    models::{
        call::Call,
        dial_session::{CreateDialSession, DialSession, DialSessionState},
        lead::Lead,
        pagination::{Page, PageParams},
        settings::TenantSettings,
    },
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    /// Leads in dialing order
    #[validate(length(min = 1, max = 1000, message = "Provide 1-1000 leads"))]
    pub lead_ids: Vec<Uuid>,

    /// Simultaneous lines; defaults to the tenant setting
    #[validate(range(min = 1, max = 10, message = "Lines must be 1-10"))]
    pub lines: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub session: DialSession,

    /// Calls placed by the session, oldest first
    pub lines: Vec<Call>,
}

/// Removes repeated ids, keeping the first occurrence
fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Start a dial session
///
/// ```text
/// POST /v1/dialer/sessions
///
/// { "lead_ids": ["...", "..."], "lines": 3 }
/// ```
///
/// Every lead must belong to the tenant (422 otherwise). Converted and lost
/// leads are dropped from the list; if none remain the request is a 422.
/// The tenant needs a caller id to dial from.
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<DialSession>)> {
    validate(&req)?;

    let requested = dedupe(&req.lead_ids);
    let leads = Lead::find_many(&state.db, auth.tenant_id, &requested).await?;

    if leads.len() != requested.len() {
        return Err(ApiError::invalid_field("lead_ids", "Unknown lead"));
    }

    let open: HashSet<Uuid> = leads
        .iter()
        .filter(|lead| !lead.status.is_closed())
        .map(|lead| lead.id)
        .collect();
    let lead_ids: Vec<Uuid> = requested.into_iter().filter(|id| open.contains(id)).collect();

    if lead_ids.is_empty() {
        return Err(ApiError::invalid_field(
            "lead_ids",
            "All leads are converted or lost",
        ));
    }

    let settings = TenantSettings::get_or_create(&state.db, auth.tenant_id).await?;
    if settings.caller_id.is_none() {
        return Err(ApiError::BadRequest(
            "No caller id is configured for this tenant".to_string(),
        ));
    }

    let session = DialSession::create(
        &state.db,
        auth.tenant_id,
        CreateDialSession {
            user_id: auth.user_id,
            lines: req.lines.unwrap_or(settings.dialer_lines),
            lead_ids,
        },
    )
    .await?;

    tracing::info!(
        session_id = %session.id,
        user_id = %auth.user_id,
        leads = session.lead_ids.len(),
        lines = session.lines,
        "Dial session created"
    );
    state.hub.emit(
        auth.tenant_id,
        EntityKind::DialSession,
        ChangeAction::Created,
        session.id,
        &session,
    );

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<DialSession>>> {
    Ok(Json(
        DialSession::list(&state.db, auth.tenant_id, &params).await?,
    ))
}

pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionDetail>> {
    let session = DialSession::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Dial session"))?;

    let lines = Call::list_by_session(&state.db, session.id).await?;

    Ok(Json(SessionDetail { session, lines }))
}

async fn transition(
    state: &AppState,
    auth: &AuthContext,
    id: Uuid,
    target: DialSessionState,
) -> ApiResult<Json<DialSession>> {
    let session = DialSession::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Dial session"))?;

    require_ownership_or_admin(auth, Some(session.user_id))?;

    // Pending sessions start when the dialer claims them, not on resume
    let allowed = match target {
        DialSessionState::Running => session.state == DialSessionState::Paused,
        _ => true,
    };

    let updated = if allowed {
        DialSession::transition(&state.db, auth.tenant_id, id, target).await?
    } else {
        None
    };

    let updated = updated.ok_or_else(|| {
        ApiError::Conflict(format!(
            "Cannot move a {} session to {}",
            session.state.as_str(),
            target.as_str()
        ))
    })?;

    tracing::info!(
        session_id = %id,
        from = session.state.as_str(),
        to = updated.state.as_str(),
        user_id = %auth.user_id,
        "Dial session transition"
    );
    state.hub.emit(
        auth.tenant_id,
        EntityKind::DialSession,
        ChangeAction::Updated,
        updated.id,
        &updated,
    );

    Ok(Json(updated))
}

pub async fn pause_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DialSession>> {
    transition(&state, &auth, id, DialSessionState::Paused).await
}

pub async fn resume_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DialSession>> {
    transition(&state, &auth, id, DialSessionState::Running).await
}

/// Cancel a session
///
/// Lines still ringing are hung up by the dialer on its next tick.
pub async fn cancel_session(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DialSession>> {
    transition(&state, &auth, id, DialSessionState::Canceled).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedupe(&[a, b, a, b, a]), vec![a, b]);
    }

    #[test]
    fn test_request_validation() {
        let req = CreateSessionRequest {
            lead_ids: vec![],
            lines: None,
        };
        assert!(req.validate().is_err());

        let req = CreateSessionRequest {
            lead_ids: vec![Uuid::new_v4()],
            lines: Some(11),
        };
        assert!(req.validate().is_err());
    }
}
