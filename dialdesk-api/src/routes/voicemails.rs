/// Voicemail endpoints
///
/// - `GET    /v1/voicemails?listened=false` - List, newest first
/// - `GET    /v1/voicemails/stats` - Total and unlistened
/// - `GET    /v1/voicemails/:id` - Get
/// - `PATCH  /v1/voicemails/:id` - `{ "listened": true }`
/// - `DELETE /v1/voicemails/:id` - Delete

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
    auth::middleware::AuthContext,
    events::{ChangeAction, EntityKind},
    models::{
        pagination::{Page, PageParams},
        voicemail::{Voicemail, VoicemailFilter, VoicemailStats},
    },
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UpdateVoicemailRequest {
    pub listened: bool,
}

pub async fn list_voicemails(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
    Query(filter): Query<VoicemailFilter>,
) -> ApiResult<Json<Page<Voicemail>>> {
    let page = Voicemail::list(&state.db, auth.tenant_id, &filter, &params).await?;
    Ok(Json(page))
}

pub async fn voicemail_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<VoicemailStats>> {
    Ok(Json(Voicemail::stats(&state.db, auth.tenant_id).await?))
}

pub async fn get_voicemail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Voicemail>> {
    let voicemail = Voicemail::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Voicemail"))?;
    Ok(Json(voicemail))
}

/// Mark a voicemail listened or unlistened
pub async fn update_voicemail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVoicemailRequest>,
) -> ApiResult<Json<Voicemail>> {
    let voicemail = Voicemail::set_listened(&state.db, auth.tenant_id, id, req.listened)
        .await?
        .ok_or_else(|| ApiError::not_found("Voicemail"))?;

    state.hub.emit(
        auth.tenant_id,
        EntityKind::Voicemail,
        ChangeAction::Updated,
        voicemail.id,
        &voicemail,
    );

    Ok(Json(voicemail))
}

pub async fn delete_voicemail(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !Voicemail::delete(&state.db, auth.tenant_id, id).await? {
        return Err(ApiError::not_found("Voicemail"));
    }

    state
        .hub
        .emit_deleted(auth.tenant_id, EntityKind::Voicemail, id);

    Ok(StatusCode::NO_CONTENT)
}
