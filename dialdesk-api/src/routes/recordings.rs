/// Call recording endpoints
///
/// Recordings are created by the provider's recording webhook; the API only
/// reads and deletes them.
///
/// - `GET    /v1/recordings?call_id=` - List
/// - `GET    /v1/recordings/stats` - Count and total duration
/// - `GET    /v1/recordings/:id` - Get
/// - `DELETE /v1/recordings/:id` - Delete (admin)

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
    events::EntityKind,
    models::{
        pagination::{Page, PageParams},
        recording::{Recording, RecordingFilter, RecordingStats},
        user::UserRole,
    },
};
use uuid::Uuid;

pub async fn list_recordings(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
    Query(filter): Query<RecordingFilter>,
) -> ApiResult<Json<Page<Recording>>> {
    let page = Recording::list(&state.db, auth.tenant_id, &filter, &params).await?;
    Ok(Json(page))
}

pub async fn recording_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<RecordingStats>> {
    Ok(Json(Recording::stats(&state.db, auth.tenant_id).await?))
}

pub async fn get_recording(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Recording>> {
    let recording = Recording::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recording"))?;
    Ok(Json(recording))
}

/// Delete the recording row
///
/// The media stays with the provider; this only removes DialDesk's
/// reference to it.
pub async fn delete_recording(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_role(&auth, UserRole::Admin)?;

    if !Recording::delete(&state.db, auth.tenant_id, id).await? {
        return Err(ApiError::not_found("Recording"));
    }

    tracing::info!(recording_id = %id, user_id = %auth.user_id, "Recording deleted");
    state
        .hub
        .emit_deleted(auth.tenant_id, EntityKind::Recording, id);

    Ok(StatusCode::NO_CONTENT)
}
