/// Dashboard statistics
///
/// ```text
/// GET /v1/stats/dashboard?from=&to=
/// ```
///
/// Combines the per-resource stats in one response. The date range applies
/// to calls only and defaults to the last 7 days.

use super::calls::StatsRange;
use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use dialdesk_shared::{
    auth::middleware::AuthContext,
    models::{
        call::{Call, CallStats},
        contact::{Contact, ContactStats},
        lead::{Lead, LeadStats},
        recording::{Recording, RecordingStats},
        voicemail::{Voicemail, VoicemailStats},
    },
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub calls: CallStats,
    pub contacts: ContactStats,
    pub leads: LeadStats,
    pub voicemails: VoicemailStats,
    pub recordings: RecordingStats,
}

pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(range): Query<StatsRange>,
) -> ApiResult<Json<DashboardStats>> {
    let (from, to) = range.resolve(Utc::now())?;
    let db = &state.db;
    let tenant_id = auth.tenant_id;

    let (calls, contacts, leads, voicemails, recordings) = tokio::try_join!(
        Call::stats(db, tenant_id, from, to),
        Contact::stats(db, tenant_id),
        Lead::stats(db, tenant_id),
        Voicemail::stats(db, tenant_id),
        Recording::stats(db, tenant_id),
    )?;

    Ok(Json(DashboardStats {
        calls,
        contacts,
        leads,
        voicemails,
        recordings,
    }))
}
