/// Browser voice access token
///
/// ```text
/// GET /v1/voice/token
/// ```
///
/// ```json
/// { "token": "eyJ...", "identity": "agent_5f0c...", "expires_in": 3600 }
/// ```
///
/// The browser SDK registers with the token under the caller's client
/// identity, which is what inbound calls and dialer bridges ring. Returns
/// 503 when the provider API key or voice application is not configured.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use dialdesk_shared::{
    auth::middleware::AuthContext,
    models::user::client_identity,
    telephony::token::{create_voice_token, VoiceToken, DEFAULT_TTL_SECS},
};

pub async fn voice_token(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<VoiceToken>> {
    let identity = client_identity(auth.user_id);
    let token = create_voice_token(&state.config.telephony, &identity, DEFAULT_TTL_SECS)?;

    tracing::debug!(user_id = %auth.user_id, identity = %identity, "Voice token issued");
    Ok(Json(token))
}
