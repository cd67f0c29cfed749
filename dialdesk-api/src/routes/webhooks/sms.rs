/// SMS webhooks
///
/// - `POST /webhooks/sms/inbound` - Message received on a tenant number
/// - `POST /webhooks/sms/status` - Delivery status of a sent message

use super::{SignedForm, Twiml};
use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, http::StatusCode};
use dialdesk_shared::{
    events::{ChangeAction, EntityKind},
    models::{
        call::CallDirection,
        contact::Contact,
        message::{CreateMessage, Message, MessageStatus},
        settings::TenantSettings,
    },
    phone::normalize_lenient,
    telephony::twiml::VoiceResponse,
};

/// Stores an inbound message; the empty response sends no reply
pub async fn inbound(State(state): State<AppState>, form: SignedForm) -> ApiResult<Twiml> {
    let sid = form.require("MessageSid")?;
    let from = normalize_lenient(form.require("From")?);
    let to = normalize_lenient(form.require("To")?);

    let Some(settings) = TenantSettings::find_by_caller_id(&state.db, &to).await? else {
        tracing::warn!(to = %to, "Inbound message to an unassigned number");
        return Ok(VoiceResponse::new().into());
    };
    let tenant_id = settings.tenant_id;

    let contact_id = Contact::find_by_phone(&state.db, tenant_id, &from)
        .await?
        .map(|contact| contact.id);

    let message = Message::create(
        &state.db,
        tenant_id,
        CreateMessage {
            user_id: None,
            contact_id,
            direction: CallDirection::Inbound,
            from_number: from,
            to_number: to,
            body: form.get("Body").unwrap_or_default().to_string(),
            status: MessageStatus::Received,
            provider_message_sid: Some(sid.to_string()),
        },
    )
    .await?;

    tracing::info!(message_id = %message.id, tenant_id = %tenant_id, "Inbound message");
    state
        .hub
        .emit(tenant_id, EntityKind::Message, ChangeAction::Created, message.id, &message);

    Ok(VoiceResponse::new().into())
}

/// Delivery status callback
pub async fn status(State(state): State<AppState>, form: SignedForm) -> ApiResult<StatusCode> {
    let sid = form.require("MessageSid")?;
    let raw_status = form.require("MessageStatus")?;

    let Some(status) = MessageStatus::from_provider(raw_status) else {
        tracing::debug!(message_sid = %sid, status = %raw_status, "Ignoring message status");
        return Ok(StatusCode::NO_CONTENT);
    };

    let error_message = form.get("ErrorMessage").or_else(|| form.get("ErrorCode"));

    match Message::update_status_by_sid(&state.db, sid, status, error_message).await? {
        Some(message) => {
            tracing::debug!(message_id = %message.id, status = ?message.status, "Message status updated");
            state.hub.emit(
                message.tenant_id,
                EntityKind::Message,
                ChangeAction::Updated,
                message.id,
                &message,
            );
        }
        None => tracing::warn!(message_sid = %sid, "Status callback for unknown message"),
    }

    Ok(StatusCode::NO_CONTENT)
}
