/// SMS endpoints
///
/// - `GET  /v1/messages?contact_id=&q=` - List, newest first
/// - `POST /v1/messages` - Send through the provider
/// - `GET  /v1/messages/:id` - Get
///
/// Delivery updates arrive on `/webhooks/sms/status` and reach clients as
/// `message` change events.

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
use dialdesk_shared::{
    auth::middleware::AuthContext,
    events::{ChangeAction, EntityKind},
    models::{
        call::CallDirection,
        contact::Contact,
        message::{CreateMessage, Message, MessageFilter, MessageStatus},
        pagination::{Page, PageParams},
        settings::TenantSettings,
    },
    telephony::SendSmsRequest,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    /// Recipient; may be omitted when `contact_id` is given
    pub to: Option<String>,

    pub contact_id: Option<Uuid>,

    /// The provider splits long bodies into segments
    #[validate(length(min = 1, max = 1600, message = "Body must be 1-1600 characters"))]
    pub body: String,
}

pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
    Query(filter): Query<MessageFilter>,
) -> ApiResult<Json<Page<Message>>> {
    let page = Message::list(&state.db, auth.tenant_id, &filter, &params).await?;
    Ok(Json(page))
}

pub async fn get_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Message>> {
    let message = Message::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    Ok(Json(message))
}

/// Send an SMS from the tenant caller id
///
/// ```text
/// POST /v1/messages
///
/// { "to": "+14155552671", "body": "Running 5 minutes late" }
/// ```
///
/// The message is stored as `queued` first. If the provider rejects it the
/// row is marked `failed` and the request fails with 502; the stored row is
/// still visible in the list.
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    validate(&req)?;

    let contact = match req.contact_id {
        Some(id) => Some(
            Contact::find_by_id(&state.db, auth.tenant_id, id)
                .await?
                .ok_or_else(|| ApiError::invalid_field("contact_id", "Unknown contact"))?,
        ),
        None => None,
    };

    let to = match (&req.to, &contact) {
        (Some(to), _) => normalize_phone("to", to)?,
        (None, Some(contact)) => contact.phone.clone(),
        (None, None) => return Err(ApiError::invalid_field("to", "Recipient is required")),
    };

    let contact_id = match contact {
        Some(contact) => Some(contact.id),
        None => Contact::find_by_phone(&state.db, auth.tenant_id, &to)
            .await?
            .map(|c| c.id),
    };

    let settings = TenantSettings::get_or_create(&state.db, auth.tenant_id).await?;
    let from = settings.caller_id.ok_or_else(|| {
        ApiError::BadRequest("No caller id is configured for this tenant".to_string())
    })?;

    let message = Message::create(
        &state.db,
        auth.tenant_id,
        CreateMessage {
            user_id: Some(auth.user_id),
            contact_id,
            direction: CallDirection::Outbound,
            from_number: from.clone(),
            to_number: to.clone(),
            body: req.body.clone(),
            status: MessageStatus::Queued,
            provider_message_sid: None,
        },
    )
    .await?;

    let request = SendSmsRequest {
        to,
        from,
        body: req.body,
        status_callback: Some(state.webhook_url("/webhooks/sms/status")),
    };

    match state.provider.send_sms(&request).await {
        Ok(resource) => {
            let status =
                MessageStatus::from_provider(&resource.status).unwrap_or(MessageStatus::Queued);
            let message = Message::mark_sent(&state.db, message.id, &resource.sid, status)
                .await?
                .ok_or_else(|| ApiError::not_found("Message"))?;

            tracing::info!(message_id = %message.id, message_sid = %resource.sid, "SMS sent");
            state.hub.emit(
                auth.tenant_id,
                EntityKind::Message,
                ChangeAction::Created,
                message.id,
                &message,
            );

            Ok((StatusCode::CREATED, Json(message)))
        }
        Err(e) => {
            if let Some(failed) = Message::mark_failed(&state.db, message.id, &e.to_string()).await? {
                state.hub.emit(
                    auth.tenant_id,
                    EntityKind::Message,
                    ChangeAction::Created,
                    failed.id,
                    &failed,
                );
            }
            Err(e.into())
        }
    }
}
