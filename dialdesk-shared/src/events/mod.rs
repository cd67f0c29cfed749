/// Change events for live updates
///
/// Every successful mutation produces one [`ChangeEvent`]. Events fan out
/// through the in-process [`ChangeHub`] to WebSocket clients of the same
/// tenant and, when Redis is configured, across processes through the
/// bridge in [`crate::redis::bridge`].
///
/// # Wire format
///
/// ```json
/// {
///   "id": "8a3c...",
///   "tenant_id": "1f0e...",
///   "entity": "call",
///   "action": "updated",
///   "entity_id": "c0ff...",
///   "data": { "status": "in_progress", ... },
///   "origin": "api-6b1d...",
///   "ts": "2025-03-01T12:00:00Z"
/// }
/// ```
///
/// # Example
///
/// ```
/// use dialdesk_shared::events::{ChangeAction, ChangeHub, EntityKind};
/// use uuid::Uuid;
///
/// # async fn example() {
/// let hub = ChangeHub::new("api-1");
/// let mut rx = hub.subscribe();
///
/// let tenant_id = Uuid::new_v4();
/// hub.emit(tenant_id, EntityKind::Contact, ChangeAction::Created, Uuid::new_v4(), &serde_json::json!({}));
///
/// let event = rx.recv().await.unwrap();
/// assert_eq!(event.tenant_id, tenant_id);
/// # }
/// ```

pub mod hub;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use hub::{ChangeHub, DEFAULT_CAPACITY};

/// Kind of record that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Lead,
    Call,
    Message,
    Voicemail,
    Recording,
    Settings,
    DialSession,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Lead => "lead",
            EntityKind::Call => "call",
            EntityKind::Message => "message",
            EntityKind::Voicemail => "voicemail",
            EntityKind::Recording => "recording",
            EntityKind::Settings => "settings",
            EntityKind::DialSession => "dial_session",
            EntityKind::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

/// One mutation of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity: EntityKind,
    pub action: ChangeAction,
    pub entity_id: Uuid,

    /// Record after the change; `null` for deletions
    pub data: JsonValue,

    /// Instance that produced the event, used to drop echoes from Redis
    pub origin: String,

    pub ts: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        origin: impl Into<String>,
        tenant_id: Uuid,
        entity: EntityKind,
        action: ChangeAction,
        entity_id: Uuid,
        data: JsonValue,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            entity,
            action,
            entity_id,
            data,
            origin: origin.into(),
            ts: Utc::now(),
        }
    }
}

/// Generates an instance id of the form `<prefix>-<uuid>`
pub fn instance_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}
