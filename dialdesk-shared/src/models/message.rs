/// SMS message model and database operations
///
/// Outbound messages are inserted as `queued` before the provider is
/// called, then updated with the provider sid and delivery status. Inbound
/// messages arrive through the SMS webhook already `received`.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE message_status AS ENUM ('queued', 'sent', 'delivered', 'failed', 'received');
///
/// CREATE TABLE messages (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     contact_id UUID REFERENCES contacts(id) ON DELETE SET NULL,
///     direction call_direction NOT NULL,
///     from_number VARCHAR(64) NOT NULL,
///     to_number VARCHAR(64) NOT NULL,
///     body TEXT NOT NULL,
///     status message_status NOT NULL DEFAULT 'queued',
///     provider_message_sid VARCHAR(64) UNIQUE,
///     error_message TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::call::CallDirection;
use super::pagination::{Page, PageParams};
use super::search_pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
    Received,
}

impl MessageStatus {
    /// Maps a provider `MessageStatus` value
    ///
    /// The provider has more intermediate states than we track; they fold
    /// into the nearest one here.
    pub fn from_provider(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accepted" | "scheduled" | "queued" | "sending" => Some(MessageStatus::Queued),
            "sent" => Some(MessageStatus::Sent),
            "delivered" | "read" => Some(MessageStatus::Delivered),
            "failed" | "undelivered" | "canceled" => Some(MessageStatus::Failed),
            "receiving" | "received" => Some(MessageStatus::Received),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,
    pub body: String,
    pub status: MessageStatus,
    pub provider_message_sid: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub user_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,
    pub body: String,
    pub status: MessageStatus,
    pub provider_message_sid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFilter {
    pub contact_id: Option<Uuid>,

    /// Matches body and numbers
    pub q: Option<String>,
}

const MESSAGE_COLUMNS: &str = "id, tenant_id, user_id, contact_id, direction, from_number, \
                               to_number, body, status, provider_message_sid, error_message, \
                               created_at, updated_at";

const MESSAGE_FILTER: &str = r#"
    tenant_id = $1
    AND ($2::uuid IS NULL OR contact_id = $2)
    AND ($3::text IS NULL OR body ILIKE $3 OR from_number ILIKE $3 OR to_number ILIKE $3)
"#;

impl Message {
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateMessage,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages
                (tenant_id, user_id, contact_id, direction, from_number, to_number, body,
                 status, provider_message_sid)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.user_id)
        .bind(data.contact_id)
        .bind(data.direction)
        .bind(data.from_number)
        .bind(data.to_number)
        .bind(data.body)
        .bind(data.status)
        .bind(data.provider_message_sid)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Lists messages, newest first
    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        filter: &MessageFilter,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let pattern = search_pattern(filter.q.as_deref());

        let items = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE {MESSAGE_FILTER}
            ORDER BY created_at DESC, id
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(tenant_id)
        .bind(filter.contact_id)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM messages WHERE {MESSAGE_FILTER}"))
                .bind(tenant_id)
                .bind(filter.contact_id)
                .bind(&pattern)
                .fetch_one(pool)
                .await?;

        Ok(Page::new(items, params, total))
    }

    /// Stores the provider's answer to a send request
    pub async fn mark_sent(
        pool: &PgPool,
        id: Uuid,
        sid: &str,
        status: MessageStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages SET provider_message_sid = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(sid)
        .bind(status)
        .fetch_optional(pool)
        .await
    }

    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error_message: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error_message)
        .fetch_optional(pool)
        .await
    }

    /// Applies a provider delivery callback
    ///
    /// A `delivered` or `failed` message is final and is left unchanged.
    pub async fn update_status_by_sid(
        pool: &PgPool,
        sid: &str,
        status: MessageStatus,
        error_message: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE messages SET
                status = CASE WHEN status IN ('delivered', 'failed') THEN status ELSE $2 END,
                error_message = CASE WHEN status IN ('delivered', 'failed')
                    THEN error_message ELSE COALESCE($3, error_message) END,
                updated_at = NOW()
            WHERE provider_message_sid = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(sid)
        .bind(status)
        .bind(error_message)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_provider() {
        assert_eq!(MessageStatus::from_provider("accepted"), Some(MessageStatus::Queued));
        assert_eq!(MessageStatus::from_provider("sent"), Some(MessageStatus::Sent));
        assert_eq!(MessageStatus::from_provider("undelivered"), Some(MessageStatus::Failed));
        assert_eq!(MessageStatus::from_provider("received"), Some(MessageStatus::Received));
        assert_eq!(MessageStatus::from_provider("teleported"), None);
    }
}
