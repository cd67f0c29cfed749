/// Call model and database operations
///
/// One row per call leg that this system knows about: inbound calls routed
/// to agents, outbound calls from the browser, lines placed by the parallel
/// dialer and calls logged by hand. Status is driven by the voice provider's
/// status webhook.
///
/// # Status flow
///
/// ```text
/// queued → ringing → in_progress → completed
///        ↘         ↘ busy | no_answer | failed | canceled
/// ```
///
/// Once a call reaches a terminal status, later (out of order) provider
/// callbacks cannot move it back.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE call_direction AS ENUM ('inbound', 'outbound');
/// CREATE TYPE call_status AS ENUM (
///     'queued', 'ringing', 'in_progress', 'completed', 'busy', 'no_answer', 'failed', 'canceled'
/// );
/// CREATE TYPE answered_by AS ENUM ('unknown', 'human', 'machine');
///
/// CREATE TABLE calls (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     contact_id UUID REFERENCES contacts(id) ON DELETE SET NULL,
///     lead_id UUID REFERENCES leads(id) ON DELETE SET NULL,
///     dial_session_id UUID REFERENCES dial_sessions(id) ON DELETE SET NULL,
///     direction call_direction NOT NULL,
///     from_number VARCHAR(64) NOT NULL,
///     to_number VARCHAR(64) NOT NULL,
///     status call_status NOT NULL DEFAULT 'queued',
///     answered_by answered_by NOT NULL DEFAULT 'unknown',
///     provider_call_sid VARCHAR(64) UNIQUE,
///     duration_seconds INTEGER NOT NULL DEFAULT 0,
///     started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     answered_at TIMESTAMPTZ,
///     ended_at TIMESTAMPTZ,
///     disposition VARCHAR(100),
///     notes TEXT,
///     error_message TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::pagination::{Page, PageParams};
use super::{search_pattern, LabelCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "call_direction", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }
}

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "call_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Queued => "queued",
            CallStatus::Ringing => "ringing",
            CallStatus::InProgress => "in_progress",
            CallStatus::Completed => "completed",
            CallStatus::Busy => "busy",
            CallStatus::NoAnswer => "no_answer",
            CallStatus::Failed => "failed",
            CallStatus::Canceled => "canceled",
        }
    }

    /// Maps a provider `CallStatus` value (`in-progress`, `no-answer`, ...)
    ///
    /// Both hyphenated and underscored spellings are accepted. `initiated`
    /// is the provider's name for a call it has accepted but not yet dialed.
    pub fn from_provider(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "queued" | "initiated" => Some(CallStatus::Queued),
            "ringing" => Some(CallStatus::Ringing),
            "in_progress" | "answered" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "busy" => Some(CallStatus::Busy),
            "no_answer" => Some(CallStatus::NoAnswer),
            "failed" => Some(CallStatus::Failed),
            "canceled" | "cancelled" => Some(CallStatus::Canceled),
            _ => None,
        }
    }

    /// The call has ended and will not change status again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Busy
                | CallStatus::NoAnswer
                | CallStatus::Failed
                | CallStatus::Canceled
        )
    }

    /// The call occupies a line (not yet ended)
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

/// Who picked up, as reported by answering machine detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "answered_by", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnsweredBy {
    Unknown,
    Human,
    Machine,
}

impl AnsweredBy {
    /// Maps a provider `AnsweredBy` value
    ///
    /// `machine_start`, `machine_end_beep`, `machine_end_silence`,
    /// `machine_end_other` and `fax` all count as a machine.
    pub fn from_provider(value: &str) -> Self {
        let value = value.trim().to_ascii_lowercase();
        if value == "human" {
            AnsweredBy::Human
        } else if value.starts_with("machine") || value == "fax" {
            AnsweredBy::Machine
        } else {
            AnsweredBy::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Call {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Agent handling the call
    pub user_id: Option<Uuid>,

    pub contact_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,

    /// Set for lines placed by the parallel dialer
    pub dial_session_id: Option<Uuid>,

    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,
    pub status: CallStatus,
    pub answered_by: AnsweredBy,

    /// Provider call identifier, known once the provider accepted the call
    pub provider_call_sid: Option<String>,

    pub duration_seconds: i32,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub disposition: Option<String>,
    pub notes: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCall {
    pub user_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub dial_session_id: Option<Uuid>,
    pub direction: CallDirection,
    pub from_number: String,
    pub to_number: String,
    pub status: CallStatus,
    pub provider_call_sid: Option<String>,
    pub duration_seconds: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub disposition: Option<String>,
    pub notes: Option<String>,
}

impl CreateCall {
    /// A call about to be placed through the provider
    pub fn outbound(from_number: String, to_number: String) -> Self {
        Self {
            user_id: None,
            contact_id: None,
            lead_id: None,
            dial_session_id: None,
            direction: CallDirection::Outbound,
            from_number,
            to_number,
            status: CallStatus::Queued,
            provider_call_sid: None,
            duration_seconds: None,
            started_at: None,
            disposition: None,
            notes: None,
        }
    }
}

/// Agent-editable fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCall {
    pub disposition: Option<String>,
    pub notes: Option<String>,
    pub contact_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallFilter {
    /// Matches from/to number
    pub q: Option<String>,
    pub status: Option<CallStatus>,
    pub direction: Option<CallDirection>,

    /// Calls started at or after this instant
    pub from: Option<DateTime<Utc>>,

    /// Calls started before this instant
    pub to: Option<DateTime<Utc>>,
}

/// Status callback from the provider
#[derive(Debug, Clone)]
pub struct ProviderStatusUpdate {
    pub status: CallStatus,
    pub answered_by: Option<AnsweredBy>,
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub total: i64,
    pub answered: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallStats {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total: i64,
    pub answered: i64,
    pub answered_human: i64,
    pub answered_machine: i64,
    pub average_talk_seconds: f64,
    pub by_status: Vec<LabelCount>,
    pub by_direction: Vec<LabelCount>,
    pub daily: Vec<DailyCount>,
}

const CALL_COLUMNS: &str = "id, tenant_id, user_id, contact_id, lead_id, dial_session_id, \
                            direction, from_number, to_number, status, answered_by, \
                            provider_call_sid, duration_seconds, started_at, answered_at, \
                            ended_at, disposition, notes, error_message, created_at, updated_at";

const CALL_FILTER: &str = r#"
    tenant_id = $1
    AND ($2::text IS NULL OR from_number ILIKE $2 OR to_number ILIKE $2)
    AND ($3::call_status IS NULL OR status = $3)
    AND ($4::call_direction IS NULL OR direction = $4)
    AND ($5::timestamptz IS NULL OR started_at >= $5)
    AND ($6::timestamptz IS NULL OR started_at < $6)
"#;

impl Call {
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateCall,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Call>(&format!(
            r#"
            INSERT INTO calls
                (tenant_id, user_id, contact_id, lead_id, dial_session_id, direction,
                 from_number, to_number, status, provider_call_sid, duration_seconds,
                 started_at, disposition, notes,
                 ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, 0),
                    COALESCE($12, NOW()), $13, $14,
                    CASE WHEN $9 IN ('completed', 'busy', 'no_answer', 'failed', 'canceled')
                         THEN COALESCE($12, NOW()) + COALESCE($11, 0) * INTERVAL '1 second'
                    END)
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.user_id)
        .bind(data.contact_id)
        .bind(data.lead_id)
        .bind(data.dial_session_id)
        .bind(data.direction)
        .bind(data.from_number)
        .bind(data.to_number)
        .bind(data.status)
        .bind(data.provider_call_sid)
        .bind(data.duration_seconds)
        .bind(data.started_at)
        .bind(data.disposition)
        .bind(data.notes)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Call>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Looks a call up by provider sid
    ///
    /// Not tenant-scoped: used by signed webhooks, which identify the tenant
    /// through the call itself.
    pub async fn find_by_provider_sid(
        pool: &PgPool,
        sid: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Call>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE provider_call_sid = $1"
        ))
        .bind(sid)
        .fetch_optional(pool)
        .await
    }

    /// Lists calls matching `filter`, most recent first
    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        filter: &CallFilter,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let pattern = search_pattern(filter.q.as_deref());

        let items = sqlx::query_as::<_, Call>(&format!(
            r#"
            SELECT {CALL_COLUMNS} FROM calls
            WHERE {CALL_FILTER}
            ORDER BY started_at DESC, id
            LIMIT $7 OFFSET $8
            "#
        ))
        .bind(tenant_id)
        .bind(&pattern)
        .bind(filter.status)
        .bind(filter.direction)
        .bind(filter.from)
        .bind(filter.to)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM calls WHERE {CALL_FILTER}"))
                .bind(tenant_id)
                .bind(&pattern)
                .bind(filter.status)
                .bind(filter.direction)
                .bind(filter.from)
                .bind(filter.to)
                .fetch_one(pool)
                .await?;

        Ok(Page::new(items, params, total))
    }

    /// Call history of one contact
    pub async fn list_by_contact(
        pool: &PgPool,
        tenant_id: Uuid,
        contact_id: Uuid,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let items = sqlx::query_as::<_, Call>(&format!(
            r#"
            SELECT {CALL_COLUMNS} FROM calls
            WHERE tenant_id = $1 AND contact_id = $2
            ORDER BY started_at DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(tenant_id)
        .bind(contact_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM calls WHERE tenant_id = $1 AND contact_id = $2")
                .bind(tenant_id)
                .bind(contact_id)
                .fetch_one(pool)
                .await?;

        Ok(Page::new(items, params, total))
    }

    /// Every call placed by a dial session, oldest first
    pub async fn list_by_session(
        pool: &PgPool,
        dial_session_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Call>(&format!(
            r#"
            SELECT {CALL_COLUMNS} FROM calls
            WHERE dial_session_id = $1
            ORDER BY created_at ASC, id
            "#
        ))
        .bind(dial_session_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateCall,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Call>(&format!(
            r#"
            UPDATE calls SET
                disposition = COALESCE($3, disposition),
                notes = COALESCE($4, notes),
                contact_id = COALESCE($5, contact_id),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(data.disposition)
        .bind(data.notes)
        .bind(data.contact_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM calls WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records the provider sid once the provider accepted the call
    pub async fn set_provider_sid(
        pool: &PgPool,
        id: Uuid,
        sid: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Call>(&format!(
            r#"
            UPDATE calls SET provider_call_sid = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(sid)
        .fetch_optional(pool)
        .await
    }

    /// Applies a provider status callback
    ///
    /// Sets `answered_at` the first time the call is in progress or a human or
    /// machine is detected, and `ended_at` the first time a terminal status
    /// arrives. A terminal status is never overwritten.
    pub async fn apply_provider_status(
        pool: &PgPool,
        sid: &str,
        update: &ProviderStatusUpdate,
    ) -> Result<Option<Self>, sqlx::Error> {
        let answered_by = update
            .answered_by
            .filter(|a| *a != AnsweredBy::Unknown);

        sqlx::query_as::<_, Call>(&format!(
            r#"
            UPDATE calls SET
                status = CASE
                    WHEN status IN ('completed', 'busy', 'no_answer', 'failed', 'canceled')
                        THEN status
                    ELSE $2
                END,
                answered_by = COALESCE($3, answered_by),
                answered_at = CASE
                    WHEN answered_at IS NULL AND ($2 = 'in_progress' OR $3 IS NOT NULL)
                        THEN NOW()
                    ELSE answered_at
                END,
                ended_at = CASE
                    WHEN ended_at IS NULL
                         AND $2 IN ('completed', 'busy', 'no_answer', 'failed', 'canceled')
                        THEN NOW()
                    ELSE ended_at
                END,
                duration_seconds = COALESCE($4, duration_seconds),
                updated_at = NOW()
            WHERE provider_call_sid = $1
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(sid)
        .bind(update.status)
        .bind(answered_by)
        .bind(update.duration_seconds)
        .fetch_optional(pool)
        .await
    }

    /// Marks a call as failed with the provider's error message
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error_message: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Call>(&format!(
            r#"
            UPDATE calls SET
                status = 'failed',
                error_message = $2,
                ended_at = COALESCE(ended_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error_message)
        .fetch_optional(pool)
        .await
    }

    /// Aggregates calls started within `[from, to)`
    pub async fn stats(
        pool: &PgPool,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CallStats, sqlx::Error> {
        let (total, answered, answered_human, answered_machine, average_talk_seconds): (
            i64,
            i64,
            i64,
            i64,
            f64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE answered_at IS NOT NULL),
                COUNT(*) FILTER (WHERE answered_by = 'human'),
                COUNT(*) FILTER (WHERE answered_by = 'machine'),
                COALESCE(AVG(duration_seconds) FILTER (WHERE answered_at IS NOT NULL), 0)::float8
            FROM calls
            WHERE tenant_id = $1 AND started_at >= $2 AND started_at < $3
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;

        let by_status = sqlx::query_as::<_, LabelCount>(
            r#"
            SELECT status::text AS label, COUNT(*) AS count
            FROM calls
            WHERE tenant_id = $1 AND started_at >= $2 AND started_at < $3
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        let by_direction = sqlx::query_as::<_, LabelCount>(
            r#"
            SELECT direction::text AS label, COUNT(*) AS count
            FROM calls
            WHERE tenant_id = $1 AND started_at >= $2 AND started_at < $3
            GROUP BY direction
            ORDER BY direction
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        let daily = sqlx::query_as::<_, DailyCount>(
            r#"
            SELECT
                (started_at AT TIME ZONE 'UTC')::date AS day,
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE answered_at IS NOT NULL) AS answered
            FROM calls
            WHERE tenant_id = $1 AND started_at >= $2 AND started_at < $3
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;

        Ok(CallStats {
            from,
            to,
            total,
            answered,
            answered_human,
            answered_machine,
            average_talk_seconds,
            by_status,
            by_direction,
            daily,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_provider() {
        assert_eq!(CallStatus::from_provider("in-progress"), Some(CallStatus::InProgress));
        assert_eq!(CallStatus::from_provider("no-answer"), Some(CallStatus::NoAnswer));
        assert_eq!(CallStatus::from_provider("no_answer"), Some(CallStatus::NoAnswer));
        assert_eq!(CallStatus::from_provider("initiated"), Some(CallStatus::Queued));
        assert_eq!(CallStatus::from_provider("Completed"), Some(CallStatus::Completed));
        assert_eq!(CallStatus::from_provider("exploded"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [
            CallStatus::Completed,
            CallStatus::Busy,
            CallStatus::NoAnswer,
            CallStatus::Failed,
            CallStatus::Canceled,
        ] {
            assert!(status.is_terminal(), "{status:?}");
            assert!(!status.is_live());
        }
        for status in [CallStatus::Queued, CallStatus::Ringing, CallStatus::InProgress] {
            assert!(status.is_live(), "{status:?}");
        }
    }

    #[test]
    fn test_answered_by_from_provider() {
        assert_eq!(AnsweredBy::from_provider("human"), AnsweredBy::Human);
        assert_eq!(AnsweredBy::from_provider("machine_start"), AnsweredBy::Machine);
        assert_eq!(AnsweredBy::from_provider("machine_end_beep"), AnsweredBy::Machine);
        assert_eq!(AnsweredBy::from_provider("fax"), AnsweredBy::Machine);
        assert_eq!(AnsweredBy::from_provider("unknown"), AnsweredBy::Unknown);
        assert_eq!(AnsweredBy::from_provider(""), AnsweredBy::Unknown);
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&CallStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(serde_json::to_string(&CallStatus::NoAnswer).unwrap(), "\"no_answer\"");
        assert_eq!(CallStatus::NoAnswer.as_str(), "no_answer");
    }

    #[test]
    fn test_create_call_outbound() {
        let call = CreateCall::outbound("+14155550100".into(), "+14155552671".into());
        assert_eq!(call.direction, CallDirection::Outbound);
        assert_eq!(call.status, CallStatus::Queued);
        assert!(call.provider_call_sid.is_none());
    }
}
