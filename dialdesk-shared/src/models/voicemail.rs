/// Voicemail inbox
///
/// A voicemail is created by the provider's recording callback when an
/// inbound call falls through to the voicemail prompt.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE voicemails (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     call_id UUID REFERENCES calls(id) ON DELETE SET NULL,
///     contact_id UUID REFERENCES contacts(id) ON DELETE SET NULL,
///     from_number VARCHAR(64) NOT NULL,
///     recording_url VARCHAR(1024) NOT NULL,
///     duration_seconds INTEGER NOT NULL DEFAULT 0,
///     transcription TEXT,
///     listened BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::pagination::{Page, PageParams};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Voicemail {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub call_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub from_number: String,
    pub recording_url: String,
    pub duration_seconds: i32,
    pub transcription: Option<String>,
    pub listened: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVoicemail {
    pub call_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub from_number: String,
    pub recording_url: String,
    pub duration_seconds: i32,
    pub transcription: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoicemailFilter {
    pub listened: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoicemailStats {
    pub total: i64,
    pub unlistened: i64,
}

const VOICEMAIL_COLUMNS: &str = "id, tenant_id, call_id, contact_id, from_number, recording_url, \
                                 duration_seconds, transcription, listened, created_at, updated_at";

impl Voicemail {
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateVoicemail,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Voicemail>(&format!(
            r#"
            INSERT INTO voicemails
                (tenant_id, call_id, contact_id, from_number, recording_url, duration_seconds,
                 transcription)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {VOICEMAIL_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.call_id)
        .bind(data.contact_id)
        .bind(data.from_number)
        .bind(data.recording_url)
        .bind(data.duration_seconds)
        .bind(data.transcription)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Voicemail>(&format!(
            "SELECT {VOICEMAIL_COLUMNS} FROM voicemails WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        filter: &VoicemailFilter,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let items = sqlx::query_as::<_, Voicemail>(&format!(
            r#"
            SELECT {VOICEMAIL_COLUMNS} FROM voicemails
            WHERE tenant_id = $1 AND ($2::bool IS NULL OR listened = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(tenant_id)
        .bind(filter.listened)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM voicemails WHERE tenant_id = $1 AND ($2::bool IS NULL OR listened = $2)",
        )
        .bind(tenant_id)
        .bind(filter.listened)
        .fetch_one(pool)
        .await?;

        Ok(Page::new(items, params, total))
    }

    pub async fn set_listened(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        listened: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Voicemail>(&format!(
            r#"
            UPDATE voicemails SET listened = $3, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {VOICEMAIL_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(listened)
        .fetch_optional(pool)
        .await
    }

    /// Stores the transcription of the voicemail left on `call_id`
    pub async fn set_transcription(
        pool: &PgPool,
        tenant_id: Uuid,
        call_id: Uuid,
        transcription: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Voicemail>(&format!(
            r#"
            UPDATE voicemails SET transcription = $3, updated_at = NOW()
            WHERE id = (
                SELECT id FROM voicemails
                WHERE call_id = $1 AND tenant_id = $2
                ORDER BY created_at DESC
                LIMIT 1
            )
            RETURNING {VOICEMAIL_COLUMNS}
            "#
        ))
        .bind(call_id)
        .bind(tenant_id)
        .bind(transcription)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM voicemails WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn stats(pool: &PgPool, tenant_id: Uuid) -> Result<VoicemailStats, sqlx::Error> {
        let (total, unlistened): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT listened)
            FROM voicemails
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;

        Ok(VoicemailStats { total, unlistened })
    }
}
