/// Call recordings delivered by the provider's recording callback
///
/// The provider may deliver the same recording callback more than once, so
/// [`Recording::upsert`] is keyed on the provider recording sid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::pagination::{Page, PageParams};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recording {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub call_id: Uuid,
    pub provider_recording_sid: String,
    pub url: String,
    pub duration_seconds: i32,

    /// Provider recording status (`completed`, `absent`, `failed`)
    pub status: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecording {
    pub call_id: Uuid,
    pub provider_recording_sid: String,
    pub url: String,
    pub duration_seconds: i32,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingFilter {
    pub call_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingStats {
    pub total: i64,
    pub total_duration_seconds: i64,
}

const RECORDING_COLUMNS: &str = "id, tenant_id, call_id, provider_recording_sid, url, \
                                 duration_seconds, status, created_at, updated_at";

impl Recording {
    /// Inserts a recording or refreshes it if the sid is already known
    pub async fn upsert(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateRecording,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Recording>(&format!(
            r#"
            INSERT INTO recordings
                (tenant_id, call_id, provider_recording_sid, url, duration_seconds, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider_recording_sid) DO UPDATE SET
                url = EXCLUDED.url,
                duration_seconds = EXCLUDED.duration_seconds,
                status = EXCLUDED.status,
                updated_at = NOW()
            RETURNING {RECORDING_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.call_id)
        .bind(data.provider_recording_sid)
        .bind(data.url)
        .bind(data.duration_seconds)
        .bind(data.status)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Recording>(&format!(
            "SELECT {RECORDING_COLUMNS} FROM recordings WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        filter: &RecordingFilter,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let items = sqlx::query_as::<_, Recording>(&format!(
            r#"
            SELECT {RECORDING_COLUMNS} FROM recordings
            WHERE tenant_id = $1 AND ($2::uuid IS NULL OR call_id = $2)
            ORDER BY created_at DESC, id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(tenant_id)
        .bind(filter.call_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recordings WHERE tenant_id = $1 AND ($2::uuid IS NULL OR call_id = $2)",
        )
        .bind(tenant_id)
        .bind(filter.call_id)
        .fetch_one(pool)
        .await?;

        Ok(Page::new(items, params, total))
    }

    pub async fn delete(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM recordings WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn stats(pool: &PgPool, tenant_id: Uuid) -> Result<RecordingStats, sqlx::Error> {
        let (total, total_duration_seconds): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(duration_seconds), 0)::int8
            FROM recordings
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;

        Ok(RecordingStats {
            total,
            total_duration_seconds,
        })
    }
}
