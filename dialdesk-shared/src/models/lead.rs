/// Lead model and database operations
///
/// Leads are prospects an agent works through, manually or with the
/// parallel dialer. A lead can be converted into a contact.
///
/// # Status flow
///
/// ```text
/// new → contacted → qualified → converted
///                             → lost
/// ```
///
/// The dialer moves `new → contacted` the first time a call to the lead is
/// answered. Every other transition is made by an agent; the API does not
/// enforce an order beyond that.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE lead_status AS ENUM ('new', 'contacted', 'qualified', 'converted', 'lost');
///
/// CREATE TABLE leads (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     contact_id UUID REFERENCES contacts(id) ON DELETE SET NULL,
///     name VARCHAR(255) NOT NULL,
///     phone VARCHAR(20) NOT NULL,
///     email VARCHAR(255),
///     source VARCHAR(100),
///     status lead_status NOT NULL DEFAULT 'new',
///     priority INTEGER NOT NULL DEFAULT 0,
///     assigned_to UUID REFERENCES users(id) ON DELETE SET NULL,
///     call_attempts INTEGER NOT NULL DEFAULT 0,
///     last_called_at TIMESTAMPTZ,
///     notes TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT leads_tenant_phone_key UNIQUE (tenant_id, phone)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::pagination::{Page, PageParams};
use super::{search_pattern, LabelCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lead_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
        }
    }

    /// Closed leads are skipped by the dialer
    pub fn is_closed(&self) -> bool {
        matches!(self, LeadStatus::Converted | LeadStatus::Lost)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Contact created or linked on conversion
    pub contact_id: Option<Uuid>,

    pub name: String,

    /// E.164 phone number
    pub phone: String,

    pub email: Option<String>,
    pub source: Option<String>,
    pub status: LeadStatus,

    /// Higher is dialed first when no explicit order is given
    pub priority: i32,

    pub assigned_to: Option<Uuid>,
    pub call_attempts: i32,
    pub last_called_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateLead {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub source: Option<String>,
    pub priority: Option<i32>,
    pub assigned_to: Option<Uuid>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLead {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub status: Option<LeadStatus>,
    pub priority: Option<i32>,
    pub assigned_to: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadFilter {
    /// Matches name, phone, email and source
    pub q: Option<String>,
    pub status: Option<LeadStatus>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadStats {
    pub total: i64,
    pub by_status: Vec<LabelCount>,
    pub average_call_attempts: f64,
}

const LEAD_COLUMNS: &str = "id, tenant_id, contact_id, name, phone, email, source, status, \
                            priority, assigned_to, call_attempts, last_called_at, notes, \
                            created_at, updated_at";

const LEAD_FILTER: &str = r#"
    tenant_id = $1
    AND ($2::text IS NULL
         OR name ILIKE $2 OR phone ILIKE $2 OR email ILIKE $2 OR source ILIKE $2)
    AND ($3::lead_status IS NULL OR status = $3)
    AND ($4::uuid IS NULL OR assigned_to = $4)
"#;

impl Lead {
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateLead,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Lead>(&format!(
            r#"
            INSERT INTO leads
                (tenant_id, name, phone, email, source, priority, assigned_to, notes)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, 0), $7, $8)
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.name)
        .bind(data.phone)
        .bind(data.email)
        .bind(data.source)
        .bind(data.priority)
        .bind(data.assigned_to)
        .bind(data.notes)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Loads the given leads of a tenant, in the order of `ids`
    ///
    /// Ids that do not exist in the tenant are silently dropped.
    pub async fn find_many(
        pool: &PgPool,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(&format!(
            r#"
            SELECT {LEAD_COLUMNS} FROM leads
            WHERE tenant_id = $1 AND id = ANY($2)
            ORDER BY array_position($2, id)
            "#
        ))
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// Lists leads matching `filter`, highest priority then newest first
    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        filter: &LeadFilter,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let pattern = search_pattern(filter.q.as_deref());

        let items = sqlx::query_as::<_, Lead>(&format!(
            r#"
            SELECT {LEAD_COLUMNS} FROM leads
            WHERE {LEAD_FILTER}
            ORDER BY priority DESC, created_at DESC, id
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(tenant_id)
        .bind(&pattern)
        .bind(filter.status)
        .bind(filter.assigned_to)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM leads WHERE {LEAD_FILTER}"))
                .bind(tenant_id)
                .bind(&pattern)
                .bind(filter.status)
                .bind(filter.assigned_to)
                .fetch_one(pool)
                .await?;

        Ok(Page::new(items, params, total))
    }

    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateLead,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(&format!(
            r#"
            UPDATE leads SET
                name = COALESCE($3, name),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                source = COALESCE($6, source),
                status = COALESCE($7, status),
                priority = COALESCE($8, priority),
                assigned_to = COALESCE($9, assigned_to),
                notes = COALESCE($10, notes),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(data.name)
        .bind(data.phone)
        .bind(data.email)
        .bind(data.source)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.assigned_to)
        .bind(data.notes)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Links the lead to a contact and marks it converted
    pub async fn mark_converted(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(&format!(
            r#"
            UPDATE leads SET contact_id = $3, status = 'converted', updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(contact_id)
        .fetch_optional(pool)
        .await
    }

    /// Bumps the attempt counter when a call to the lead is placed
    pub async fn record_attempt(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(&format!(
            r#"
            UPDATE leads SET
                call_attempts = call_attempts + 1,
                last_called_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Moves a `new` lead to `contacted`; leaves any other status alone
    ///
    /// Returns the lead only if the status actually changed.
    pub async fn mark_contacted(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Lead>(&format!(
            r#"
            UPDATE leads SET status = 'contacted', updated_at = NOW()
            WHERE id = $1 AND status = 'new'
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn stats(pool: &PgPool, tenant_id: Uuid) -> Result<LeadStats, sqlx::Error> {
        let by_status = sqlx::query_as::<_, LabelCount>(
            r#"
            SELECT status::text AS label, COUNT(*) AS count
            FROM leads
            WHERE tenant_id = $1
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;

        let (total, average_call_attempts): (i64, f64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(AVG(call_attempts), 0)::float8
            FROM leads
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;

        Ok(LeadStats {
            total,
            by_status,
            average_call_attempts,
        })
    }
}
