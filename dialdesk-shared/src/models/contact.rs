/// Contact model and database operations
///
/// Contacts are the tenant's address book. The phone number is stored in
/// E.164 form and is unique within a tenant, which is what lets inbound calls
/// and SMS be linked back to a contact by exact match.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE contacts (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     first_name VARCHAR(100) NOT NULL,
///     last_name VARCHAR(100),
///     phone VARCHAR(20) NOT NULL,
///     email VARCHAR(255),
///     company VARCHAR(255),
///     notes TEXT,
///     tags TEXT[] NOT NULL DEFAULT '{}',
///     created_by UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT contacts_tenant_phone_key UNIQUE (tenant_id, phone)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::pagination::{Page, PageParams};
use super::search_pattern;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,

    /// E.164 phone number
    pub phone: String,

    pub email: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a contact
///
/// `phone` must already be normalized to E.164.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContact {
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub created_by: Option<Uuid>,
}

/// Partial update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// List filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactFilter {
    /// Matches first/last name, phone, email and company
    pub q: Option<String>,

    /// Only contacts carrying this tag
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactStats {
    pub total: i64,
    pub created_last_7_days: i64,
}

const CONTACT_COLUMNS: &str = "id, tenant_id, first_name, last_name, phone, email, company, \
                               notes, tags, created_by, created_at, updated_at";

const CONTACT_FILTER: &str = r#"
    tenant_id = $1
    AND ($2::text IS NULL
         OR first_name ILIKE $2 OR last_name ILIKE $2 OR phone ILIKE $2
         OR email ILIKE $2 OR company ILIKE $2
         OR (first_name || ' ' || COALESCE(last_name, '')) ILIKE $2)
    AND ($3::text IS NULL OR $3 = ANY(tags))
"#;

impl Contact {
    /// Creates a contact
    ///
    /// # Errors
    ///
    /// Fails with a unique violation on `contacts_tenant_phone_key` if the
    /// phone number already exists in the tenant.
    pub async fn create(
        pool: &PgPool,
        tenant_id: Uuid,
        data: CreateContact,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            INSERT INTO contacts
                (tenant_id, first_name, last_name, phone, email, company, notes, tags, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.phone)
        .bind(data.email)
        .bind(data.company)
        .bind(data.notes)
        .bind(data.tags)
        .bind(data.created_by)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Exact lookup by E.164 phone number
    pub async fn find_by_phone(
        pool: &PgPool,
        tenant_id: Uuid,
        phone: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = $1 AND phone = $2"
        ))
        .bind(tenant_id)
        .bind(phone)
        .fetch_optional(pool)
        .await
    }

    /// Lists contacts matching `filter`, newest first
    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        filter: &ContactFilter,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let pattern = search_pattern(filter.q.as_deref());
        let tag = filter.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());

        let items = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS} FROM contacts
            WHERE {CONTACT_FILTER}
            ORDER BY created_at DESC, id
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(tenant_id)
        .bind(&pattern)
        .bind(tag)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM contacts WHERE {CONTACT_FILTER}"))
                .bind(tenant_id)
                .bind(&pattern)
                .bind(tag)
                .fetch_one(pool)
                .await?;

        Ok(Page::new(items, params, total))
    }

    /// Applies a partial update
    ///
    /// Returns `None` if the contact does not exist in the tenant.
    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateContact,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(&format!(
            r#"
            UPDATE contacts SET
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                phone = COALESCE($5, phone),
                email = COALESCE($6, email),
                company = COALESCE($7, company),
                notes = COALESCE($8, notes),
                tags = COALESCE($9, tags),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(data.first_name)
        .bind(data.last_name)
        .bind(data.phone)
        .bind(data.email)
        .bind(data.company)
        .bind(data.notes)
        .bind(data.tags)
        .fetch_optional(pool)
        .await
    }

    /// Deletes a contact; calls, messages and voicemails keep their rows
    /// with the link cleared
    pub async fn delete(pool: &PgPool, tenant_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn stats(pool: &PgPool, tenant_id: Uuid) -> Result<ContactStats, sqlx::Error> {
        let (total, created_last_7_days): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days')
            FROM contacts
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;

        Ok(ContactStats {
            total,
            created_last_7_days,
        })
    }

    /// Full display name
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(last_name: Option<&str>) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            first_name: "Ada".to_string(),
            last_name: last_name.map(str::to_string),
            phone: "+14155552671".to_string(),
            email: None,
            company: None,
            notes: None,
            tags: vec![],
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(contact(Some("Lovelace")).display_name(), "Ada Lovelace");
        assert_eq!(contact(None).display_name(), "Ada");
        assert_eq!(contact(Some("")).display_name(), "Ada");
    }

    #[test]
    fn test_update_contact_default_is_noop() {
        let update = UpdateContact::default();
        assert!(update.phone.is_none());
        assert!(update.tags.is_none());
    }
}
