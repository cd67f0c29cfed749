/// User model and database operations
///
/// Users are provisioned per tenant and linked to the identity provider by
/// `external_id` (the token's `sub` claim). Authentication itself happens at
/// the identity provider; this table only carries the tenant, the role and
/// whether the account may still sign in.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE user_role AS ENUM ('admin', 'agent');
///
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
///     external_id VARCHAR(255) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL,
///     name VARCHAR(255),
///     role user_role NOT NULL DEFAULT 'agent',
///     active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT users_tenant_email_key UNIQUE (tenant_id, email)
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use dialdesk_shared::models::user::{User, CreateUser, UserRole};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, tenant_id: Uuid) -> Result<(), sqlx::Error> {
/// let user = User::create(&pool, CreateUser {
///     tenant_id,
///     external_id: "idp|12345".to_string(),
///     email: "agent@example.com".to_string(),
///     name: Some("Jane Agent".to_string()),
///     role: UserRole::Agent,
/// }).await?;
///
/// let by_subject = User::find_by_external_id(&pool, "idp|12345").await?;
/// assert_eq!(by_subject.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::pagination::{Page, PageParams};

/// Role of a user within their tenant
///
/// Ordered by privilege: `Admin > Agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Manages settings, users and every record in the tenant
    Admin,

    /// Works calls, leads and contacts
    Agent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "agent" => Some(UserRole::Agent),
            _ => None,
        }
    }

    fn level(&self) -> u8 {
        match self {
            UserRole::Admin => 2,
            UserRole::Agent => 1,
        }
    }

    /// Returns true if this role grants at least the privileges of `required`
    pub fn has_permission(&self, required: UserRole) -> bool {
        self.level() >= required.level()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// Tenant user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,

    /// Identity-provider subject (`sub` claim)
    pub external_id: String,

    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,

    /// Inactive users are rejected at authentication and are not rung for
    /// inbound calls
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: Uuid,
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
}

/// Partial update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

const USER_COLUMNS: &str =
    "id, tenant_id, external_id, email, name, role, active, created_at, updated_at";

impl User {
    /// Creates a user
    ///
    /// # Errors
    ///
    /// Fails with a unique violation if the external id is already mapped or
    /// the email is already used within the tenant.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (tenant_id, external_id, email, name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(data.tenant_id)
        .bind(data.external_id)
        .bind(data.email)
        .bind(data.name)
        .bind(data.role)
        .fetch_one(pool)
        .await
    }

    /// Finds a user within a tenant
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
    }

    /// Finds a user by identity-provider subject
    ///
    /// Not tenant-scoped: this is how the tenant of an incoming request is
    /// discovered in the first place.
    pub async fn find_by_external_id(
        pool: &PgPool,
        external_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(pool)
        .await
    }

    /// Finds an active user by id in any tenant
    ///
    /// Used by provider webhooks, which know the user only through its voice
    /// client identity.
    pub async fn find_active(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists users of a tenant, admins first then by name
    pub async fn list(
        pool: &PgPool,
        tenant_id: Uuid,
        params: &PageParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let items = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE tenant_id = $1
            ORDER BY role ASC, name ASC NULLS LAST, email ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(tenant_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(pool)
            .await?;

        Ok(Page::new(items, params, total))
    }

    /// Active users of a tenant, used to ring agents on inbound calls
    pub async fn list_active(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE tenant_id = $1 AND active = TRUE
            ORDER BY created_at ASC
            "#
        ))
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }

    /// Updates name, role or active flag
    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($3, name),
                role = COALESCE($4, role),
                active = COALESCE($5, active),
                updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(tenant_id)
        .bind(data.name)
        .bind(data.role)
        .bind(data.active)
        .fetch_optional(pool)
        .await
    }

    /// Counts active admins, used to refuse demoting the last one
    pub async fn count_active_admins(pool: &PgPool, tenant_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE tenant_id = $1 AND role = 'admin' AND active = TRUE",
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Voice client identity used when registering the browser device
    pub fn client_identity(&self) -> String {
        client_identity(self.id)
    }
}

/// Voice client identity for a user id (`agent_<uuid without dashes>`)
pub fn client_identity(user_id: Uuid) -> String {
    format!("agent_{}", user_id.simple())
}

/// Reverses [`client_identity`], accepting an optional `client:` prefix
pub fn parse_client_identity(identity: &str) -> Option<Uuid> {
    let identity = identity.strip_prefix("client:").unwrap_or(identity);
    let raw = identity.strip_prefix("agent_")?;
    Uuid::parse_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(UserRole::Admin.has_permission(UserRole::Agent));
        assert!(UserRole::Admin.has_permission(UserRole::Admin));
        assert!(UserRole::Agent.has_permission(UserRole::Agent));
        assert!(!UserRole::Agent.has_permission(UserRole::Admin));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(UserRole::parse("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse("agent"), Some(UserRole::Agent));
        assert_eq!(UserRole::parse("owner"), None);
        assert_eq!(UserRole::Agent.as_str(), "agent");
    }

    #[test]
    fn test_client_identity_roundtrip() {
        let id = Uuid::new_v4();
        let identity = client_identity(id);
        assert!(identity.starts_with("agent_"));
        assert!(!identity.contains('-'));
        assert_eq!(parse_client_identity(&identity), Some(id));
        assert_eq!(parse_client_identity(&format!("client:{identity}")), Some(id));
        assert_eq!(parse_client_identity("client:someone"), None);
    }

    #[test]
    fn test_update_user_default() {
        let update = UpdateUser::default();
        assert!(update.name.is_none());
        assert!(update.role.is_none());
        assert!(update.active.is_none());
    }
}
