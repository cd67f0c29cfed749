/// Per-tenant telephony settings
///
/// Every tenant has exactly one settings row. It is created with defaults the
/// first time it is read, so callers never have to handle a missing row.
///
/// `caller_id` is unique across tenants: the inbound voice and SMS webhooks
/// find the tenant by the number that was dialed.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tenant_settings (
///     tenant_id UUID PRIMARY KEY REFERENCES tenants(id) ON DELETE CASCADE,
///     caller_id VARCHAR(20) UNIQUE,
///     dialer_lines INTEGER NOT NULL DEFAULT 3 CHECK (dialer_lines BETWEEN 1 AND 10),
///     amd_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     voicemail_drop_url VARCHAR(1024),
///     recording_enabled BOOLEAN NOT NULL DEFAULT FALSE,
///     timezone VARCHAR(64) NOT NULL DEFAULT 'UTC',
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantSettings {
    pub tenant_id: Uuid,

    /// E.164 number presented on outbound calls and dialed by inbound callers
    pub caller_id: Option<String>,

    /// Default line count for new dial sessions
    pub dialer_lines: i32,

    /// Request answering machine detection on dialer calls
    pub amd_enabled: bool,

    /// Audio played to answering machines before hanging up
    pub voicemail_drop_url: Option<String>,

    pub recording_enabled: bool,

    /// IANA time zone name, for display only
    pub timezone: String,

    pub updated_at: DateTime<Utc>,
}

/// Partial update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettings {
    pub caller_id: Option<String>,
    pub dialer_lines: Option<i32>,
    pub amd_enabled: Option<bool>,
    pub voicemail_drop_url: Option<String>,
    pub recording_enabled: Option<bool>,
    pub timezone: Option<String>,
}

const SETTINGS_COLUMNS: &str = "tenant_id, caller_id, dialer_lines, amd_enabled, \
                                voicemail_drop_url, recording_enabled, timezone, updated_at";

impl TenantSettings {
    /// Returns the tenant's settings, creating the default row if needed
    pub async fn get_or_create(pool: &PgPool, tenant_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, TenantSettings>(&format!(
            r#"
            INSERT INTO tenant_settings (tenant_id)
            VALUES ($1)
            ON CONFLICT (tenant_id) DO UPDATE SET tenant_id = EXCLUDED.tenant_id
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .fetch_one(pool)
        .await
    }

    /// Finds the tenant that owns an E.164 caller id
    pub async fn find_by_caller_id(
        pool: &PgPool,
        caller_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, TenantSettings>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM tenant_settings WHERE caller_id = $1"
        ))
        .bind(caller_id)
        .fetch_optional(pool)
        .await
    }

    /// Applies a partial update
    ///
    /// # Errors
    ///
    /// Fails with a unique violation if `caller_id` belongs to another tenant
    /// and with a check violation if `dialer_lines` is out of range.
    pub async fn update(
        pool: &PgPool,
        tenant_id: Uuid,
        data: UpdateSettings,
    ) -> Result<Self, sqlx::Error> {
        Self::get_or_create(pool, tenant_id).await?;

        sqlx::query_as::<_, TenantSettings>(&format!(
            r#"
            UPDATE tenant_settings SET
                caller_id = COALESCE($2, caller_id),
                dialer_lines = COALESCE($3, dialer_lines),
                amd_enabled = COALESCE($4, amd_enabled),
                voicemail_drop_url = COALESCE($5, voicemail_drop_url),
                recording_enabled = COALESCE($6, recording_enabled),
                timezone = COALESCE($7, timezone),
                updated_at = NOW()
            WHERE tenant_id = $1
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(data.caller_id)
        .bind(data.dialer_lines)
        .bind(data.amd_enabled)
        .bind(data.voicemail_drop_url)
        .bind(data.recording_enabled)
        .bind(data.timezone)
        .fetch_one(pool)
        .await
    }

    /// Whether machine-answered dialer lines get a voicemail drop
    pub fn voicemail_drop_configured(&self) -> bool {
        self.amd_enabled
            && self
                .voicemail_drop_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(amd_enabled: bool, url: Option<&str>) -> TenantSettings {
        TenantSettings {
            tenant_id: Uuid::new_v4(),
            caller_id: Some("+14155550100".to_string()),
            dialer_lines: 3,
            amd_enabled,
            voicemail_drop_url: url.map(str::to_string),
            recording_enabled: false,
            timezone: "UTC".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_voicemail_drop_requires_amd_and_url() {
        assert!(settings(true, Some("https://cdn.example.com/vm.mp3")).voicemail_drop_configured());
        assert!(!settings(false, Some("https://cdn.example.com/vm.mp3")).voicemail_drop_configured());
        assert!(!settings(true, None).voicemail_drop_configured());
        assert!(!settings(true, Some("  ")).voicemail_drop_configured());
    }
}
