/// Dialer configuration
///
/// # Environment Variables
///
/// - `DIALER_POLL_INTERVAL_MS`: time between ticks (default 1000)
/// - `DIALER_BATCH_SIZE`: sessions claimed and reconciled per tick (default 50)
/// - `DIALER_TENANT_ID`: dial only for this tenant (default: all tenants)
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: see [`DatabaseConfig::from_env`]
/// - `TELEPHONY_PROVIDER`, `TELEPHONY_*`, `PUBLIC_BASE_URL`: see [`TelephonyConfig::from_env`]
/// - `REDIS_URL`: optional; without it session and call changes reach
///   clients only after a refresh

use dialdesk_shared::db::pool::DatabaseConfig;
use dialdesk_shared::redis::RedisConfig;
use dialdesk_shared::telephony::{ProviderKind, TelephonyConfig};
use std::env;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DialerConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub tenant_id: Option<Uuid>,
    pub database: DatabaseConfig,
    pub telephony: TelephonyConfig,
    pub provider: ProviderKind,
    pub redis: Option<RedisConfig>,
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a number, got {:?}", name, value)),
        _ => Ok(default),
    }
}

impl DialerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let poll_ms: u64 = env_number("DIALER_POLL_INTERVAL_MS", 1000)?;
        let batch_size: i64 = env_number("DIALER_BATCH_SIZE", 50)?;

        if poll_ms == 0 {
            anyhow::bail!("DIALER_POLL_INTERVAL_MS must be greater than zero");
        }
        if batch_size < 1 {
            anyhow::bail!("DIALER_BATCH_SIZE must be at least 1");
        }

        let tenant_id = match env::var("DIALER_TENANT_ID") {
            Ok(value) if !value.trim().is_empty() => Some(
                Uuid::parse_str(value.trim())
                    .map_err(|_| anyhow::anyhow!("DIALER_TENANT_ID must be a UUID"))?,
            ),
            _ => None,
        };

        Ok(Self {
            poll_interval: Duration::from_millis(poll_ms),
            batch_size,
            tenant_id,
            database: DatabaseConfig::from_env()?,
            telephony: TelephonyConfig::from_env()?,
            provider: ProviderKind::from_env()?,
            redis: RedisConfig::from_env_optional(),
        })
    }
}
