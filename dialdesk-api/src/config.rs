/// Configuration for the API server
///
/// Loaded from environment variables (and `.env` in development).
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default `0.0.0.0:8080`)
/// - `API_CORS_ORIGINS`: comma-separated origins, `*` for any (default `*`)
/// - `API_PRODUCTION`: enables HSTS (default `false`)
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: see [`DatabaseConfig::from_env`]
/// - `AUTH_JWT_SECRET`, `AUTH_ISSUER`, `AUTH_AUDIENCE`: identity-provider tokens
/// - `TELEPHONY_PROVIDER`: `http` (default) or `mock`
/// - `TELEPHONY_*`, `PUBLIC_BASE_URL`: see [`TelephonyConfig::from_env`]
/// - `WEBHOOK_VALIDATE_SIGNATURES`: verify provider signatures (default `true`)
/// - `REDIS_URL`: optional change-event bridge
///
/// # Example
///
/// ```no_run
/// use dialdesk_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Listening on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use dialdesk_shared::auth::jwt::{JwtConfig, MIN_SECRET_LEN};
use dialdesk_shared::db::pool::DatabaseConfig;
use dialdesk_shared::redis::RedisConfig;
use dialdesk_shared::telephony::TelephonyConfig;
pub use dialdesk_shared::telephony::ProviderKind;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub auth: JwtConfig,
    pub telephony: TelephonyConfig,
    pub provider: ProviderKind,

    /// `None` runs without cross-process change events
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Production mode (HSTS)
    pub production: bool,

    /// Reject provider webhooks without a valid signature
    pub validate_webhook_signatures: bool,
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Loads the identity-provider token settings
///
/// Shared with the provisioning binary, which mints tokens for local use.
pub fn auth_from_env() -> anyhow::Result<JwtConfig> {
    let secret = env::var("AUTH_JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("AUTH_JWT_SECRET environment variable is required"))?;

    if secret.len() < MIN_SECRET_LEN {
        anyhow::bail!(
            "AUTH_JWT_SECRET must be at least {} characters long",
            MIN_SECRET_LEN
        );
    }

    let issuer = env::var("AUTH_ISSUER")
        .map_err(|_| anyhow::anyhow!("AUTH_ISSUER environment variable is required"))?;
    let audience = env::var("AUTH_AUDIENCE")
        .map_err(|_| anyhow::anyhow!("AUTH_AUDIENCE environment variable is required"))?;

    Ok(JwtConfig {
        secret,
        issuer,
        audience,
    })
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails if a required variable is missing, a number does not parse, or
    /// the token secret is shorter than [`MIN_SECRET_LEN`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let cors_origins = env::var("API_CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let provider = ProviderKind::from_env()?;

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production: env_bool("API_PRODUCTION", false),
                validate_webhook_signatures: env_bool("WEBHOOK_VALIDATE_SIGNATURES", true),
            },
            database: DatabaseConfig::from_env()?,
            auth: auth_from_env()?,
            telephony: TelephonyConfig::from_env()?,
            provider,
            redis: RedisConfig::from_env_optional(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
