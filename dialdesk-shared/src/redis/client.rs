/// Redis client wrapper
///
/// Holds a `ConnectionManager` for commands (publishing change events,
/// health checks) and the raw `redis::Client` for opening dedicated pub/sub
/// connections, which the manager cannot multiplex.
///
/// Redis is optional for DialDesk: without `REDIS_URL` the API serves
/// WebSocket updates from its own process only.
///
/// # Example
///
/// ```no_run
/// use dialdesk_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// if let Some(config) = RedisConfig::from_env_optional() {
///     let client = RedisClient::new(config).await?;
///     assert!(client.ping().await?);
/// }
/// # Ok(())
/// # }
/// ```

use redis::aio::{ConnectionManager, PubSub};
use redis::{Client, RedisError};
use serde::Deserialize;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedisClientError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis command error: {0}")]
    CommandError(String),

    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    #[error("Redis health check failed: {0}")]
    HealthCheckFailed(String),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            RedisClientError::ConnectionError(err.to_string())
        } else {
            RedisClientError::CommandError(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Format: redis://[username:password@]host:port[/db]
    pub url: String,

    pub connection_timeout_secs: u64,

    pub command_timeout_secs: u64,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection_timeout_secs: 5,
            command_timeout_secs: 5,
        }
    }

    /// Loads the configuration from the environment
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: connection URL (required)
    /// - `REDIS_CONNECTION_TIMEOUT_SECS`: default 5
    /// - `REDIS_COMMAND_TIMEOUT_SECS`: default 5
    pub fn from_env() -> Result<Self, RedisClientError> {
        dotenvy::dotenv().ok();

        let url = env::var("REDIS_URL").map_err(|_| {
            RedisClientError::ConfigError("REDIS_URL environment variable is required".to_string())
        })?;

        let mut config = Self::new(url);

        if let Some(secs) = env::var("REDIS_CONNECTION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.connection_timeout_secs = secs;
        }

        if let Some(secs) = env::var("REDIS_COMMAND_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.command_timeout_secs = secs;
        }

        Ok(config)
    }

    /// Like [`RedisConfig::from_env`], but `None` when `REDIS_URL` is unset or blank
    pub fn from_env_optional() -> Option<Self> {
        dotenvy::dotenv().ok();

        match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => Self::from_env().ok(),
            _ => None,
        }
    }
}

/// Redis client with a shared command connection
#[derive(Clone)]
pub struct RedisClient {
    client: Client,
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails within
    /// `connection_timeout_secs`.
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e)))?;

        let manager = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_secs),
            ConnectionManager::new(client.clone()),
        )
        .await
        .map_err(|_| RedisClientError::ConnectionError("Connection timed out".to_string()))?
        .map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!(url = %sanitize_url(&config.url), "Redis client connected");

        Ok(Self {
            client,
            manager,
            config: Arc::new(config),
        })
    }

    /// Sends PING; `Ok(false)` for an unexpected reply
    pub async fn ping(&self) -> Result<bool, RedisClientError> {
        let mut conn = self.manager.clone();

        let result: Result<String, RedisError> = tokio::time::timeout(
            Duration::from_secs(self.config.command_timeout_secs),
            redis::cmd("PING").query_async(&mut conn),
        )
        .await
        .map_err(|_| RedisClientError::HealthCheckFailed("PING command timed out".to_string()))?;

        match result {
            Ok(pong) if pong == "PONG" => Ok(true),
            Ok(other) => {
                tracing::warn!(reply = %other, "Unexpected Redis PING reply");
                Ok(false)
            }
            Err(e) => Err(RedisClientError::HealthCheckFailed(e.to_string())),
        }
    }

    /// Command connection; reconnects automatically
    pub fn get_connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Opens a dedicated pub/sub connection
    pub async fn pubsub(&self) -> Result<PubSub, RedisClientError> {
        let conn = self.client.get_async_connection().await?;
        Ok(conn.into_pubsub())
    }
}

/// Masks `user:password@` in a Redis URL for logging
pub fn sanitize_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***@{}", &url[..scheme_end + 3], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
