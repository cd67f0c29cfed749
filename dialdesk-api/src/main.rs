//! # DialDesk API Server
//!
//! Serves the `/v1` REST API and WebSocket, the provider webhooks and
//! `/health`.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p dialdesk-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use anyhow::Context;
use dialdesk_api::{
    app::{build_router, AppState},
    config::Config,
};
use dialdesk_shared::{
    db::{migrations::run_migrations, pool::create_pool},
    events::{instance_id, ChangeHub},
    redis::{bridge::spawn_subscriber, ChangePublisher, RedisClient},
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dialdesk_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("DialDesk API v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = create_pool(config.database.clone())
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let provider = config
        .provider
        .build(&config.telephony)
        .context("Failed to create the voice provider")?;

    let mut hub = ChangeHub::new(instance_id("api"));

    let redis = match config.redis.clone() {
        Some(redis_config) => {
            let client = RedisClient::new(redis_config)
                .await
                .context("Failed to connect to Redis")?;

            let (tx, rx) = mpsc::unbounded_channel();
            hub = hub.with_outbound(tx);
            ChangePublisher::new(client.clone()).spawn(rx);
            spawn_subscriber(client.clone(), hub.clone());

            Some(client)
        }
        None => {
            tracing::info!("REDIS_URL not set; change events stay in this process");
            None
        }
    };

    let bind_address = config.bind_address();
    let mut state = AppState::new(pool.clone(), config, hub, provider);
    if let Some(client) = redis {
        state = state.with_redis(client);
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!("Listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");

    Ok(())
}
