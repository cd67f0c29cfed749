//! # DialDesk Dialer
//!
//! Reconciles parallel-dial sessions against the voice provider.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p dialdesk-dialer
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use anyhow::Context;
use dialdesk_dialer::{
    config::DialerConfig,
    orchestrator::{DialerOrchestrator, OrchestratorConfig},
};
use dialdesk_shared::{
    db::{migrations::run_migrations, pool::create_pool},
    events::{instance_id, ChangeHub},
    redis::{ChangePublisher, RedisClient},
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dialdesk_dialer=debug,dialdesk_shared=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("DialDesk Dialer v{} starting", env!("CARGO_PKG_VERSION"));

    let config = DialerConfig::from_env().context("Failed to load configuration")?;

    let pool = create_pool(config.database.clone())
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let provider = config
        .provider
        .build(&config.telephony)
        .context("Failed to create the voice provider")?;

    // The dialer only produces events; the API processes deliver them
    let mut hub = ChangeHub::new(instance_id("dialer"));
    match config.redis.clone() {
        Some(redis_config) => {
            let client = RedisClient::new(redis_config)
                .await
                .context("Failed to connect to Redis")?;
            let (tx, rx) = mpsc::unbounded_channel();
            hub = hub.with_outbound(tx);
            ChangePublisher::new(client).spawn(rx);
        }
        None => tracing::warn!("REDIS_URL not set; dialer changes will not reach live clients"),
    }

    let orchestrator = DialerOrchestrator::new(
        pool.clone(),
        provider,
        hub,
        config.telephony.clone(),
        OrchestratorConfig {
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
            tenant_id: config.tenant_id,
        },
    );

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    orchestrator.run().await?;

    pool.close().await;
    Ok(())
}
