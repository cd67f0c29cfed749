//! Creates a tenant with its first admin
//!
//! ```bash
//! cargo run -p dialdesk-api --bin dialdesk-provision -- \
//!     --name "Acme Sales" --slug acme \
//!     --admin-email admin@acme.test --admin-subject "idp|admin" \
//!     --caller-id +15550001111 --print-token
//! ```
//!
//! Users authenticate at the identity provider; the admin's `--admin-subject`
//! must match the `sub` claim of their tokens. `--print-token` mints a token
//! with the locally configured secret, which is only useful in development.

use anyhow::Context;
use chrono::Duration;
use clap::Parser;
use dialdesk_api::config::auth_from_env;
use dialdesk_shared::{
    auth::jwt::{create_token, Claims},
    db::{
        migrations::{ensure_database_exists, run_migrations},
        pool::{create_pool, DatabaseConfig},
    },
    models::{
        settings::{TenantSettings, UpdateSettings},
        tenant::{is_valid_slug, CreateTenant, Tenant},
        user::{CreateUser, User, UserRole},
    },
    phone::normalize_e164,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Provision a DialDesk tenant and its first admin")]
struct Args {
    /// Tenant display name
    #[arg(long)]
    name: String,

    /// URL-safe tenant identifier (`[a-z0-9-]`)
    #[arg(long)]
    slug: String,

    #[arg(long)]
    admin_email: String,

    /// Identity-provider subject of the admin
    #[arg(long)]
    admin_subject: String,

    #[arg(long)]
    admin_name: Option<String>,

    /// Number presented on outbound calls and routed to this tenant
    #[arg(long)]
    caller_id: Option<String>,

    /// Print a development token for the admin (valid for 24 hours)
    #[arg(long)]
    print_token: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dialdesk_api=info,dialdesk_shared=info".into()),
        )
        .init();

    let args = Args::parse();

    if !is_valid_slug(&args.slug) {
        anyhow::bail!("Invalid slug {:?}: use lowercase letters, digits and dashes", args.slug);
    }
    let caller_id = args
        .caller_id
        .as_deref()
        .map(normalize_e164)
        .transpose()
        .context("Invalid caller id")?;

    let database = DatabaseConfig::from_env()?;
    ensure_database_exists(&database.url).await?;
    let pool = create_pool(database).await?;
    run_migrations(&pool).await?;

    let tenant = Tenant::create(
        &pool,
        CreateTenant {
            name: args.name.clone(),
            slug: args.slug.clone(),
        },
    )
    .await
    .with_context(|| format!("Failed to create tenant {}", args.slug))?;

    TenantSettings::update(
        &pool,
        tenant.id,
        UpdateSettings {
            caller_id,
            ..Default::default()
        },
    )
    .await
    .context("Failed to store tenant settings")?;

    let admin = User::create(
        &pool,
        CreateUser {
            tenant_id: tenant.id,
            external_id: args.admin_subject.clone(),
            email: args.admin_email.trim().to_lowercase(),
            name: args.admin_name.clone(),
            role: UserRole::Admin,
        },
    )
    .await
    .context("Failed to create admin user")?;

    println!("tenant_id: {}", tenant.id);
    println!("admin_id:  {}", admin.id);

    if args.print_token {
        let jwt = auth_from_env()?;
        let claims = Claims::new(&admin.external_id, &jwt, Duration::hours(24));
        println!("token:     {}", create_token(&claims, &jwt.secret)?);
    }

    pool.close().await;
    Ok(())
}
