/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use dialdesk_api::{app::AppState, config::Config};
/// use dialdesk_shared::events::{instance_id, ChangeHub};
/// use dialdesk_shared::telephony::mock::MockVoiceProvider;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let hub = ChangeHub::new(instance_id("api"));
/// let state = AppState::new(pool, config, hub, Arc::new(MockVoiceProvider::new()));
/// let app = dialdesk_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use dialdesk_shared::auth::middleware::{create_auth_middleware, AuthState};
use dialdesk_shared::events::ChangeHub;
use dialdesk_shared::redis::RedisClient;
use dialdesk_shared::telephony::VoiceProvider;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state, cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,

    pub config: Arc<Config>,

    /// Change-event fan-out to WebSocket clients
    pub hub: ChangeHub,

    pub provider: Arc<dyn VoiceProvider>,

    pub auth: AuthState,

    /// Set when the Redis bridge is enabled; reported by `/health`
    pub redis: Option<RedisClient>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        config: Config,
        hub: ChangeHub,
        provider: Arc<dyn VoiceProvider>,
    ) -> Self {
        let auth = AuthState {
            pool: db.clone(),
            jwt: config.auth.clone(),
        };

        Self {
            db,
            config: Arc::new(config),
            hub,
            provider,
            auth,
            redis: None,
        }
    }

    pub fn with_redis(mut self, redis: RedisClient) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Absolute URL for a provider callback path
    pub fn webhook_url(&self, path: &str) -> String {
        self.config.telephony.webhook_url(path)
    }
}

/// Builds the complete router
///
/// ```text
/// /
/// ├── GET /health                    public
/// ├── /webhooks/...                  provider signature
/// └── /v1/...                        bearer token
///     └── GET /ws                    token in header or ?token=
/// ```
///
/// Layers, innermost first: authentication (on `/v1` only), request
/// tracing, CORS, security headers.
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let webhook_routes = Router::new()
        .route("/voice/status", post(routes::webhooks::voice::status))
        .route("/voice/amd", post(routes::webhooks::voice::amd))
        .route("/voice/recording", post(routes::webhooks::voice::recording))
        .route("/voice/voicemail", post(routes::webhooks::voice::voicemail))
        .route("/voice/transcription", post(routes::webhooks::voice::transcription))
        .route("/voice/inbound", post(routes::webhooks::voice::inbound))
        .route(
            "/voice/inbound/complete",
            post(routes::webhooks::voice::inbound_complete),
        )
        .route("/voice/outbound", post(routes::webhooks::voice::outbound))
        .route("/sms/inbound", post(routes::webhooks::sms::inbound))
        .route("/sms/status", post(routes::webhooks::sms::status));

    let contact_routes = Router::new()
        .route(
            "/",
            get(routes::contacts::list_contacts).post(routes::contacts::create_contact),
        )
        .route("/stats", get(routes::contacts::contact_stats))
        .route(
            "/:id",
            get(routes::contacts::get_contact)
                .patch(routes::contacts::update_contact)
                .delete(routes::contacts::delete_contact),
        )
        .route("/:id/calls", get(routes::contacts::contact_calls))
        .route("/:id/messages", get(routes::contacts::contact_messages));

    let lead_routes = Router::new()
        .route(
            "/",
            get(routes::leads::list_leads).post(routes::leads::create_lead),
        )
        .route("/stats", get(routes::leads::lead_stats))
        .route(
            "/:id",
            get(routes::leads::get_lead)
                .patch(routes::leads::update_lead)
                .delete(routes::leads::delete_lead),
        )
        .route("/:id/convert", post(routes::leads::convert_lead));

    let call_routes = Router::new()
        .route(
            "/",
            get(routes::calls::list_calls).post(routes::calls::create_call),
        )
        .route("/stats", get(routes::calls::call_stats))
        .route(
            "/:id",
            get(routes::calls::get_call)
                .patch(routes::calls::update_call)
                .delete(routes::calls::delete_call),
        )
        .route("/:id/hangup", post(routes::calls::hangup_call));

    let message_routes = Router::new()
        .route(
            "/",
            get(routes::messages::list_messages).post(routes::messages::send_message),
        )
        .route("/:id", get(routes::messages::get_message));

    let voicemail_routes = Router::new()
        .route("/", get(routes::voicemails::list_voicemails))
        .route("/stats", get(routes::voicemails::voicemail_stats))
        .route(
            "/:id",
            get(routes::voicemails::get_voicemail)
                .patch(routes::voicemails::update_voicemail)
                .delete(routes::voicemails::delete_voicemail),
        );

    let recording_routes = Router::new()
        .route("/", get(routes::recordings::list_recordings))
        .route("/stats", get(routes::recordings::recording_stats))
        .route(
            "/:id",
            get(routes::recordings::get_recording).delete(routes::recordings::delete_recording),
        );

    let user_routes = Router::new()
        .route(
            "/",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route("/me", get(routes::users::me))
        .route("/:id", axum::routing::patch(routes::users::update_user));

    let dialer_routes = Router::new()
        .route(
            "/sessions",
            get(routes::dialer::list_sessions).post(routes::dialer::create_session),
        )
        .route("/sessions/:id", get(routes::dialer::get_session))
        .route("/sessions/:id/pause", post(routes::dialer::pause_session))
        .route("/sessions/:id/resume", post(routes::dialer::resume_session))
        .route("/sessions/:id/cancel", post(routes::dialer::cancel_session));

    let authenticated = Router::new()
        .nest("/contacts", contact_routes)
        .nest("/leads", lead_routes)
        .nest("/calls", call_routes)
        .nest("/messages", message_routes)
        .nest("/voicemails", voicemail_routes)
        .nest("/recordings", recording_routes)
        .nest("/users", user_routes)
        .nest("/dialer", dialer_routes)
        .route(
            "/settings",
            get(routes::settings::get_settings).patch(routes::settings::update_settings),
        )
        .route(
            "/tenant",
            get(routes::tenant::get_tenant).patch(routes::tenant::update_tenant),
        )
        .route("/stats/dashboard", get(routes::stats::dashboard))
        .route("/voice/token", get(routes::voice::voice_token))
        .layer(axum::middleware::from_fn(create_auth_middleware(
            state.auth.clone(),
        )));

    // The upgrade request authenticates itself; browsers cannot set headers on it
    let v1_routes = authenticated.route("/ws", get(routes::ws::ws_handler));

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/webhooks", webhook_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    tracing::info_span!(
                        "request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        tenant_id = tracing::field::Empty,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}
