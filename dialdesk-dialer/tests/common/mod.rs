#![allow(dead_code)]

/// Fixtures for dialer integration tests
///
/// Needs PostgreSQL in `DATABASE_URL`; [`Fixture::new`] returns `None`
/// without it and the test returns early.

use dialdesk_dialer::orchestrator::{DialerOrchestrator, OrchestratorConfig, TickSummary};
use dialdesk_shared::{
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    events::ChangeHub,
    models::{
        call::{AnsweredBy, Call, CallStatus, ProviderStatusUpdate},
        dial_session::{CreateDialSession, DialSession},
        lead::{CreateLead, Lead},
        settings::{TenantSettings, UpdateSettings},
        tenant::{CreateTenant, Tenant},
        user::{CreateUser, User, UserRole},
    },
    telephony::{mock::MockVoiceProvider, TelephonyConfig},
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub struct Fixture {
    pub db: PgPool,
    pub provider: MockVoiceProvider,
    pub hub: ChangeHub,
    pub dialer: DialerOrchestrator,
    pub tenant: Tenant,
    pub agent: User,
}

impl Fixture {
    /// Tenant with one agent and a caller id
    pub async fn new() -> Option<Self> {
        Self::with_batch_size(100).await
    }

    /// Like [`Fixture::new`], loading `batch_size` sessions per query
    pub async fn with_batch_size(batch_size: i64) -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let db = create_pool(DatabaseConfig {
            url,
            max_connections: 5,
            ..Default::default()
        })
        .await
        .expect("Failed to connect to test database");
        run_migrations(&db).await.expect("Failed to run migrations");

        let suffix = Uuid::new_v4().simple().to_string();
        let tenant = Tenant::create(
            &db,
            CreateTenant {
                name: format!("Dialer {}", &suffix[..8]),
                slug: format!("d-{}", suffix),
            },
        )
        .await
        .expect("Failed to create tenant");

        let agent = User::create(
            &db,
            CreateUser {
                tenant_id: tenant.id,
                external_id: format!("idp|{}", suffix),
                email: format!("{}@example.com", &suffix[..12]),
                name: Some("Dialer Agent".to_string()),
                role: UserRole::Agent,
            },
        )
        .await
        .expect("Failed to create agent");

        TenantSettings::update(
            &db,
            tenant.id,
            UpdateSettings {
                caller_id: Some(random_phone()),
                amd_enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to configure tenant");

        let provider = MockVoiceProvider::new();
        let hub = ChangeHub::new("dialer-test");
        let dialer = DialerOrchestrator::new(
            db.clone(),
            Arc::new(provider.clone()),
            hub.clone(),
            telephony(),
            OrchestratorConfig {
                poll_interval: Duration::from_millis(10),
                batch_size,
                tenant_id: Some(tenant.id),
            },
        );

        Some(Self {
            db,
            provider,
            hub,
            dialer,
            tenant,
            agent,
        })
    }

    pub async fn settings(&self, update: UpdateSettings) {
        TenantSettings::update(&self.db, self.tenant.id, update)
            .await
            .expect("Failed to update settings");
    }

    pub async fn leads(&self, n: usize) -> Vec<Lead> {
        let mut leads = Vec::with_capacity(n);
        for i in 0..n {
            let lead = Lead::create(
                &self.db,
                self.tenant.id,
                CreateLead {
                    name: format!("Lead {}", i),
                    phone: random_phone(),
                    email: None,
                    source: None,
                    priority: None,
                    assigned_to: None,
                    notes: None,
                },
            )
            .await
            .expect("Failed to create lead");
            leads.push(lead);
        }
        leads
    }

    pub async fn session(&self, lines: i32, leads: &[Lead]) -> DialSession {
        DialSession::create(
            &self.db,
            self.tenant.id,
            CreateDialSession {
                user_id: self.agent.id,
                lines,
                lead_ids: leads.iter().map(|lead| lead.id).collect(),
            },
        )
        .await
        .expect("Failed to create session")
    }

    pub async fn reload(&self, session: &DialSession) -> DialSession {
        DialSession::find_by_id(&self.db, self.tenant.id, session.id)
            .await
            .unwrap()
            .expect("Session disappeared")
    }

    pub async fn calls(&self, session: &DialSession) -> Vec<Call> {
        Call::list_by_session(&self.db, session.id).await.unwrap()
    }

    pub async fn tick(&mut self) -> TickSummary {
        self.dialer.tick().await.expect("Tick failed")
    }

    /// Simulates the provider's status callback for a call
    pub async fn report(&self, call: &Call, status: CallStatus, answered_by: Option<AnsweredBy>) {
        let sid = call
            .provider_call_sid
            .as_deref()
            .expect("Call was never accepted by the provider");
        Call::apply_provider_status(
            &self.db,
            sid,
            &ProviderStatusUpdate {
                status,
                answered_by,
                duration_seconds: None,
            },
        )
        .await
        .unwrap()
        .expect("Unknown call sid");
    }
}

pub fn telephony() -> TelephonyConfig {
    TelephonyConfig {
        api_base: "https://telephony.invalid".to_string(),
        account_sid: "ACtest".to_string(),
        auth_token: "test-token".to_string(),
        api_key_sid: None,
        api_key_secret: None,
        twiml_app_sid: None,
        public_base_url: "https://dialdesk.test".to_string(),
    }
}

/// Random valid US number in E.164 form
pub fn random_phone() -> String {
    const AREA_CODES: [u16; 10] = [201, 212, 303, 312, 404, 415, 503, 617, 702, 818];

    let n = Uuid::new_v4().as_u128();
    let area = AREA_CODES[(n % 10) as usize];
    let exchange = 230 + (n / 10 % 60);
    let line = n / 600 % 10_000;
    format!("+1{}{}{:04}", area, exchange, line)
}
