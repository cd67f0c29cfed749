/// Dialer orchestrator
///
/// Runs the reconcile loop. Every tick it claims pending sessions, then for
/// each active session loads its calls, asks [`plan`] what to do and carries
/// the actions out against the voice provider and the database.
///
/// # Architecture
///
/// ```text
/// DialerOrchestrator
///   ├─> SessionQueue: claim pending sessions, load active ones
///   ├─> plan(): decide actions from the session's calls
///   ├─> VoiceProvider: place, bridge, drop voicemail, hang up
///   └─> ChangeHub: publish call, lead and session changes
/// ```
///
/// Call progress is not pushed to the dialer. The API records provider
/// callbacks in `calls` and the next tick sees them.
///
/// Provider failures never stop a session: a call that could not be placed
/// is marked `failed` and the next lead is dialed on the following tick.
///
/// Claiming is safe with several processes, reconciling is not: run one
/// dialer per deployment, or one per tenant with `tenant_id` set.
///
/// # Example
///
/// ```no_run
/// use dialdesk_dialer::orchestrator::{DialerOrchestrator, OrchestratorConfig};
/// use dialdesk_shared::events::ChangeHub;
/// use dialdesk_shared::telephony::{mock::MockVoiceProvider, TelephonyConfig};
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example(pool: PgPool, telephony: TelephonyConfig) -> anyhow::Result<()> {
/// let orchestrator = DialerOrchestrator::new(
///     pool,
///     Arc::new(MockVoiceProvider::new()),
///     ChangeHub::new("dialer"),
///     telephony,
///     OrchestratorConfig::default(),
/// );
///
/// orchestrator.run().await?;
/// # Ok(())
/// # }
/// ```

use crate::plan::{plan, Action, Line, Snapshot};
use crate::queue::{QueueError, SessionQueue};
use dialdesk_shared::{
    events::{ChangeAction, ChangeHub, EntityKind},
    models::{
        call::{Call, CreateCall, UpdateCall},
        dial_session::{DialSession, DialSessionState},
        lead::Lead,
        settings::TenantSettings,
        user::client_identity,
    },
    telephony::{
        twiml::{RenderError, VoiceResponse},
        MachineDetection, PlaceCallRequest, TelephonyConfig, VoiceProvider,
    },
};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Seconds a placed call rings before the provider gives up
const RING_TIMEOUT_SECS: u32 = 25;

/// Seconds an answered call waits on hold for the bridge
const HOLD_SECS: u32 = 60;

const VOICEMAIL_DROP_DISPOSITION: &str = "voicemail_drop";

#[derive(Debug, Error)]
pub enum DialerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Document(#[from] RenderError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,

    /// Sessions claimed per tick; every active session is reconciled
    pub batch_size: i64,

    /// Dial only for this tenant
    pub tenant_id: Option<Uuid>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            poll_interval: Duration::from_secs(1),
            batch_size: 50,
            tenant_id: None,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub claimed: usize,
    pub reconciled: usize,
    pub calls_placed: usize,
    pub bridged: usize,
    pub hung_up: usize,
    pub voicemails_dropped: usize,
    pub finished: usize,
}

pub struct DialerOrchestrator {
    db: PgPool,
    queue: SessionQueue,
    provider: Arc<dyn VoiceProvider>,
    hub: ChangeHub,
    telephony: TelephonyConfig,
    config: OrchestratorConfig,

    /// Calls that were hung up or given a voicemail drop and are still live
    released: HashSet<Uuid>,

    shutdown_token: CancellationToken,
}

impl DialerOrchestrator {
    pub fn new(
        db: PgPool,
        provider: Arc<dyn VoiceProvider>,
        hub: ChangeHub,
        telephony: TelephonyConfig,
        config: OrchestratorConfig,
    ) -> Self {
        DialerOrchestrator {
            queue: SessionQueue::new(db.clone(), config.batch_size).scoped_to(config.tenant_id),
            db,
            provider,
            hub,
            telephony,
            config,
            released: HashSet::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Cancel to stop [`run`](Self::run) after the current tick
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Ticks until shutdown
    ///
    /// A failed tick is logged and retried on the next interval.
    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            tenant_id = ?self.config.tenant_id,
            "Dialer starting"
        );

        loop {
            match self.tick().await {
                Ok(summary) if summary != TickSummary::default() => {
                    tracing::debug!(?summary, "Tick finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Dialer tick failed"),
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!("Dialer stopped");
        Ok(())
    }

    /// Claims pending sessions and reconciles every active one once
    pub async fn tick(&mut self) -> Result<TickSummary, DialerError> {
        let mut summary = TickSummary::default();

        for session in self.queue.claim_sessions().await? {
            tracing::info!(
                session_id = %session.id,
                tenant_id = %session.tenant_id,
                lines = session.lines,
                leads = session.lead_ids.len(),
                "Dial session started"
            );
            self.emit_session(&session);
            summary.claimed += 1;
        }

        let mut live_calls = HashSet::new();
        for session in self.queue.active_sessions().await? {
            if let Err(e) = self
                .reconcile(&session, &mut summary, &mut live_calls)
                .await
            {
                tracing::error!(session_id = %session.id, error = %e, "Failed to reconcile session");
                continue;
            }
            summary.reconciled += 1;
        }

        self.released.retain(|id| live_calls.contains(id));

        Ok(summary)
    }

    async fn reconcile(
        &mut self,
        session: &DialSession,
        summary: &mut TickSummary,
        live_calls: &mut HashSet<Uuid>,
    ) -> Result<(), DialerError> {
        let settings = TenantSettings::get_or_create(&self.db, session.tenant_id).await?;
        let calls = Call::list_by_session(&self.db, session.id).await?;

        let live: Vec<Line> = calls
            .iter()
            .filter(|call| call.status.is_live())
            .map(|call| Line::from_call(call, self.released.contains(&call.id)))
            .collect();
        live_calls.extend(live.iter().map(|line| line.call_id));

        let snapshot = Snapshot {
            state: session.state,
            lines: usize::try_from(session.lines).unwrap_or(1),
            live,
            connected_call_id: session.connected_call_id,
            remaining_leads: session.remaining_leads(),
            amd_enabled: settings.amd_enabled,
            voicemail_drop: settings.voicemail_drop_configured(),
        };

        let actions = plan(&snapshot);
        if actions.is_empty() {
            return Ok(());
        }
        tracing::debug!(session_id = %session.id, state = session.state.as_str(), ?actions, "Planned");

        let calls: HashMap<Uuid, &Call> = calls.iter().map(|call| (call.id, call)).collect();
        let mut placements = Vec::new();

        for action in actions {
            match action {
                Action::Place { lead_id } => placements.push(lead_id),
                Action::Bridge { call_id } => {
                    if let Some(call) = calls.get(&call_id) {
                        self.bridge(session, call).await?;
                        summary.bridged += 1;
                    }
                }
                Action::Hangup { call_id } => {
                    if let Some(call) = calls.get(&call_id) {
                        self.hangup(call).await;
                        summary.hung_up += 1;
                    }
                }
                Action::DropVoicemail { call_id } => {
                    if let (Some(call), Some(url)) =
                        (calls.get(&call_id), settings.voicemail_drop_url.as_deref())
                    {
                        self.drop_voicemail(call, url).await?;
                        summary.voicemails_dropped += 1;
                    }
                }
                Action::Complete => {
                    if let Some(done) = DialSession::complete(&self.db, session.id).await? {
                        tracing::info!(
                            session_id = %done.id,
                            calls_placed = done.calls_placed,
                            "Dial session completed"
                        );
                        self.emit_session(&done);
                        summary.finished += 1;
                    }
                }
                Action::Finish => {
                    if let Some(done) = DialSession::finish_canceled(&self.db, session.id).await? {
                        tracing::info!(session_id = %done.id, "Canceled dial session finished");
                        self.emit_session(&done);
                        summary.finished += 1;
                    }
                }
            }
        }

        if !placements.is_empty() {
            summary.calls_placed += self.place_calls(session, &settings, &placements).await?;
        }

        Ok(())
    }

    /// Places one call per lead and advances the session's lead cursor
    ///
    /// Leads that were deleted, converted or lost since the session was
    /// created are skipped. Returns the number of calls created.
    async fn place_calls(
        &self,
        session: &DialSession,
        settings: &TenantSettings,
        lead_ids: &[Uuid],
    ) -> Result<usize, DialerError> {
        let Some(caller_id) = settings.caller_id.as_deref() else {
            tracing::warn!(
                session_id = %session.id,
                tenant_id = %session.tenant_id,
                "No caller id configured, pausing dial session"
            );
            if let Some(paused) = DialSession::transition(
                &self.db,
                session.tenant_id,
                session.id,
                DialSessionState::Paused,
            )
            .await?
            {
                self.emit_session(&paused);
            }
            return Ok(0);
        };

        let mut placed = 0;
        for &lead_id in lead_ids {
            let lead = match Lead::find_by_id(&self.db, session.tenant_id, lead_id).await? {
                Some(lead) if !lead.status.is_closed() => lead,
                _ => {
                    tracing::debug!(session_id = %session.id, lead_id = %lead_id, "Skipping lead");
                    continue;
                }
            };

            self.place_call(session, settings, caller_id, &lead).await?;
            placed += 1;

            if let Some(lead) = Lead::record_attempt(&self.db, lead.id).await? {
                self.hub
                    .emit(lead.tenant_id, EntityKind::Lead, ChangeAction::Updated, lead.id, &lead);
            }
        }

        let next_index = session
            .next_index
            .saturating_add(i32::try_from(lead_ids.len()).unwrap_or(i32::MAX));
        let placed_count = i32::try_from(placed).unwrap_or(i32::MAX);
        if let Some(advanced) =
            DialSession::advance(&self.db, session.id, next_index, placed_count).await?
        {
            self.emit_session(&advanced);
        }

        Ok(placed)
    }

    async fn place_call(
        &self,
        session: &DialSession,
        settings: &TenantSettings,
        caller_id: &str,
        lead: &Lead,
    ) -> Result<(), DialerError> {
        let request = self.place_request(settings, caller_id, &lead.phone)?;

        let call = Call::create(
            &self.db,
            session.tenant_id,
            CreateCall {
                user_id: Some(session.user_id),
                contact_id: lead.contact_id,
                lead_id: Some(lead.id),
                dial_session_id: Some(session.id),
                ..CreateCall::outbound(caller_id.to_string(), lead.phone.clone())
            },
        )
        .await?;
        self.hub
            .emit(call.tenant_id, EntityKind::Call, ChangeAction::Created, call.id, &call);

        let updated = match self.provider.place_call(&request).await {
            Ok(resource) => {
                tracing::info!(
                    session_id = %session.id,
                    call_id = %call.id,
                    call_sid = %resource.sid,
                    lead_id = %lead.id,
                    "Call placed"
                );
                Call::set_provider_sid(&self.db, call.id, &resource.sid).await?
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    call_id = %call.id,
                    lead_id = %lead.id,
                    error = %e,
                    "Failed to place call"
                );
                Call::mark_failed(&self.db, call.id, &e.to_string()).await?
            }
        };

        if let Some(call) = updated {
            self.hub
                .emit(call.tenant_id, EntityKind::Call, ChangeAction::Updated, call.id, &call);
        }

        Ok(())
    }

    fn place_request(
        &self,
        settings: &TenantSettings,
        caller_id: &str,
        to: &str,
    ) -> Result<PlaceCallRequest, RenderError> {
        // Answered calls wait silently until they are bridged or released
        let hold = VoiceResponse::new().pause(HOLD_SECS).hangup().render()?;

        let machine_detection = settings.amd_enabled.then(|| {
            if settings.voicemail_drop_configured() {
                MachineDetection::DetectMessageEnd
            } else {
                MachineDetection::Enable
            }
        });

        Ok(PlaceCallRequest {
            status_callback: Some(self.telephony.webhook_url("/webhooks/voice/status")),
            amd_callback: machine_detection
                .map(|_| self.telephony.webhook_url("/webhooks/voice/amd")),
            machine_detection,
            recording_callback: settings
                .recording_enabled
                .then(|| self.telephony.webhook_url("/webhooks/voice/recording")),
            timeout_secs: Some(RING_TIMEOUT_SECS),
            ..PlaceCallRequest::new(to, caller_id, hold)
        })
    }

    /// Connects the call to the session's agent
    ///
    /// If the provider refuses, the call is hung up so the next answer can
    /// be bridged instead.
    async fn bridge(&mut self, session: &DialSession, call: &Call) -> Result<(), DialerError> {
        let Some(sid) = call.provider_call_sid.as_deref() else {
            return Ok(());
        };

        let identity = client_identity(session.user_id);
        if let Err(e) = self.provider.bridge_to_client(sid, &identity).await {
            tracing::error!(session_id = %session.id, call_id = %call.id, error = %e, "Failed to bridge call");
            self.hangup(call).await;
            return Ok(());
        }

        tracing::info!(
            session_id = %session.id,
            call_id = %call.id,
            user_id = %session.user_id,
            "Call bridged to agent"
        );

        if let Some(updated) = DialSession::set_connected_call(&self.db, session.id, Some(call.id)).await? {
            self.emit_session(&updated);
        }

        Ok(())
    }

    async fn drop_voicemail(&mut self, call: &Call, audio_url: &str) -> Result<(), DialerError> {
        let Some(sid) = call.provider_call_sid.as_deref() else {
            return Ok(());
        };

        match self.provider.drop_voicemail(sid, audio_url).await {
            Ok(()) => {
                tracing::info!(call_id = %call.id, "Voicemail dropped");
                self.released.insert(call.id);

                let update = UpdateCall {
                    disposition: Some(VOICEMAIL_DROP_DISPOSITION.to_string()),
                    ..Default::default()
                };
                if let Some(updated) = Call::update(&self.db, call.tenant_id, call.id, update).await? {
                    self.hub.emit(
                        updated.tenant_id,
                        EntityKind::Call,
                        ChangeAction::Updated,
                        updated.id,
                        &updated,
                    );
                }
            }
            Err(e) => {
                tracing::warn!(call_id = %call.id, error = %e, "Failed to drop voicemail, hanging up");
                self.hangup(call).await;
            }
        }

        Ok(())
    }

    /// Ends a call; failures are logged and the call is retried next tick
    async fn hangup(&mut self, call: &Call) {
        let Some(sid) = call.provider_call_sid.as_deref() else {
            return;
        };

        match self.provider.hangup(sid).await {
            Ok(()) => {
                tracing::debug!(call_id = %call.id, call_sid = %sid, "Call hung up");
                self.released.insert(call.id);
            }
            Err(e) => tracing::warn!(call_id = %call.id, error = %e, "Failed to hang up call"),
        }
    }

    fn emit_session(&self, session: &DialSession) {
        self.hub.emit(
            session.tenant_id,
            EntityKind::DialSession,
            ChangeAction::Updated,
            session.id,
            session,
        );
    }
}
