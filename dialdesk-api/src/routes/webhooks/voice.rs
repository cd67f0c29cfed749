/// Voice webhooks
///
/// - `POST /webhooks/voice/status` - Call progress (`CallStatus`, `CallDuration`)
/// - `POST /webhooks/voice/amd` - Asynchronous answering machine detection
/// - `POST /webhooks/voice/recording` - Call recording ready
/// - `POST /webhooks/voice/voicemail` - Voicemail recording ready
/// - `POST /webhooks/voice/transcription` - Voicemail transcription ready
/// - `POST /webhooks/voice/inbound` - Inbound call to a tenant number (TwiML)
/// - `POST /webhooks/voice/inbound/complete` - Inbound ring group finished (TwiML)
/// - `POST /webhooks/voice/outbound` - Call started from the browser client (TwiML)
///
/// Callbacks for a call sid we do not know are acknowledged and ignored so
/// the provider does not retry them.

use super::{SignedForm, Twiml};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode};
use dialdesk_shared::{
    events::{ChangeAction, EntityKind},
    models::{
        call::{AnsweredBy, Call, CallDirection, CallStatus, CreateCall, ProviderStatusUpdate},
        contact::Contact,
        lead::Lead,
        recording::{CreateRecording, Recording},
        settings::TenantSettings,
        user::{parse_client_identity, User},
        voicemail::{CreateVoicemail, Voicemail},
    },
    phone::{normalize_e164, normalize_lenient},
    telephony::twiml::{Dial, Record, VoiceResponse},
};
use uuid::Uuid;

/// Seconds the agents' browsers ring before the caller goes to voicemail
const INBOUND_RING_SECS: u32 = 20;

const VOICEMAIL_MAX_SECS: u32 = 120;

const VOICEMAIL_PROMPT: &str =
    "Sorry, nobody is available to take your call. Please leave a message after the tone.";

const NOT_IN_SERVICE: &str = "The number you have called is not in service.";

/// Applies a status update and fans out the consequences
///
/// An answered dialer or outbound call moves its lead from `new` to
/// `contacted`.
async fn apply_status(
    state: &AppState,
    sid: &str,
    update: ProviderStatusUpdate,
) -> ApiResult<Option<Call>> {
    let Some(call) = Call::apply_provider_status(&state.db, sid, &update).await? else {
        tracing::warn!(call_sid = %sid, "Status callback for unknown call");
        return Ok(None);
    };

    tracing::debug!(
        call_id = %call.id,
        call_sid = %sid,
        status = call.status.as_str(),
        answered_by = ?call.answered_by,
        "Call status updated"
    );
    state
        .hub
        .emit(call.tenant_id, EntityKind::Call, ChangeAction::Updated, call.id, &call);

    if call.answered_at.is_some() {
        if let Some(lead_id) = call.lead_id {
            if let Some(lead) = Lead::mark_contacted(&state.db, lead_id).await? {
                state
                    .hub
                    .emit(lead.tenant_id, EntityKind::Lead, ChangeAction::Updated, lead.id, &lead);
            }
        }
    }

    Ok(Some(call))
}

/// Call progress callback
pub async fn status(State(state): State<AppState>, form: SignedForm) -> ApiResult<StatusCode> {
    let sid = form.require("CallSid")?;
    let raw_status = form.require("CallStatus")?;
    let status = CallStatus::from_provider(raw_status)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown call status {}", raw_status)))?;

    apply_status(
        &state,
        sid,
        ProviderStatusUpdate {
            status,
            answered_by: form.get("AnsweredBy").map(AnsweredBy::from_provider),
            duration_seconds: form.get_i32("CallDuration"),
        },
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Answering machine detection result
///
/// Arrives separately from status callbacks; the call keeps its current
/// status and gains `answered_by`. An undetermined result counts as a
/// person so the dialer bridges the call instead of waiting on it.
pub async fn amd(State(state): State<AppState>, form: SignedForm) -> ApiResult<StatusCode> {
    let sid = form.require("CallSid")?;
    let answered_by = match AnsweredBy::from_provider(form.require("AnsweredBy")?) {
        AnsweredBy::Unknown => AnsweredBy::Human,
        detected => detected,
    };

    let Some(call) = Call::find_by_provider_sid(&state.db, sid).await? else {
        tracing::warn!(call_sid = %sid, "AMD callback for unknown call");
        return Ok(StatusCode::NO_CONTENT);
    };

    apply_status(
        &state,
        sid,
        ProviderStatusUpdate {
            status: call.status,
            answered_by: Some(answered_by),
            duration_seconds: None,
        },
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Call recording status callback
pub async fn recording(State(state): State<AppState>, form: SignedForm) -> ApiResult<StatusCode> {
    let sid = form.require("CallSid")?;
    let recording_sid = form.require("RecordingSid")?;

    let Some(call) = Call::find_by_provider_sid(&state.db, sid).await? else {
        tracing::warn!(call_sid = %sid, recording_sid = %recording_sid, "Recording for unknown call");
        return Ok(StatusCode::NO_CONTENT);
    };

    let recording = Recording::upsert(
        &state.db,
        call.tenant_id,
        CreateRecording {
            call_id: call.id,
            provider_recording_sid: recording_sid.to_string(),
            url: form.require("RecordingUrl")?.to_string(),
            duration_seconds: form.get_i32("RecordingDuration").unwrap_or(0),
            status: form.get("RecordingStatus").unwrap_or("completed").to_string(),
        },
    )
    .await?;

    tracing::info!(recording_id = %recording.id, call_id = %call.id, "Recording stored");
    state.hub.emit(
        recording.tenant_id,
        EntityKind::Recording,
        ChangeAction::Created,
        recording.id,
        &recording,
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Voicemail recording status callback
pub async fn voicemail(State(state): State<AppState>, form: SignedForm) -> ApiResult<StatusCode> {
    let sid = form.require("CallSid")?;

    let Some(call) = Call::find_by_provider_sid(&state.db, sid).await? else {
        tracing::warn!(call_sid = %sid, "Voicemail for unknown call");
        return Ok(StatusCode::NO_CONTENT);
    };

    let voicemail = Voicemail::create(
        &state.db,
        call.tenant_id,
        CreateVoicemail {
            call_id: Some(call.id),
            contact_id: call.contact_id,
            from_number: call.from_number.clone(),
            recording_url: form.require("RecordingUrl")?.to_string(),
            duration_seconds: form.get_i32("RecordingDuration").unwrap_or(0),
            transcription: None,
        },
    )
    .await?;

    tracing::info!(voicemail_id = %voicemail.id, call_id = %call.id, "Voicemail stored");
    state.hub.emit(
        voicemail.tenant_id,
        EntityKind::Voicemail,
        ChangeAction::Created,
        voicemail.id,
        &voicemail,
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Voicemail transcription callback
///
/// Arrives after the voicemail callback. Failed transcriptions are ignored.
pub async fn transcription(
    State(state): State<AppState>,
    form: SignedForm,
) -> ApiResult<StatusCode> {
    let sid = form.require("CallSid")?;

    if form.get("TranscriptionStatus").is_some_and(|status| status != "completed") {
        tracing::debug!(call_sid = %sid, "Transcription not completed");
        return Ok(StatusCode::NO_CONTENT);
    }
    let text = form.require("TranscriptionText")?;

    let Some(call) = Call::find_by_provider_sid(&state.db, sid).await? else {
        tracing::warn!(call_sid = %sid, "Transcription for unknown call");
        return Ok(StatusCode::NO_CONTENT);
    };

    match Voicemail::set_transcription(&state.db, call.tenant_id, call.id, text).await? {
        Some(voicemail) => {
            tracing::debug!(voicemail_id = %voicemail.id, "Voicemail transcribed");
            state.hub.emit(
                voicemail.tenant_id,
                EntityKind::Voicemail,
                ChangeAction::Updated,
                voicemail.id,
                &voicemail,
            );
        }
        None => tracing::warn!(call_id = %call.id, "Transcription for call without voicemail"),
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn contact_id_for(state: &AppState, tenant_id: Uuid, phone: &str) -> ApiResult<Option<Uuid>> {
    Ok(Contact::find_by_phone(&state.db, tenant_id, phone)
        .await?
        .map(|contact| contact.id))
}

fn voicemail_twiml(state: &AppState) -> Twiml {
    VoiceResponse::new()
        .say(VOICEMAIL_PROMPT)
        .record(
            Record::new(VOICEMAIL_MAX_SECS)
                .recording_callback(state.webhook_url("/webhooks/voice/voicemail"))
                .transcribe(state.webhook_url("/webhooks/voice/transcription")),
        )
        .hangup()
        .into()
}

/// Inbound call to a tenant number
///
/// Rings the browser client of every active user of the tenant that owns
/// the dialed number. Unanswered calls continue at
/// `/webhooks/voice/inbound/complete`.
pub async fn inbound(State(state): State<AppState>, form: SignedForm) -> ApiResult<Twiml> {
    let sid = form.require("CallSid")?;
    let from = normalize_lenient(form.require("From")?);
    let to = normalize_lenient(form.require("To")?);

    let Some(settings) = TenantSettings::find_by_caller_id(&state.db, &to).await? else {
        tracing::warn!(to = %to, "Inbound call to an unassigned number");
        return Ok(VoiceResponse::new().say(NOT_IN_SERVICE).hangup().into());
    };
    let tenant_id = settings.tenant_id;

    let call = Call::create(
        &state.db,
        tenant_id,
        CreateCall {
            contact_id: contact_id_for(&state, tenant_id, &from).await?,
            direction: CallDirection::Inbound,
            status: CallStatus::Ringing,
            provider_call_sid: Some(sid.to_string()),
            ..CreateCall::outbound(from, to)
        },
    )
    .await?;

    tracing::info!(call_id = %call.id, tenant_id = %tenant_id, "Inbound call");
    state
        .hub
        .emit(tenant_id, EntityKind::Call, ChangeAction::Created, call.id, &call);

    let agents = User::list_active(&state.db, tenant_id).await?;
    if agents.is_empty() {
        return Ok(voicemail_twiml(&state));
    }

    let mut dial = Dial::new()
        .timeout(INBOUND_RING_SECS)
        .action(state.webhook_url("/webhooks/voice/inbound/complete"));
    if settings.recording_enabled {
        dial = dial.record(state.webhook_url("/webhooks/voice/recording"));
    }
    for agent in &agents {
        dial = dial.client(agent.client_identity());
    }

    Ok(VoiceResponse::new().dial(dial).into())
}

/// End of the inbound ring group
///
/// A call an agent picked up simply ends; otherwise the caller is offered
/// voicemail.
pub async fn inbound_complete(
    State(state): State<AppState>,
    form: SignedForm,
) -> ApiResult<Twiml> {
    let answered = form
        .get("DialCallStatus")
        .and_then(CallStatus::from_provider)
        .is_some_and(|status| matches!(status, CallStatus::Completed | CallStatus::InProgress));

    if answered {
        return Ok(VoiceResponse::new().hangup().into());
    }

    tracing::debug!(call_sid = ?form.get("CallSid"), "Inbound call unanswered, taking voicemail");
    Ok(voicemail_twiml(&state))
}

/// Call placed from an agent's browser
///
/// The browser client's identity names the agent; `To` is the number it
/// dialed. The call is presented with the tenant's caller id.
pub async fn outbound(State(state): State<AppState>, form: SignedForm) -> ApiResult<Twiml> {
    let sid = form.require("CallSid")?;
    let identity = form.require("From")?;

    let Some(user_id) = parse_client_identity(identity) else {
        tracing::warn!(identity = %identity, "Outbound call from unknown client");
        return Ok(VoiceResponse::new().hangup().into());
    };
    let Some(user) = User::find_active(&state.db, user_id).await? else {
        tracing::warn!(user_id = %user_id, "Outbound call from inactive or unknown user");
        return Ok(VoiceResponse::new().hangup().into());
    };

    let settings = TenantSettings::get_or_create(&state.db, user.tenant_id).await?;
    let Some(caller_id) = settings.caller_id.clone() else {
        return Ok(VoiceResponse::new()
            .say("No caller ID is configured for your account.")
            .hangup()
            .into());
    };

    let Ok(to) = normalize_e164(form.require("To")?) else {
        return Ok(VoiceResponse::new()
            .say("The number you dialed is not valid.")
            .hangup()
            .into());
    };

    let call = Call::create(
        &state.db,
        user.tenant_id,
        CreateCall {
            user_id: Some(user.id),
            contact_id: contact_id_for(&state, user.tenant_id, &to).await?,
            status: CallStatus::Ringing,
            provider_call_sid: Some(sid.to_string()),
            ..CreateCall::outbound(caller_id.clone(), to.clone())
        },
    )
    .await?;

    tracing::info!(call_id = %call.id, user_id = %user.id, "Browser outbound call");
    state
        .hub
        .emit(user.tenant_id, EntityKind::Call, ChangeAction::Created, call.id, &call);

    let mut dial = Dial::new().caller_id(caller_id);
    if settings.recording_enabled {
        dial = dial.record(state.webhook_url("/webhooks/voice/recording"));
    }

    Ok(VoiceResponse::new().dial(dial.number(to)).into())
}
