/// Storage behavior against a real PostgreSQL database
///
/// Skipped unless `DATABASE_URL` is set. Every test creates its own tenants,
/// so the suite can share one database and run in parallel.

mod common;

use common::{create_tenant, create_user, random_phone, test_pool};
use dialdesk_shared::models::call::{
    AnsweredBy, Call, CallDirection, CallFilter, CallStatus, CreateCall, ProviderStatusUpdate,
};
use dialdesk_shared::models::contact::{Contact, ContactFilter, CreateContact, UpdateContact};
use dialdesk_shared::models::dial_session::{CreateDialSession, DialSession, DialSessionState};
use dialdesk_shared::models::lead::{CreateLead, Lead, LeadStatus};
use dialdesk_shared::models::pagination::PageParams;
use dialdesk_shared::models::settings::{TenantSettings, UpdateSettings};
use dialdesk_shared::models::user::UserRole;
use dialdesk_shared::models::voicemail::{CreateVoicemail, Voicemail};
use chrono::{Duration, Utc};

fn contact(first_name: &str, phone: &str) -> CreateContact {
    CreateContact {
        first_name: first_name.to_string(),
        phone: phone.to_string(),
        ..Default::default()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[tokio::test]
async fn test_contacts_are_tenant_scoped() {
    let Some(pool) = test_pool().await else { return };
    let a = create_tenant(&pool).await;
    let b = create_tenant(&pool).await;

    let created = Contact::create(&pool, a.id, contact("Ada", &random_phone()))
        .await
        .unwrap();

    assert!(Contact::find_by_id(&pool, a.id, created.id).await.unwrap().is_some());
    assert!(Contact::find_by_id(&pool, b.id, created.id).await.unwrap().is_none());

    let update = UpdateContact {
        company: Some("Acme".to_string()),
        ..Default::default()
    };
    assert!(Contact::update(&pool, b.id, created.id, update.clone())
        .await
        .unwrap()
        .is_none());
    assert!(!Contact::delete(&pool, b.id, created.id).await.unwrap());

    let page = Contact::list(&pool, b.id, &ContactFilter::default(), &PageParams::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
    assert_eq!(Contact::stats(&pool, b.id).await.unwrap().total, 0);

    let updated = Contact::update(&pool, a.id, created.id, update)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.company.as_deref(), Some("Acme"));
    assert_eq!(updated.first_name, "Ada");
}

#[tokio::test]
async fn test_contact_phone_unique_per_tenant() {
    let Some(pool) = test_pool().await else { return };
    let a = create_tenant(&pool).await;
    let b = create_tenant(&pool).await;
    let phone = random_phone();

    Contact::create(&pool, a.id, contact("Ada", &phone)).await.unwrap();

    let duplicate = Contact::create(&pool, a.id, contact("Bob", &phone))
        .await
        .unwrap_err();
    assert!(is_unique_violation(&duplicate));

    // Same number in another tenant is fine
    Contact::create(&pool, b.id, contact("Ada", &phone)).await.unwrap();

    let found = Contact::find_by_phone(&pool, b.id, &phone).await.unwrap();
    assert_eq!(found.map(|c| c.tenant_id), Some(b.id));
}

#[tokio::test]
async fn test_contact_search_and_pagination() {
    let Some(pool) = test_pool().await else { return };
    let tenant = create_tenant(&pool).await;

    for name in ["Grace", "Greta", "Alan"] {
        Contact::create(&pool, tenant.id, contact(name, &random_phone()))
            .await
            .unwrap();
    }
    let mut tagged = contact("Linus", &random_phone());
    tagged.tags = vec!["vip".to_string()];
    Contact::create(&pool, tenant.id, tagged).await.unwrap();

    let filter = ContactFilter {
        q: Some("gr".to_string()),
        tag: None,
    };
    let page = Contact::list(&pool, tenant.id, &filter, &PageParams::new(1, 1))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total_pages, 2);

    let filter = ContactFilter {
        q: None,
        tag: Some("vip".to_string()),
    };
    let page = Contact::list(&pool, tenant.id, &filter, &PageParams::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].first_name, "Linus");

    // Wildcards in the search term are literal
    let filter = ContactFilter {
        q: Some("%".to_string()),
        tag: None,
    };
    let page = Contact::list(&pool, tenant.id, &filter, &PageParams::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_lead_lifecycle() {
    let Some(pool) = test_pool().await else { return };
    let tenant = create_tenant(&pool).await;

    let lead = Lead::create(
        &pool,
        tenant.id,
        CreateLead {
            name: "Prospect".to_string(),
            phone: random_phone(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(lead.status, LeadStatus::New);
    assert_eq!(lead.call_attempts, 0);

    let attempted = Lead::record_attempt(&pool, lead.id).await.unwrap().unwrap();
    assert_eq!(attempted.call_attempts, 1);
    assert!(attempted.last_called_at.is_some());

    let contacted = Lead::mark_contacted(&pool, lead.id).await.unwrap().unwrap();
    assert_eq!(contacted.status, LeadStatus::Contacted);
    assert!(Lead::mark_contacted(&pool, lead.id).await.unwrap().is_none());

    let person = Contact::create(&pool, tenant.id, contact("Prospect", &lead.phone))
        .await
        .unwrap();
    let converted = Lead::mark_converted(&pool, tenant.id, lead.id, person.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(converted.status, LeadStatus::Converted);
    assert_eq!(converted.contact_id, Some(person.id));

    let stats = Lead::stats(&pool, tenant.id).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.average_call_attempts, 1.0);
    assert!(stats
        .by_status
        .iter()
        .any(|c| c.label == "converted" && c.count == 1));
}

#[tokio::test]
async fn test_call_provider_status_flow() {
    let Some(pool) = test_pool().await else { return };
    let tenant = create_tenant(&pool).await;
    let sid = format!("CA{}", uuid::Uuid::new_v4().simple());

    let mut data = CreateCall::outbound(random_phone(), random_phone());
    data.provider_call_sid = Some(sid.clone());
    let call = Call::create(&pool, tenant.id, data).await.unwrap();
    assert_eq!(call.status, CallStatus::Queued);
    assert!(call.ended_at.is_none());

    let answered = Call::apply_provider_status(
        &pool,
        &sid,
        &ProviderStatusUpdate {
            status: CallStatus::InProgress,
            answered_by: Some(AnsweredBy::Human),
            duration_seconds: None,
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(answered.answered_by, AnsweredBy::Human);
    assert!(answered.answered_at.is_some());

    let done = Call::apply_provider_status(
        &pool,
        &sid,
        &ProviderStatusUpdate {
            status: CallStatus::Completed,
            answered_by: None,
            duration_seconds: Some(42),
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(done.status, CallStatus::Completed);
    assert_eq!(done.duration_seconds, 42);
    assert_eq!(done.answered_by, AnsweredBy::Human);
    assert!(done.ended_at.is_some());

    // A late ringing callback does not reopen the call
    let late = Call::apply_provider_status(
        &pool,
        &sid,
        &ProviderStatusUpdate {
            status: CallStatus::Ringing,
            answered_by: None,
            duration_seconds: None,
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(late.status, CallStatus::Completed);
}

#[tokio::test]
async fn test_call_filters_and_stats() {
    let Some(pool) = test_pool().await else { return };
    let tenant = create_tenant(&pool).await;
    let other = create_tenant(&pool).await;

    let mut logged = CreateCall::outbound(random_phone(), random_phone());
    logged.status = CallStatus::Completed;
    logged.duration_seconds = Some(60);
    let logged = Call::create(&pool, tenant.id, logged).await.unwrap();
    assert!(logged.ended_at.is_some());

    let mut inbound = CreateCall::outbound(random_phone(), random_phone());
    inbound.direction = CallDirection::Inbound;
    inbound.status = CallStatus::NoAnswer;
    Call::create(&pool, tenant.id, inbound).await.unwrap();

    Call::create(&pool, other.id, CreateCall::outbound(random_phone(), random_phone()))
        .await
        .unwrap();

    let filter = CallFilter {
        direction: Some(CallDirection::Inbound),
        ..Default::default()
    };
    let page = Call::list(&pool, tenant.id, &filter, &PageParams::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].status, CallStatus::NoAnswer);

    let now = Utc::now();
    let stats = Call::stats(&pool, tenant.id, now - Duration::days(1), now + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(stats.total, 2);
    assert!(stats
        .by_direction
        .iter()
        .any(|c| c.label == "inbound" && c.count == 1));
}

#[tokio::test]
async fn test_dial_session_transitions() {
    let Some(pool) = test_pool().await else { return };
    let tenant = create_tenant(&pool).await;
    let agent = create_user(&pool, tenant.id, UserRole::Agent).await;

    let session = DialSession::create(
        &pool,
        tenant.id,
        CreateDialSession {
            user_id: agent.id,
            lines: 3,
            lead_ids: vec![uuid::Uuid::new_v4(), uuid::Uuid::new_v4()],
        },
    )
    .await
    .unwrap();
    assert_eq!(session.state, DialSessionState::Pending);
    assert_eq!(session.remaining_leads().len(), 2);

    // Pending sessions cannot be paused
    assert!(DialSession::transition(&pool, tenant.id, session.id, DialSessionState::Paused)
        .await
        .unwrap()
        .is_none());

    let running = DialSession::transition(&pool, tenant.id, session.id, DialSessionState::Running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(running.state, DialSessionState::Running);

    let advanced = DialSession::advance(&pool, session.id, 1, 1).await.unwrap().unwrap();
    assert_eq!(advanced.next_index, 1);
    assert_eq!(advanced.calls_placed, 1);
    assert_eq!(advanced.remaining_leads().len(), 1);

    let canceled =
        DialSession::transition(&pool, tenant.id, session.id, DialSessionState::Canceled)
            .await
            .unwrap()
            .unwrap();
    assert!(canceled.ended_at.is_none(), "running session keeps lines until the dialer finishes it");

    let active = DialSession::list_active(&pool, Some(tenant.id), None, 1000).await.unwrap();
    assert!(active.iter().any(|s| s.id == session.id));

    let elsewhere = create_tenant(&pool).await;
    let active = DialSession::list_active(&pool, Some(elsewhere.id), None, 1000).await.unwrap();
    assert!(active.is_empty());

    let finished = DialSession::finish_canceled(&pool, session.id).await.unwrap().unwrap();
    assert!(finished.ended_at.is_some());

    let active = DialSession::list_active(&pool, Some(tenant.id), None, 1000).await.unwrap();
    assert!(!active.iter().any(|s| s.id == session.id));

    // Other tenants cannot touch it
    let other = create_tenant(&pool).await;
    assert!(DialSession::find_by_id(&pool, other.id, session.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_settings_defaults_and_caller_id_routing() {
    let Some(pool) = test_pool().await else { return };
    let tenant = create_tenant(&pool).await;

    let settings = TenantSettings::get_or_create(&pool, tenant.id).await.unwrap();
    assert_eq!(settings.dialer_lines, 3);
    assert!(settings.caller_id.is_none());
    assert!(!settings.voicemail_drop_configured());

    let caller_id = random_phone();
    let updated = TenantSettings::update(
        &pool,
        tenant.id,
        UpdateSettings {
            caller_id: Some(caller_id.clone()),
            voicemail_drop_url: Some("https://cdn.example.com/vm.mp3".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(updated.voicemail_drop_configured());

    let routed = TenantSettings::find_by_caller_id(&pool, &caller_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(routed.tenant_id, tenant.id);

    let out_of_range = TenantSettings::update(
        &pool,
        tenant.id,
        UpdateSettings {
            dialer_lines: Some(11),
            ..Default::default()
        },
    )
    .await;
    assert!(out_of_range.is_err());
}

#[tokio::test]
async fn test_voicemail_listened_stats() {
    let Some(pool) = test_pool().await else { return };
    let tenant = create_tenant(&pool).await;

    let voicemail = Voicemail::create(
        &pool,
        tenant.id,
        CreateVoicemail {
            call_id: None,
            contact_id: None,
            from_number: random_phone(),
            recording_url: "https://api.example.com/recordings/RE1".to_string(),
            duration_seconds: 12,
            transcription: None,
        },
    )
    .await
    .unwrap();

    let stats = Voicemail::stats(&pool, tenant.id).await.unwrap();
    assert_eq!((stats.total, stats.unlistened), (1, 1));

    Voicemail::set_listened(&pool, tenant.id, voicemail.id, true)
        .await
        .unwrap()
        .unwrap();

    let stats = Voicemail::stats(&pool, tenant.id).await.unwrap();
    assert_eq!((stats.total, stats.unlistened), (1, 0));
}
