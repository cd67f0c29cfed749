/// Lead endpoints
///
/// - `GET    /v1/leads?q=&status=&assigned_to=` - List and search
/// - `POST   /v1/leads` - Create
/// - `GET    /v1/leads/stats` - Counts per status
/// - `GET    /v1/leads/:id` - Get
/// - `PATCH  /v1/leads/:id` - Partial update
/// - `DELETE /v1/leads/:id` - Delete (assignee or admin)
/// - `POST   /v1/leads/:id/convert` - Link or create a contact, mark converted

use super::{normalize_phone, normalize_phone_opt, validate};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use dialdesk_shared::{
    auth::{authorization::require_ownership_or_admin, middleware::AuthContext},
    events::{ChangeAction, EntityKind},
    models::{
        contact::{Contact, CreateContact},
        lead::{CreateLead, Lead, LeadFilter, LeadStats, LeadStatus, UpdateLead},
        pagination::{Page, PageParams},
        user::User,
    },
    phone::validate_phone,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLeadRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(custom(function = "validate_phone"))]
    pub phone: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,

    #[validate(length(max = 100))]
    pub source: Option<String>,

    #[validate(range(min = 0, max = 100, message = "Priority must be 0-100"))]
    pub priority: Option<i32>,

    pub assigned_to: Option<Uuid>,

    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLeadRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,

    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,

    #[validate(length(max = 100))]
    pub source: Option<String>,

    pub status: Option<LeadStatus>,

    #[validate(range(min = 0, max = 100, message = "Priority must be 0-100"))]
    pub priority: Option<i32>,

    pub assigned_to: Option<Uuid>,

    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConvertLeadRequest {
    /// Existing contact to link; otherwise one is found by phone or created
    pub contact_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConvertLeadResponse {
    pub lead: Lead,
    pub contact: Contact,

    /// Whether a new contact was created for the lead
    pub contact_created: bool,
}

/// Rejects an assignee that is not an active user of the tenant
async fn check_assignee(pool: &PgPool, tenant_id: Uuid, assignee: Option<Uuid>) -> ApiResult<()> {
    let Some(user_id) = assignee else {
        return Ok(());
    };

    match User::find_by_id(pool, tenant_id, user_id).await? {
        Some(user) if user.active => Ok(()),
        _ => Err(ApiError::invalid_field("assigned_to", "Unknown user")),
    }
}

/// Splits a lead name into contact first and last name
fn split_name(name: &str) -> (String, Option<String>) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) if !rest.trim().is_empty() => {
            (first.to_string(), Some(rest.trim().to_string()))
        }
        _ => (name.to_string(), None),
    }
}

pub async fn list_leads(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
    Query(filter): Query<LeadFilter>,
) -> ApiResult<Json<Page<Lead>>> {
    let page = Lead::list(&state.db, auth.tenant_id, &filter, &params).await?;
    Ok(Json(page))
}

pub async fn create_lead(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateLeadRequest>,
) -> ApiResult<(StatusCode, Json<Lead>)> {
    validate(&req)?;
    let phone = normalize_phone("phone", &req.phone)?;
    check_assignee(&state.db, auth.tenant_id, req.assigned_to).await?;

    let lead = Lead::create(
        &state.db,
        auth.tenant_id,
        CreateLead {
            name: req.name.trim().to_string(),
            phone,
            email: req.email,
            source: req.source,
            priority: req.priority,
            assigned_to: req.assigned_to,
            notes: req.notes,
        },
    )
    .await?;

    tracing::info!(lead_id = %lead.id, tenant_id = %auth.tenant_id, "Lead created");
    state
        .hub
        .emit(auth.tenant_id, EntityKind::Lead, ChangeAction::Created, lead.id, &lead);

    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn lead_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<LeadStats>> {
    Ok(Json(Lead::stats(&state.db, auth.tenant_id).await?))
}

pub async fn get_lead(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Lead>> {
    let lead = Lead::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lead"))?;
    Ok(Json(lead))
}

pub async fn update_lead(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadRequest>,
) -> ApiResult<Json<Lead>> {
    validate(&req)?;
    check_assignee(&state.db, auth.tenant_id, req.assigned_to).await?;

    let update = UpdateLead {
        name: req.name.map(|n| n.trim().to_string()),
        phone: normalize_phone_opt("phone", req.phone)?,
        email: req.email,
        source: req.source,
        status: req.status,
        priority: req.priority,
        assigned_to: req.assigned_to,
        notes: req.notes,
    };

    let lead = Lead::update(&state.db, auth.tenant_id, id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Lead"))?;

    state
        .hub
        .emit(auth.tenant_id, EntityKind::Lead, ChangeAction::Updated, lead.id, &lead);

    Ok(Json(lead))
}

pub async fn delete_lead(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let lead = Lead::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lead"))?;

    require_ownership_or_admin(&auth, lead.assigned_to)?;

    if !Lead::delete(&state.db, auth.tenant_id, id).await? {
        return Err(ApiError::not_found("Lead"));
    }

    tracing::info!(lead_id = %id, user_id = %auth.user_id, "Lead deleted");
    state.hub.emit_deleted(auth.tenant_id, EntityKind::Lead, id);

    Ok(StatusCode::NO_CONTENT)
}

/// Convert a lead into a contact
///
/// ```text
/// POST /v1/leads/:id/convert
///
/// { "contact_id": "..." }     // optional
/// ```
///
/// Without `contact_id`, the contact with the lead's phone number is
/// linked, or a new one is created from the lead's name, phone and email.
/// A lead that is already converted returns 409.
pub async fn convert_lead(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<ConvertLeadResponse>> {
    let req: ConvertLeadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConvertLeadRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?
    };

    let lead = Lead::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lead"))?;

    if lead.status == LeadStatus::Converted {
        return Err(ApiError::Conflict("Lead is already converted".to_string()));
    }

    let (contact, contact_created) = match req.contact_id {
        Some(contact_id) => {
            let contact = Contact::find_by_id(&state.db, auth.tenant_id, contact_id)
                .await?
                .ok_or_else(|| ApiError::invalid_field("contact_id", "Unknown contact"))?;
            (contact, false)
        }
        None => match Contact::find_by_phone(&state.db, auth.tenant_id, &lead.phone).await? {
            Some(contact) => (contact, false),
            None => {
                let (first_name, last_name) = split_name(&lead.name);
                let contact = Contact::create(
                    &state.db,
                    auth.tenant_id,
                    CreateContact {
                        first_name,
                        last_name,
                        phone: lead.phone.clone(),
                        email: lead.email.clone(),
                        company: None,
                        notes: lead.notes.clone(),
                        tags: Vec::new(),
                        created_by: Some(auth.user_id),
                    },
                )
                .await?;
                (contact, true)
            }
        },
    };

    let lead = Lead::mark_converted(&state.db, auth.tenant_id, id, contact.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lead"))?;

    tracing::info!(
        lead_id = %lead.id,
        contact_id = %contact.id,
        contact_created,
        "Lead converted"
    );

    if contact_created {
        state.hub.emit(
            auth.tenant_id,
            EntityKind::Contact,
            ChangeAction::Created,
            contact.id,
            &contact,
        );
    }
    state
        .hub
        .emit(auth.tenant_id, EntityKind::Lead, ChangeAction::Updated, lead.id, &lead);

    Ok(Json(ConvertLeadResponse {
        lead,
        contact,
        contact_created,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("Grace Brewster Hopper"),
            ("Grace".to_string(), Some("Brewster Hopper".to_string()))
        );
        assert_eq!(split_name(" Cher "), ("Cher".to_string(), None));
    }

    #[test]
    fn test_priority_range() {
        let req = CreateLeadRequest {
            name: "Lead".to_string(),
            phone: "+14155552671".to_string(),
            email: None,
            source: None,
            priority: Some(500),
            assigned_to: None,
            notes: None,
        };
        assert!(req.validate().unwrap_err().field_errors().contains_key("priority"));
    }

    #[test]
    fn test_status_deserializes_lowercase() {
        let req: UpdateLeadRequest =
            serde_json::from_str(r#"{ "status": "qualified" }"#).unwrap();
        assert_eq!(req.status, Some(LeadStatus::Qualified));
    }
}
