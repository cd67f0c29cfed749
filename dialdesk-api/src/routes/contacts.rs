/// Contact endpoints
///
/// - `GET    /v1/contacts?q=&tag=&page=&per_page=` - List and search
/// - `POST   /v1/contacts` - Create
/// - `GET    /v1/contacts/stats` - Totals
/// - `GET    /v1/contacts/:id` - Get
/// - `PATCH  /v1/contacts/:id` - Partial update
/// - `DELETE /v1/contacts/:id` - Delete (creator or admin)
/// - `GET    /v1/contacts/:id/calls` - Call history
/// - `GET    /v1/contacts/:id/messages` - SMS history
///
/// Phone numbers are normalized to E.164 before they are stored, so
/// `(415) 555-2671` and `+14155552671` collide with a 409.

use super::{normalize_phone, normalize_phone_opt, validate};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use dialdesk_shared::{
    auth::{authorization::require_ownership_or_admin, middleware::AuthContext},
    events::{ChangeAction, EntityKind},
    models::{
        call::Call,
        contact::{Contact, ContactFilter, ContactStats, CreateContact, UpdateContact},
        message::{Message, MessageFilter},
        pagination::{Page, PageParams},
    },
    phone::validate_phone,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContactRequest {
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(max = 100))]
    pub last_name: Option<String>,

    #[validate(custom(function = "validate_phone"))]
    pub phone: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,

    #[validate(length(max = 200))]
    pub company: Option<String>,

    pub notes: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateContactRequest {
    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100))]
    pub last_name: Option<String>,

    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,

    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,

    #[validate(length(max = 200))]
    pub company: Option<String>,

    pub notes: Option<String>,

    pub tags: Option<Vec<String>>,
}

/// Trims tags and drops blanks and duplicates, keeping first-seen order
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !cleaned.contains(&tag) {
            cleaned.push(tag);
        }
    }
    cleaned
}

pub async fn list_contacts(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<PageParams>,
    Query(filter): Query<ContactFilter>,
) -> ApiResult<Json<Page<Contact>>> {
    let page = Contact::list(&state.db, auth.tenant_id, &filter, &params).await?;
    Ok(Json(page))
}

/// Create a contact
///
/// ```text
/// POST /v1/contacts
///
/// { "first_name": "Ada", "last_name": "Lovelace", "phone": "(415) 555-2671", "tags": ["vip"] }
/// ```
///
/// Returns 201 with the stored contact, 409 if the phone is already used in
/// this tenant, 422 if a field fails validation.
pub async fn create_contact(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateContactRequest>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    validate(&req)?;
    let phone = normalize_phone("phone", &req.phone)?;

    let contact = Contact::create(
        &state.db,
        auth.tenant_id,
        CreateContact {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name,
            phone,
            email: req.email,
            company: req.company,
            notes: req.notes,
            tags: clean_tags(req.tags),
            created_by: Some(auth.user_id),
        },
    )
    .await?;

    tracing::info!(contact_id = %contact.id, tenant_id = %auth.tenant_id, "Contact created");
    state.hub.emit(
        auth.tenant_id,
        EntityKind::Contact,
        ChangeAction::Created,
        contact.id,
        &contact,
    );

    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn contact_stats(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<ContactStats>> {
    Ok(Json(Contact::stats(&state.db, auth.tenant_id).await?))
}

pub async fn get_contact(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Contact>> {
    let contact = Contact::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Contact"))?;
    Ok(Json(contact))
}

pub async fn update_contact(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateContactRequest>,
) -> ApiResult<Json<Contact>> {
    validate(&req)?;

    let update = UpdateContact {
        first_name: req.first_name.map(|n| n.trim().to_string()),
        last_name: req.last_name,
        phone: normalize_phone_opt("phone", req.phone)?,
        email: req.email,
        company: req.company,
        notes: req.notes,
        tags: req.tags.map(clean_tags),
    };

    let contact = Contact::update(&state.db, auth.tenant_id, id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Contact"))?;

    state.hub.emit(
        auth.tenant_id,
        EntityKind::Contact,
        ChangeAction::Updated,
        contact.id,
        &contact,
    );

    Ok(Json(contact))
}

/// Delete a contact
///
/// Agents may delete contacts they created; admins may delete any. Calls,
/// messages and voicemails that referenced the contact are kept and unlinked.
pub async fn delete_contact(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let contact = Contact::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Contact"))?;

    require_ownership_or_admin(&auth, contact.created_by)?;

    if !Contact::delete(&state.db, auth.tenant_id, id).await? {
        return Err(ApiError::not_found("Contact"));
    }

    tracing::info!(contact_id = %id, user_id = %auth.user_id, "Contact deleted");
    state
        .hub
        .emit_deleted(auth.tenant_id, EntityKind::Contact, id);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn contact_calls(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<Call>>> {
    // 404 rather than an empty page for another tenant's contact
    Contact::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Contact"))?;

    let page = Call::list_by_contact(&state.db, auth.tenant_id, id, &params).await?;
    Ok(Json(page))
}

pub async fn contact_messages(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<Message>>> {
    Contact::find_by_id(&state.db, auth.tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Contact"))?;

    let filter = MessageFilter {
        contact_id: Some(id),
        q: None,
    };
    let page = Message::list(&state.db, auth.tenant_id, &filter, &params).await?;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tags() {
        let tags = vec![
            " vip ".to_string(),
            "".to_string(),
            "vip".to_string(),
            "west".to_string(),
        ];
        assert_eq!(clean_tags(tags), vec!["vip", "west"]);
    }

    #[test]
    fn test_create_request_validation() {
        let req = CreateContactRequest {
            first_name: "".to_string(),
            last_name: None,
            phone: "not a phone".to_string(),
            email: Some("nope".to_string()),
            company: None,
            notes: None,
            tags: vec![],
        };

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("phone"));
        assert!(fields.contains_key("email"));
    }

    #[test]
    fn test_update_request_allows_empty() {
        let req = UpdateContactRequest {
            first_name: None,
            last_name: None,
            phone: None,
            email: None,
            company: None,
            notes: None,
            tags: None,
        };
        assert!(req.validate().is_ok());
    }
}
