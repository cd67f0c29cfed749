/// Database models for DialDesk
///
/// Every model exposes associated async functions that take a `&PgPool`.
/// Functions that act on behalf of a user take the caller's `tenant_id` and
/// include it in the `WHERE` clause, so a row belonging to another tenant is
/// indistinguishable from a missing row.
///
/// # Models
///
/// - `tenant`: customer organizations
/// - `user`: identity-provider users mapped to a tenant and role
/// - `contact`: address book entries, unique by phone within a tenant
/// - `lead`: sales leads worked by agents and the parallel dialer
/// - `call`: inbound and outbound call log
/// - `message`: SMS history
/// - `voicemail`: voicemail inbox
/// - `recording`: call recordings delivered by the voice provider
/// - `settings`: per-tenant telephony settings
/// - `dial_session`: parallel-dial sessions
/// - `pagination`: page parameters and the page envelope
///
/// # Example
///
/// ```no_run
/// use dialdesk_shared::models::contact::{Contact, ContactFilter};
/// use dialdesk_shared::models::pagination::PageParams;
/// use dialdesk_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(tenant_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::from_env()?).await?;
///
/// let filter = ContactFilter { q: Some("acme".into()), ..Default::default() };
/// let page = Contact::list(&pool, tenant_id, &filter, &PageParams::default()).await?;
/// println!("{} of {} contacts", page.items.len(), page.total);
/// # Ok(())
/// # }
/// ```

pub mod call;
pub mod contact;
pub mod dial_session;
pub mod lead;
pub mod message;
pub mod pagination;
pub mod recording;
pub mod settings;
pub mod tenant;
pub mod user;
pub mod voicemail;

use serde::Serialize;

/// Builds an `ILIKE` pattern for a free-text search term
///
/// Returns `None` for blank input so the query skips the predicate. The
/// `LIKE` metacharacters in the term are escaped and match literally.
pub fn search_pattern(term: Option<&str>) -> Option<String> {
    let term = term?.trim();
    if term.is_empty() {
        return None;
    }

    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    Some(escaped)
}

/// A labelled count, used by the stats queries
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_pattern() {
        assert_eq!(search_pattern(None), None);
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(Some(" acme ")), Some("%acme%".to_string()));
        assert_eq!(search_pattern(Some("50%_off")), Some("%50\\%\\_off%".to_string()));
    }
}
