/// API route handlers, one module per resource
///
/// Every `/v1` handler receives the caller's [`AuthContext`] and scopes its
/// queries by `auth.tenant_id`. A row that belongs to another tenant is
/// reported exactly like a missing one.
///
/// [`AuthContext`]: dialdesk_shared::auth::middleware::AuthContext

pub mod calls;
pub mod contacts;
pub mod dialer;
pub mod health;
pub mod leads;
pub mod messages;
pub mod recordings;
pub mod settings;
pub mod stats;
pub mod tenant;
pub mod users;
pub mod voice;
pub mod voicemails;
pub mod webhooks;
pub mod ws;

use crate::error::ApiError;
use dialdesk_shared::phone::normalize_e164;
use validator::Validate;

/// Runs `validator` rules on a request body
pub(crate) fn validate<T: Validate>(input: &T) -> Result<(), ApiError> {
    input.validate().map_err(ApiError::from)
}

/// Normalizes a phone number from a request, reporting failures on `field`
pub(crate) fn normalize_phone(field: &str, value: &str) -> Result<String, ApiError> {
    normalize_e164(value).map_err(|e| crate::error::phone_error(field, e))
}

/// Normalizes an optional phone number
pub(crate) fn normalize_phone_opt(
    field: &str,
    value: Option<String>,
) -> Result<Option<String>, ApiError> {
    value.map(|v| normalize_phone(field, &v)).transpose()
}
