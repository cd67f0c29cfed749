/// Phone number normalization
///
/// Every phone number is stored in E.164 form (`+15551234567`) so that the
/// per-tenant uniqueness constraints on contacts and leads hold regardless of
/// how the number was typed, and so that inbound webhooks can be matched to
/// contacts by exact comparison.
///
/// Numbers without a leading `+` are parsed against the default region
/// (US), which is what the voice provider assumes for national numbers.

use phonenumber::{country, Mode};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while normalizing a phone number
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    /// Input contained only whitespace
    #[error("phone number cannot be empty")]
    Empty,

    /// Input could not be parsed or is not a valid number
    #[error("invalid phone number: {0}")]
    Invalid(String),
}

/// Normalizes a phone number string to E.164 format
///
/// # Example
///
/// ```
/// use dialdesk_shared::phone::normalize_e164;
///
/// assert_eq!(normalize_e164("(415) 555-2671").unwrap(), "+14155552671");
/// assert_eq!(normalize_e164("+44 20 7946 0958").unwrap(), "+442079460958");
/// ```
pub fn normalize_e164(value: &str) -> Result<String, PhoneError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PhoneError::Empty);
    }

    let region = if trimmed.starts_with('+') {
        None
    } else {
        Some(country::Id::US)
    };

    let parsed = phonenumber::parse(region, trimmed)
        .map_err(|_| PhoneError::Invalid(trimmed.to_string()))?;

    if !phonenumber::is_valid(&parsed) {
        return Err(PhoneError::Invalid(trimmed.to_string()));
    }

    Ok(parsed.format().mode(Mode::E164).to_string())
}

/// Normalizes a number if it parses, otherwise returns the trimmed input
///
/// Provider webhooks carry values such as `client:agent_...` or `anonymous`
/// that are not phone numbers but still need to be recorded on the call row.
pub fn normalize_lenient(value: &str) -> String {
    normalize_e164(value).unwrap_or_else(|_| value.trim().to_string())
}

/// Validator hook for request DTOs
pub fn validate_phone(value: &str) -> Result<(), validator::ValidationError> {
    normalize_e164(value).map(|_| ()).map_err(|e| {
        let mut err = validator::ValidationError::new("phone");
        err.message = Some(e.to_string().into());
        err
    })
}

/// E.164 phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parses and normalizes a phone number
    pub fn parse(value: &str) -> Result<Self, PhoneError> {
        normalize_e164(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}
