/// Identity-provider token validation
///
/// Users sign in at an external identity provider, which issues HS256 access
/// tokens signed with a secret shared with this service. This module only
/// validates those tokens; mapping the subject to a tenant user happens in
/// [`super::middleware`].
///
/// # Validation
///
/// - **Algorithm**: HS256 only
/// - **Issuer / audience**: must match [`JwtConfig`]
/// - **Time**: `exp` and `nbf` enforced with the library's default leeway
///
/// [`create_token`] mints tokens in the same format for tests and local
/// tooling.
///
/// # Example
///
/// ```
/// use dialdesk_shared::auth::jwt::{create_token, validate_token, Claims, JwtConfig};
/// use chrono::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = JwtConfig {
///     secret: "a-shared-secret-of-at-least-32-bytes!".to_string(),
///     issuer: "https://id.example.com/".to_string(),
///     audience: "dialdesk".to_string(),
/// };
///
/// let claims = Claims::new("idp|42", &config, Duration::hours(1));
/// let token = create_token(&claims, &config.secret)?;
///
/// let validated = validate_token(&token, &config)?;
/// assert_eq!(validated.sub, "idp|42");
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Minimum accepted length of the shared signing secret
pub const MIN_SECRET_LEN: usize = 32;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token is not valid yet")]
    Immature,

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Invalid audience")]
    InvalidAudience,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Expected issuer, audience and the shared secret
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// `aud` may be a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(a) => a == audience,
            Audience::Many(list) => list.iter().any(|a| a == audience),
        }
    }
}

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity-provider subject, matched against `users.external_id`
    pub sub: String,

    pub iss: String,
    pub aud: Audience,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,

    /// Email as asserted by the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Claims {
    /// Builds claims for `sub` that are valid from now for `expires_in`
    pub fn new(sub: impl Into<String>, config: &JwtConfig, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: sub.into(),
            iss: config.issuer.clone(),
            aud: Audience::One(config.audience.clone()),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            email: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Validates an access token and returns its claims
///
/// # Errors
///
/// Returns a specific [`JwtError`] variant for expired, immature, wrong
/// issuer, wrong audience and bad signature; anything else is
/// [`JwtError::Invalid`].
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(config.secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[config.issuer.as_str()]);
    validation.set_audience(&[config.audience.as_str()]);
    validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::ImmatureSignature => JwtError::Immature,
            ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            ErrorKind::InvalidAudience => JwtError::InvalidAudience,
            ErrorKind::InvalidSignature => JwtError::InvalidSignature,
            _ => JwtError::Invalid(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-key-at-least-32-bytes-long".to_string(),
            issuer: "https://id.example.com/".to_string(),
            audience: "dialdesk".to_string(),
        }
    }

    #[test]
    fn test_create_and_validate_token() {
        let config = config();
        let claims = Claims::new("idp|user-1", &config, Duration::hours(1));
        let token = create_token(&claims, &config.secret).expect("Should create token");

        let validated = validate_token(&token, &config).expect("Should validate token");
        assert_eq!(validated.sub, "idp|user-1");
        assert_eq!(validated.iss, config.issuer);
        assert!(validated.aud.contains("dialdesk"));
        assert!(!validated.is_expired());
    }

    #[test]
    fn test_wrong_secret() {
        let config = config();
        let claims = Claims::new("idp|user-1", &config, Duration::hours(1));
        let token = create_token(&claims, "another-secret-that-is-long-enough!!").unwrap();

        assert!(matches!(
            validate_token(&token, &config),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_expired_token() {
        let config = config();
        let claims = Claims::new("idp|user-1", &config, Duration::seconds(-3600));
        assert!(claims.is_expired());

        let token = create_token(&claims, &config.secret).unwrap();
        assert!(matches!(validate_token(&token, &config), Err(JwtError::Expired)));
    }

    #[test]
    fn test_not_yet_valid_token() {
        let config = config();
        let mut claims = Claims::new("idp|user-1", &config, Duration::hours(2));
        claims.nbf = (Utc::now() + Duration::hours(1)).timestamp();

        let token = create_token(&claims, &config.secret).unwrap();
        assert!(matches!(validate_token(&token, &config), Err(JwtError::Immature)));
    }

    #[test]
    fn test_wrong_issuer_and_audience() {
        let config = config();

        let mut claims = Claims::new("idp|user-1", &config, Duration::hours(1));
        claims.iss = "https://evil.example.com/".to_string();
        let token = create_token(&claims, &config.secret).unwrap();
        assert!(matches!(validate_token(&token, &config), Err(JwtError::InvalidIssuer)));

        let mut claims = Claims::new("idp|user-1", &config, Duration::hours(1));
        claims.aud = Audience::Many(vec!["billing".to_string()]);
        let token = create_token(&claims, &config.secret).unwrap();
        assert!(matches!(validate_token(&token, &config), Err(JwtError::InvalidAudience)));
    }

    #[test]
    fn test_audience_list_accepted() {
        let config = config();
        let mut claims = Claims::new("idp|user-1", &config, Duration::hours(1));
        claims.aud = Audience::Many(vec!["billing".to_string(), "dialdesk".to_string()]);

        let token = create_token(&claims, &config.secret).unwrap();
        assert!(validate_token(&token, &config).is_ok());
    }

    #[test]
    fn test_garbage_token() {
        assert!(matches!(
            validate_token("not.a.token", &config()),
            Err(JwtError::Invalid(_))
        ));
    }
}
