/// Browser voice access tokens
///
/// The provider's browser SDK registers with a short-lived JWT signed
/// (HS256) with an API key secret. The header carries
/// `cty: twilio-fpa;v=1` and the payload grants a client identity permission
/// to receive calls and to place calls through a voice application.
///
/// ```json
/// {
///   "jti": "SK...-1700000000",
///   "iss": "SK...",
///   "sub": "AC...",
///   "iat": 1700000000,
///   "exp": 1700003600,
///   "grants": {
///     "identity": "agent_8c1f...",
///     "voice": {
///       "incoming": { "allow": true },
///       "outgoing": { "application_sid": "AP..." }
///     }
///   }
/// }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::{ProviderError, ProviderResult, TelephonyConfig};

pub const CONTENT_TYPE: &str = "twilio-fpa;v=1";

/// Default token lifetime
pub const DEFAULT_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingGrant {
    pub allow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutgoingGrant {
    pub application_sid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceGrant {
    pub incoming: IncomingGrant,
    pub outgoing: OutgoingGrant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Grants {
    pub identity: String,
    pub voice: VoiceGrant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceTokenClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub grants: Grants,
}

/// Issued token with its expiry, as returned to the browser
#[derive(Debug, Clone, Serialize)]
pub struct VoiceToken {
    pub token: String,
    pub identity: String,
    pub expires_in: i64,
}

/// Mints a voice access token for `identity`
///
/// # Errors
///
/// [`ProviderError::Config`] when the API key or voice application is not
/// configured.
pub fn create_voice_token(
    config: &TelephonyConfig,
    identity: &str,
    ttl_secs: i64,
) -> ProviderResult<VoiceToken> {
    let (Some(key_sid), Some(key_secret), Some(app_sid)) = (
        config.api_key_sid.as_deref(),
        config.api_key_secret.as_deref(),
        config.twiml_app_sid.as_deref(),
    ) else {
        return Err(ProviderError::Config(
            "voice tokens require TELEPHONY_API_KEY_SID, TELEPHONY_API_KEY_SECRET and TELEPHONY_TWIML_APP_SID".to_string(),
        ));
    };

    let now = Utc::now();
    let claims = VoiceTokenClaims {
        jti: format!("{}-{}", key_sid, now.timestamp()),
        iss: key_sid.to_string(),
        sub: config.account_sid.clone(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        grants: Grants {
            identity: identity.to_string(),
            voice: VoiceGrant {
                incoming: IncomingGrant { allow: true },
                outgoing: OutgoingGrant {
                    application_sid: app_sid.to_string(),
                },
            },
        },
    };

    let mut header = Header::new(Algorithm::HS256);
    header.cty = Some(CONTENT_TYPE.to_string());

    let token = encode(&header, &claims, &EncodingKey::from_secret(key_secret.as_bytes()))
        .map_err(|e| ProviderError::Config(format!("Failed to sign voice token: {}", e)))?;

    Ok(VoiceToken {
        token,
        identity: identity.to_string(),
        expires_in: ttl_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};

    fn config(with_keys: bool) -> TelephonyConfig {
        TelephonyConfig {
            api_base: super::super::DEFAULT_API_BASE.to_string(),
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            api_key_sid: with_keys.then(|| "SK456".to_string()),
            api_key_secret: with_keys.then(|| "key-secret".to_string()),
            twiml_app_sid: with_keys.then(|| "AP789".to_string()),
            public_base_url: "https://dialdesk.example.com".to_string(),
        }
    }

    #[test]
    fn test_voice_token_claims() {
        let issued = create_voice_token(&config(true), "agent_abc", 600).unwrap();
        assert_eq!(issued.identity, "agent_abc");
        assert_eq!(issued.expires_in, 600);

        let header = decode_header(&issued.token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(header.cty.as_deref(), Some(CONTENT_TYPE));

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        let data = decode::<VoiceTokenClaims>(
            &issued.token,
            &DecodingKey::from_secret(b"key-secret"),
            &validation,
        )
        .unwrap();

        let claims = data.claims;
        assert_eq!(claims.iss, "SK456");
        assert_eq!(claims.sub, "AC123");
        assert!(claims.jti.starts_with("SK456-"));
        assert_eq!(claims.exp - claims.iat, 600);
        assert_eq!(claims.grants.identity, "agent_abc");
        assert!(claims.grants.voice.incoming.allow);
        assert_eq!(claims.grants.voice.outgoing.application_sid, "AP789");
    }

    #[test]
    fn test_voice_token_requires_keys() {
        let err = create_voice_token(&config(false), "agent_abc", 600).unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }
}
