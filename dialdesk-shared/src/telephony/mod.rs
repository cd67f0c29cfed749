/// Voice provider integration
///
/// Calls and SMS go through a Twilio-compatible REST API. Media never passes
/// through DialDesk: the provider places the call, runs the call
/// instructions ([`twiml`]) and reports progress back through signed
/// webhooks.
///
/// # Modules
///
/// - [`http`]: REST client implementing [`VoiceProvider`]
/// - [`mock`]: in-memory provider for tests and local runs
/// - [`token`]: browser voice access tokens
/// - [`twiml`]: call instruction documents
///
/// # Example
///
/// ```no_run
/// use dialdesk_shared::telephony::{PlaceCallRequest, TelephonyConfig, VoiceProvider};
/// use dialdesk_shared::telephony::http::HttpVoiceProvider;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = TelephonyConfig::from_env()?;
/// let provider = HttpVoiceProvider::new(config.clone())?;
///
/// let call = provider
///     .place_call(&PlaceCallRequest::new("+15550001111", "+15550002222", "<Response/>"))
///     .await?;
/// provider.hangup(&call.sid).await?;
/// # Ok(())
/// # }
/// ```

pub mod http;
pub mod mock;
pub mod token;
pub mod twiml;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use thiserror::Error;

use twiml::{RenderError, VoiceResponse};

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Voice provider request failed: {0}")]
    Transport(String),

    #[error("Voice provider rejected the request ({status}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Unexpected voice provider response: {0}")]
    Decode(String),

    #[error("Voice provider configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Document(#[from] RenderError),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider credentials and webhook addressing
#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    /// REST base, e.g. `https://api.twilio.com/2010-04-01`
    pub api_base: String,

    pub account_sid: String,

    /// Also the key for webhook signatures
    pub auth_token: String,

    /// API key pair and app used to mint browser voice tokens
    pub api_key_sid: Option<String>,
    pub api_key_secret: Option<String>,
    pub twiml_app_sid: Option<String>,

    /// Public base URL the provider calls webhooks on
    pub public_base_url: String,
}

impl TelephonyConfig {
    /// Loads the configuration from the environment
    ///
    /// # Environment Variables
    ///
    /// - `TELEPHONY_ACCOUNT_SID`, `TELEPHONY_AUTH_TOKEN`, `PUBLIC_BASE_URL` (required)
    /// - `TELEPHONY_API_BASE` (default: [`DEFAULT_API_BASE`])
    /// - `TELEPHONY_API_KEY_SID`, `TELEPHONY_API_KEY_SECRET`, `TELEPHONY_TWIML_APP_SID`
    ///   (optional; voice tokens are unavailable without them)
    pub fn from_env() -> ProviderResult<Self> {
        dotenvy::dotenv().ok();

        let required = |name: &str| {
            env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ProviderError::Config(format!("{} is required", name)))
        };
        let optional = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_base: optional("TELEPHONY_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            account_sid: required("TELEPHONY_ACCOUNT_SID")?,
            auth_token: required("TELEPHONY_AUTH_TOKEN")?,
            api_key_sid: optional("TELEPHONY_API_KEY_SID"),
            api_key_secret: optional("TELEPHONY_API_KEY_SECRET"),
            twiml_app_sid: optional("TELEPHONY_TWIML_APP_SID"),
            public_base_url: required("PUBLIC_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Absolute URL of a webhook path such as `/webhooks/voice/status`
    pub fn webhook_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path.trim_start_matches('/'))
    }

    /// Whether voice tokens can be minted
    pub fn voice_tokens_enabled(&self) -> bool {
        self.api_key_sid.is_some() && self.api_key_secret.is_some() && self.twiml_app_sid.is_some()
    }
}

/// Which [`VoiceProvider`] implementation a binary runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Http,
    Mock,
}

impl ProviderKind {
    pub fn parse(value: &str) -> ProviderResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "http" | "twilio" => Ok(ProviderKind::Http),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(ProviderError::Config(format!(
                "Unknown TELEPHONY_PROVIDER: {}",
                other
            ))),
        }
    }

    /// Reads `TELEPHONY_PROVIDER` (default `http`)
    pub fn from_env() -> ProviderResult<Self> {
        Self::parse(&env::var("TELEPHONY_PROVIDER").unwrap_or_default())
    }

    pub fn build(self, config: &TelephonyConfig) -> ProviderResult<Arc<dyn VoiceProvider>> {
        match self {
            ProviderKind::Http => Ok(Arc::new(http::HttpVoiceProvider::new(config.clone())?)),
            ProviderKind::Mock => {
                tracing::warn!("Using the mock voice provider; no calls will be placed");
                Ok(Arc::new(mock::MockVoiceProvider::new()))
            }
        }
    }
}

/// Answering machine detection mode for an outbound call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineDetection {
    /// Report human/machine as soon as it is known
    Enable,

    /// Wait for the greeting to end so a voicemail can be dropped after the beep
    DetectMessageEnd,
}

impl MachineDetection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineDetection::Enable => "Enable",
            MachineDetection::DetectMessageEnd => "DetectMessageEnd",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCallRequest {
    pub to: String,
    pub from: String,

    /// Instructions run once the callee answers
    pub twiml: String,

    pub status_callback: Option<String>,

    /// Detection runs asynchronously; the result is posted to `amd_callback`
    pub machine_detection: Option<MachineDetection>,
    pub amd_callback: Option<String>,

    /// Records the call and posts the finished recording here
    pub recording_callback: Option<String>,

    pub timeout_secs: Option<u32>,
}

impl PlaceCallRequest {
    pub fn new(to: impl Into<String>, from: impl Into<String>, twiml: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            from: from.into(),
            twiml: twiml.into(),
            status_callback: None,
            machine_detection: None,
            amd_callback: None,
            recording_callback: None,
            timeout_secs: None,
        }
    }

    /// Form body for `POST .../Calls.json`
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("To", self.to.clone()),
            ("From", self.from.clone()),
            ("Twiml", self.twiml.clone()),
        ];

        if let Some(url) = &self.status_callback {
            form.push(("StatusCallback", url.clone()));
            form.push(("StatusCallbackMethod", "POST".to_string()));
            for event in ["initiated", "ringing", "answered", "completed"] {
                form.push(("StatusCallbackEvent", event.to_string()));
            }
        }

        if let Some(mode) = self.machine_detection {
            form.push(("MachineDetection", mode.as_str().to_string()));
            form.push(("AsyncAmd", "true".to_string()));
            if let Some(url) = &self.amd_callback {
                form.push(("AsyncAmdStatusCallback", url.clone()));
                form.push(("AsyncAmdStatusCallbackMethod", "POST".to_string()));
            }
        }

        if let Some(url) = &self.recording_callback {
            form.push(("Record", "true".to_string()));
            form.push(("RecordingStatusCallback", url.clone()));
        }

        if let Some(secs) = self.timeout_secs {
            form.push(("Timeout", secs.to_string()));
        }

        form
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendSmsRequest {
    pub to: String,
    pub from: String,
    pub body: String,
    pub status_callback: Option<String>,
}

impl SendSmsRequest {
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("To", self.to.clone()),
            ("From", self.from.clone()),
            ("Body", self.body.clone()),
        ];
        if let Some(url) = &self.status_callback {
            form.push(("StatusCallback", url.clone()));
        }
        form
    }
}

/// Call as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResource {
    pub sid: String,
    pub status: String,
}

/// Message as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResource {
    pub sid: String,
    pub status: String,
}

/// Operations DialDesk needs from the voice provider
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    async fn place_call(&self, request: &PlaceCallRequest) -> ProviderResult<CallResource>;

    /// Replaces the instructions of a live call
    async fn redirect(&self, call_sid: &str, twiml: &str) -> ProviderResult<()>;

    /// Ends a live call; ending an already finished call is not an error
    async fn hangup(&self, call_sid: &str) -> ProviderResult<()>;

    async fn send_sms(&self, request: &SendSmsRequest) -> ProviderResult<MessageResource>;

    /// Connects an answered call to an agent's browser client
    async fn bridge_to_client(&self, call_sid: &str, identity: &str) -> ProviderResult<()> {
        let twiml = VoiceResponse::new().dial_client(identity).render()?;
        self.redirect(call_sid, &twiml).await
    }

    /// Plays a recorded message to an answering machine, then hangs up
    async fn drop_voicemail(&self, call_sid: &str, audio_url: &str) -> ProviderResult<()> {
        let twiml = VoiceResponse::new().play(audio_url).hangup().render()?;
        self.redirect(call_sid, &twiml).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TelephonyConfig {
        TelephonyConfig {
            api_base: DEFAULT_API_BASE.to_string(),
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            api_key_sid: None,
            api_key_secret: None,
            twiml_app_sid: None,
            public_base_url: "https://dialdesk.example.com".to_string(),
        }
    }

    #[test]
    fn test_webhook_url() {
        let config = config();
        assert_eq!(
            config.webhook_url("/webhooks/voice/status"),
            "https://dialdesk.example.com/webhooks/voice/status"
        );
        assert_eq!(
            config.webhook_url("webhooks/sms/status"),
            "https://dialdesk.example.com/webhooks/sms/status"
        );
        assert!(!config.voice_tokens_enabled());
    }

    #[test]
    fn test_provider_kind() {
        assert_eq!(ProviderKind::parse("").unwrap(), ProviderKind::Http);
        assert_eq!(ProviderKind::parse("Twilio").unwrap(), ProviderKind::Http);
        assert_eq!(ProviderKind::parse(" mock ").unwrap(), ProviderKind::Mock);
        assert!(matches!(
            ProviderKind::parse("carrier-pigeon"),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn test_place_call_form() {
        let mut request = PlaceCallRequest::new("+15550001111", "+15550002222", "<Response/>");
        assert_eq!(request.form().len(), 3);

        request.status_callback = Some("https://x/status".to_string());
        request.machine_detection = Some(MachineDetection::DetectMessageEnd);
        request.amd_callback = Some("https://x/amd".to_string());
        request.recording_callback = Some("https://x/rec".to_string());

        let form = request.form();
        let get = |name: &str| {
            form.iter()
                .filter(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(get("MachineDetection"), vec!["DetectMessageEnd"]);
        assert_eq!(get("AsyncAmd"), vec!["true"]);
        assert_eq!(get("AsyncAmdStatusCallback"), vec!["https://x/amd"]);
        assert_eq!(get("StatusCallbackEvent").len(), 4);
        assert_eq!(get("Record"), vec!["true"]);
        assert_eq!(get("RecordingStatusCallback"), vec!["https://x/rec"]);
        assert!(get("Timeout").is_empty());
    }
}
