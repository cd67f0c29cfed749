/// Voice provider webhooks
///
/// The provider posts form-encoded callbacks signed with the account auth
/// token. These routes sit outside `/v1` and do not take a bearer token;
/// [`SignedForm`] checks the `X-Twilio-Signature` header instead.
///
/// Voice routes that steer a live call answer with TwiML; pure
/// notifications answer 204.

pub mod sms;
pub mod voice;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    async_trait,
    extract::{FromRequest, OriginalUri, Request},
    http::header,
    response::{IntoResponse, Response},
    Form,
};
use dialdesk_shared::{
    auth::webhook::{verify_signature, SIGNATURE_HEADER},
    telephony::twiml::VoiceResponse,
};

/// Form parameters of a webhook whose signature has been checked
///
/// Verification covers the public URL of the request (base URL from the
/// configuration, path and query from the request) and every body
/// parameter. It is skipped when `WEBHOOK_VALIDATE_SIGNATURES=false`.
#[derive(Debug, Clone)]
pub struct SignedForm(pub Vec<(String, String)>);

impl SignedForm {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// A parameter the provider always sends; 400 if it is missing
    pub fn require(&self, name: &str) -> ApiResult<&str> {
        self.get(name)
            .ok_or_else(|| ApiError::BadRequest(format!("Missing parameter {}", name)))
    }

    /// Parses an integer parameter, ignoring malformed values
    pub fn get_i32(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|v| v.parse().ok())
    }
}

#[async_trait]
impl FromRequest<AppState> for SignedForm {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        // Nested routers see a stripped path; the signature covers the full one
        let path_and_query = req
            .extensions()
            .get::<OriginalUri>()
            .map(|uri| uri.0.clone())
            .unwrap_or_else(|| req.uri().clone())
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();

        let signature = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Form(params) = Form::<Vec<(String, String)>>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        if state.config.api.validate_webhook_signatures {
            let url = state.webhook_url(&path_and_query);
            let valid = signature.as_deref().is_some_and(|sig| {
                verify_signature(&state.config.telephony.auth_token, &url, &params, sig)
            });

            if !valid {
                tracing::warn!(url = %url, "Rejected webhook with invalid signature");
                return Err(ApiError::Forbidden("Invalid webhook signature".to_string()));
            }
        }

        Ok(SignedForm(params))
    }
}

/// TwiML document response, rendered when the response is sent
#[derive(Debug, Clone)]
pub struct Twiml(pub VoiceResponse);

impl From<VoiceResponse> for Twiml {
    fn from(response: VoiceResponse) -> Self {
        Twiml(response)
    }
}

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(xml) => ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml).into_response(),
            Err(e) => ApiError::InternalError(e.to_string()).into_response(),
        }
    }
}
