/// REST client for the voice provider
///
/// Requests are form-encoded and authenticated with HTTP basic auth
/// (account SID and auth token); responses are JSON. Failed requests are
/// decoded into [`ProviderError::Api`] with the provider's error code and
/// message when the body carries them.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{
    CallResource, MessageResource, PlaceCallRequest, ProviderError, ProviderResult,
    SendSmsRequest, TelephonyConfig, VoiceProvider,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Error code returned when updating a call that is no longer in progress
const CALL_NOT_IN_PROGRESS: i64 = 21220;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct HttpVoiceProvider {
    client: Client,
    config: TelephonyConfig,
}

impl HttpVoiceProvider {
    pub fn new(config: TelephonyConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TelephonyConfig {
        &self.config
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/Accounts/{}/{}",
            self.config.api_base, self.config.account_sid, path
        )
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&'static str, String)],
    ) -> ProviderResult<T> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let response = check_status(response).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

async fn check_status(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(api_error(status, &text))
}

fn api_error(status: StatusCode, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let code = parsed.as_ref().and_then(|b| b.code);
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    ProviderError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl VoiceProvider for HttpVoiceProvider {
    async fn place_call(&self, request: &PlaceCallRequest) -> ProviderResult<CallResource> {
        let call: CallResource = self
            .post_form(&self.account_url("Calls.json"), &request.form())
            .await?;

        tracing::debug!(call_sid = %call.sid, to = %request.to, "Placed call");
        Ok(call)
    }

    async fn redirect(&self, call_sid: &str, twiml: &str) -> ProviderResult<()> {
        let url = self.account_url(&format!("Calls/{}.json", call_sid));
        let _: CallResource = self.post_form(&url, &[("Twiml", twiml.to_string())]).await?;
        Ok(())
    }

    async fn hangup(&self, call_sid: &str) -> ProviderResult<()> {
        let url = self.account_url(&format!("Calls/{}.json", call_sid));
        let result: ProviderResult<CallResource> = self
            .post_form(&url, &[("Status", "completed".to_string())])
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(ProviderError::Api {
                code: Some(CALL_NOT_IN_PROGRESS),
                ..
            }) => {
                tracing::debug!(call_sid, "Hangup of finished call ignored");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn send_sms(&self, request: &SendSmsRequest) -> ProviderResult<MessageResource> {
        self.post_form(&self.account_url("Messages.json"), &request.form())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HttpVoiceProvider {
        HttpVoiceProvider::new(TelephonyConfig {
            api_base: "https://api.example.com/2010-04-01".to_string(),
            account_sid: "AC123".to_string(),
            auth_token: "token".to_string(),
            api_key_sid: None,
            api_key_secret: None,
            twiml_app_sid: None,
            public_base_url: "https://dialdesk.example.com".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_account_url() {
        assert_eq!(
            provider().account_url("Calls/CA1.json"),
            "https://api.example.com/2010-04-01/Accounts/AC123/Calls/CA1.json"
        );
    }

    #[test]
    fn test_api_error_with_body() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code": 21211, "message": "The 'To' number is not a valid phone number.", "status": 400}"#,
        );
        assert_eq!(
            err,
            ProviderError::Api {
                status: 400,
                code: Some(21211),
                message: "The 'To' number is not a valid phone number.".to_string(),
            }
        );
    }

    #[test]
    fn test_api_error_without_body() {
        let err = api_error(StatusCode::SERVICE_UNAVAILABLE, "<html>oops</html>");
        assert_eq!(
            err,
            ProviderError::Api {
                status: 503,
                code: None,
                message: "Service Unavailable".to_string(),
            }
        );
    }
}
