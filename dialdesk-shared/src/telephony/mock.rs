/// In-memory voice provider
///
/// Records every operation instead of calling out, and hands out random
/// SIDs in the provider's format (`CA` or `SM` and 32 hex digits). Numbers registered with
/// [`MockVoiceProvider::fail_number`] are rejected with a provider error,
/// which lets tests exercise per-line failure handling.
///
/// Selected with `TELEPHONY_PROVIDER=mock` for local development.
///
/// # Example
///
/// ```
/// use dialdesk_shared::telephony::mock::{MockVoiceProvider, ProviderOp};
/// use dialdesk_shared::telephony::{PlaceCallRequest, VoiceProvider};
///
/// # async fn example() {
/// let provider = MockVoiceProvider::new();
/// let call = provider
///     .place_call(&PlaceCallRequest::new("+15550001111", "+15550002222", "<Response/>"))
///     .await
///     .unwrap();
///
/// provider.hangup(&call.sid).await.unwrap();
/// assert_eq!(provider.operations().len(), 2);
/// # }
/// ```

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    CallResource, MessageResource, PlaceCallRequest, ProviderError, ProviderResult,
    SendSmsRequest, VoiceProvider,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOp {
    PlaceCall(PlaceCallRequest),
    Redirect { call_sid: String, twiml: String },
    Hangup(String),
    SendSms(SendSmsRequest),
}

#[derive(Debug, Default)]
struct MockState {
    operations: Vec<ProviderOp>,
    failing_numbers: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockVoiceProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockVoiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes calls and messages to `number` fail
    pub fn fail_number(&self, number: impl Into<String>) {
        self.lock().failing_numbers.insert(number.into());
    }

    pub fn operations(&self) -> Vec<ProviderOp> {
        self.lock().operations.clone()
    }

    pub fn placed_calls(&self) -> Vec<PlaceCallRequest> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                ProviderOp::PlaceCall(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn hangups(&self) -> Vec<String> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                ProviderOp::Hangup(sid) => Some(sid.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn redirects(&self) -> Vec<(String, String)> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                ProviderOp::Redirect { call_sid, twiml } => Some((call_sid.clone(), twiml.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.lock().operations.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_sid(prefix: &str) -> String {
        format!("{}{}", prefix, Uuid::new_v4().simple())
    }

    fn check_number(&self, number: &str) -> ProviderResult<()> {
        if self.lock().failing_numbers.contains(number) {
            return Err(ProviderError::Api {
                status: 400,
                code: Some(21211),
                message: format!("The 'To' number {} is not a valid phone number.", number),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceProvider for MockVoiceProvider {
    async fn place_call(&self, request: &PlaceCallRequest) -> ProviderResult<CallResource> {
        self.lock().operations.push(ProviderOp::PlaceCall(request.clone()));
        self.check_number(&request.to)?;

        Ok(CallResource {
            sid: Self::next_sid("CA"),
            status: "queued".to_string(),
        })
    }

    async fn redirect(&self, call_sid: &str, twiml: &str) -> ProviderResult<()> {
        self.lock().operations.push(ProviderOp::Redirect {
            call_sid: call_sid.to_string(),
            twiml: twiml.to_string(),
        });
        Ok(())
    }

    async fn hangup(&self, call_sid: &str) -> ProviderResult<()> {
        self.lock()
            .operations
            .push(ProviderOp::Hangup(call_sid.to_string()));
        Ok(())
    }

    async fn send_sms(&self, request: &SendSmsRequest) -> ProviderResult<MessageResource> {
        self.lock().operations.push(ProviderOp::SendSms(request.clone()));
        self.check_number(&request.to)?;

        Ok(MessageResource {
            sid: Self::next_sid("SM"),
            status: "queued".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_distinct_sids() {
        let provider = MockVoiceProvider::new();
        let request = PlaceCallRequest::new("+15550001111", "+15550002222", "<Response/>");

        let a = provider.place_call(&request).await.unwrap();
        let b = provider.place_call(&request).await.unwrap();
        assert!(a.sid.starts_with("CA"));
        assert_eq!(a.sid.len(), 34);
        assert_ne!(a.sid, b.sid);
        assert_eq!(provider.placed_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_number() {
        let provider = MockVoiceProvider::new();
        provider.fail_number("+15550009999");

        let err = provider
            .place_call(&PlaceCallRequest::new("+15550009999", "+15550002222", "<Response/>"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 400, .. }));

        // The attempt is still recorded
        assert_eq!(provider.placed_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_bridge_and_voicemail_drop_redirect() {
        let provider = MockVoiceProvider::new();
        provider.bridge_to_client("CA1", "agent_abc").await.unwrap();
        provider
            .drop_voicemail("CA2", "https://cdn.example.com/vm.mp3")
            .await
            .unwrap();

        let redirects = provider.redirects();
        assert_eq!(redirects.len(), 2);
        assert_eq!(redirects[0].0, "CA1");
        assert!(redirects[0].1.contains("<Client>agent_abc</Client>"));
        assert_eq!(redirects[1].0, "CA2");
        assert!(redirects[1].1.contains("<Play>https://cdn.example.com/vm.mp3</Play><Hangup/>"));
    }
}
