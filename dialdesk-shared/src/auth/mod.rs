/// Authentication and authorization
///
/// # Modules
///
/// - [`jwt`]: identity-provider access token validation
/// - [`middleware`]: Axum middleware resolving the token to a tenant user
/// - [`authorization`]: role checks
/// - [`webhook`]: voice provider webhook signature verification
///
/// # Example
///
/// ```
/// use dialdesk_shared::auth::webhook::{compute_signature, verify_signature};
///
/// let params = vec![("CallSid".to_string(), "CA123".to_string())];
/// let url = "https://api.example.com/webhooks/voice/status";
/// let signature = compute_signature("auth-token", url, &params);
/// assert!(verify_signature("auth-token", url, &params, &signature));
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod webhook;
