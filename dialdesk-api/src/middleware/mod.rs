/// Middleware for the API server
///
/// Authentication lives in `dialdesk_shared::auth::middleware`; this module
/// holds the response-level layers.

pub mod security;
