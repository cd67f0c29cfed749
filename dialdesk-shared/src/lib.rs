//! # DialDesk Shared Library
//!
//! Types, storage and integrations shared by the DialDesk API server and the
//! parallel dialer.
//!
//! ## Module Organization
//!
//! - `db`: Connection pool and migrations
//! - `models`: Tenant-scoped entities and their queries
//! - `auth`: Identity-provider token validation, auth context, roles, webhook signatures
//! - `phone`: E.164 phone normalization
//! - `events`: Row-level change events broadcast to live clients
//! - `redis`: Redis client and change-event bridge
//! - `telephony`: Voice provider REST client, access tokens and call instructions

pub mod auth;
pub mod db;
pub mod events;
pub mod models;
pub mod phone;
pub mod redis;
pub mod telephony;

/// Current version of the DialDesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
