//! # DialDesk API Server Library
//!
//! Tenant-scoped REST API, live updates over WebSocket and voice provider
//! webhooks for DialDesk.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration from the environment
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Response security headers
//! - `routes`: Route handlers, one module per resource

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
