//! # DialDesk Dialer Library
//!
//! Parallel dialing: claims dial sessions created through the API, places
//! calls for their leads through the voice provider, bridges the first
//! person who answers to the agent and drops voicemails on machines.
//!
//! ## Modules
//!
//! - `config`: environment configuration of the dialer binary
//! - `queue`: claiming pending sessions and loading active ones
//! - `plan`: pure decision logic for one session
//! - `orchestrator`: the reconcile loop

pub mod config;
pub mod orchestrator;
pub mod plan;
pub mod queue;
