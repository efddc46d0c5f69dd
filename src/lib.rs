//! # agent-dispatch
//!
//! An emergency-dispatch orchestrator for networks of A2A agents.
//!
//! A caller sends a free-text emergency request to the operator. The operator
//! discovers the responder agents listed in a registry, decides which of them
//! the request concerns, and contacts each of them in turn, streaming progress
//! back to the caller as it goes.
//!
//! - [`registry`] — the in-memory agent registry service and its client
//! - [`a2a`] — A2A wire types and the peer HTTP client
//! - [`dispatch`] — directory cache, matching, sequencing and invocation
//! - [`server`] — the operator's A2A HTTP surface

pub mod a2a;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod registry;
pub mod server;

pub use config::DispatchConfig;
pub use dispatch::{DispatchTask, Orchestrator, PeerDirectoryCache};
pub use errors::{DispatchError, RegistryError, TransportError};

/// Crate version advertised on the agent card and `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
