//! Agent registry: the directory peers register with and discovery reads.
//!
//! The store and routes make up the standalone registry service
//! (`src/bin/registry.rs`); the client is what agents use to talk to it.

pub mod client;
pub mod routes;
pub mod store;

pub use client::{ListedAgent, RegistryClient};
pub use routes::{registry_router, RegistryState};
pub use store::{AgentEntry, RegistryStore};
