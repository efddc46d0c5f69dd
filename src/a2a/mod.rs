//! A2A (Agent-to-Agent) protocol module.
//!
//! Wire types, JSON-RPC error codes and the HTTP client used to resolve peer
//! cards and send messages to peers.

pub mod client;
pub mod errors;
pub mod types;

pub use client::{normalize_reply, A2AClient, PeerReply, AGENT_CARD_PATH};
pub use errors::{A2AError, A2AErrorCode};
pub use types::{A2AMessage, A2ATaskState, AgentCard, AgentSkill, Part, Role};

/// Normalize an agent address: trim whitespace and trailing slashes.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
