//! HTTP client for A2A peers: agent card resolution and `message/send`.
//!
//! Every response shape a peer can produce is collapsed into [`PeerReply`]
//! here, so nothing above this module inspects JSON-RPC envelopes.

use std::time::Duration;

use serde_json::Value;

use super::types::{A2AMessage, A2ATaskState, AgentCard};
use super::normalize_url;
use crate::errors::{RegistryError, TransportError};

/// Well-known path of an agent's card, relative to its base address.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// Text reported for a peer that answered without any readable text.
pub const DEFAULT_ACK: &str = "Acknowledged";

// ---------------------------------------------------------------------------
// Normalized replies
// ---------------------------------------------------------------------------

/// A peer's answer to `message/send`, reduced to what dispatch cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerReply {
    /// The peer accepted the message; carries a short acknowledgment text.
    Success(String),
    /// The peer answered with an error or a failed task.
    Error(String),
    /// The peer answered with something this client does not recognize.
    Unknown(Value),
}

/// Normalize a JSON-RPC response body into a [`PeerReply`].
pub fn normalize_reply(body: &Value) -> PeerReply {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return PeerReply::Error(message);
    }

    let Some(result) = body.get("result") else {
        return PeerReply::Unknown(body.clone());
    };

    match result.get("kind").and_then(Value::as_str) {
        Some("task") | Some("status-update") => {
            let status = result.get("status");
            let state = status
                .and_then(|s| s.get("state"))
                .and_then(|s| serde_json::from_value::<A2ATaskState>(s.clone()).ok())
                .unwrap_or(A2ATaskState::Unknown);
            let text = status
                .and_then(|s| s.get("message"))
                .and_then(|m| first_text(m.get("parts")))
                .or_else(|| {
                    result
                        .get("artifacts")
                        .and_then(Value::as_array)
                        .and_then(|arr| arr.first())
                        .and_then(|a| first_text(a.get("parts")))
                });
            if state.is_failure() {
                PeerReply::Error(text.unwrap_or_else(|| format!("peer reported task {:?}", state)))
            } else {
                PeerReply::Success(text.unwrap_or_else(|| DEFAULT_ACK.to_string()))
            }
        }
        Some("message") => PeerReply::Success(
            first_text(result.get("parts")).unwrap_or_else(|| DEFAULT_ACK.to_string()),
        ),
        _ => PeerReply::Unknown(result.clone()),
    }
}

fn first_text(parts: Option<&Value>) -> Option<String> {
    parts?
        .as_array()?
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// A2A Client
// ---------------------------------------------------------------------------

/// Client for communicating with remote A2A agents.
///
/// Wraps one pooled `reqwest::Client`; cheap to clone.
#[derive(Debug, Clone)]
pub struct A2AClient {
    http: reqwest::Client,
}

impl A2AClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Retrieve the agent card published at `address`.
    pub async fn get_agent_card(&self, address: &str) -> Result<AgentCard, RegistryError> {
        let url = format!("{}{}", normalize_url(address), AGENT_CARD_PATH);
        log::debug!("Fetching agent card from: {}", url);

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RegistryError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        let body: Value = resp.json().await?;
        let card: AgentCard =
            serde_json::from_value(body).map_err(|e| RegistryError::MalformedCard {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        if card.name.trim().is_empty() {
            return Err(RegistryError::MalformedCard {
                address: address.to_string(),
                reason: "card has an empty name".to_string(),
            });
        }
        Ok(card)
    }

    /// Post a JSON-RPC `message/send` request to `endpoint`.
    pub async fn send_message(
        &self,
        endpoint: &str,
        message: A2AMessage,
    ) -> Result<PeerReply, TransportError> {
        log::debug!(
            "Sending A2A message to {} (context_id={:?})",
            endpoint,
            message.context_id
        );

        let rpc_body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "message/send",
            "id": uuid::Uuid::new_v4().simple().to_string(),
            "params": { "message": message },
        });

        let resp = self
            .http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(&rpc_body)
            .send()
            .await
            .map_err(|source| TransportError::Connect {
                address: endpoint.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                address: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let text = resp.text().await.map_err(|source| TransportError::Connect {
            address: endpoint.to_string(),
            source,
        })?;
        let body: Value = serde_json::from_str(&text).map_err(|e| TransportError::Protocol {
            address: endpoint.to_string(),
            reason: format!("response is not JSON: {}", e),
        })?;

        Ok(normalize_reply(&body))
    }
}
