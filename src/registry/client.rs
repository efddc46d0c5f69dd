//! HTTP client for the agent registry service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::a2a::{normalize_url, AgentCard};
use crate::errors::RegistryError;

/// One row of `GET /agents`.
///
/// The card is kept as raw JSON: discovery resolves each peer's card from
/// the peer itself, so a registration with an outdated card shape must not
/// break the listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedAgent {
    pub address: String,
    #[serde(default)]
    pub agent_card: Value,
    #[serde(default)]
    pub registered_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgentsListResponse {
    #[serde(default)]
    agents: Vec<ListedAgent>,
}

/// Client for `register`, `unregister` and `agents` on the registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_url(base_url),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register `card` under `address`.
    pub async fn register(&self, address: &str, card: &AgentCard) -> Result<(), RegistryError> {
        let url = format!("{}/register", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "address": address,
                "agent_card": card,
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RegistryError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        log::info!("Registered {} at {} with registry {}", card.name, address, self.base_url);
        Ok(())
    }

    /// Remove the registration for `address`.
    pub async fn unregister(&self, address: &str) -> Result<(), RegistryError> {
        let url = self.unregister_url(address)?;
        let resp = self.http.delete(url.clone()).send().await?;
        match resp.status() {
            s if s.is_success() => {
                log::info!("Unregistered {} from registry {}", address, self.base_url);
                Ok(())
            }
            reqwest::StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                address: address.to_string(),
            }),
            s => Err(RegistryError::Status {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }

    /// Every registered agent.
    pub async fn list_agents(&self) -> Result<Vec<ListedAgent>, RegistryError> {
        let url = format!("{}/agents", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(RegistryError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        let body: AgentsListResponse = resp.json().await?;
        log::debug!("Fetched {} agents from registry", body.agents.len());
        Ok(body.agents)
    }

    /// `{base}/unregister/{address}` with the address encoded as one segment.
    fn unregister_url(&self, address: &str) -> Result<reqwest::Url, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidAddress {
            address: self.base_url.clone(),
            reason,
        };
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("registry URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("unregister")
            .push(&normalize_url(address));
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregister_url_encodes_address_as_one_segment() {
        let client = RegistryClient::new("http://127.0.0.1:8090/", Duration::from_secs(1)).unwrap();
        let url = client.unregister_url("http://127.0.0.1:8011/").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8090/unregister/http:%2F%2F127.0.0.1:8011"
        );
    }

    #[test]
    fn test_listing_tolerates_loose_cards() {
        let body: AgentsListResponse = serde_json::from_value(serde_json::json!({
            "agents": [
                {"address": "http://a", "agent_card": {"name": "A"}, "registered_at": "2025-01-01T00:00:00Z"},
                {"address": "http://b"}
            ]
        }))
        .unwrap();
        assert_eq!(body.agents.len(), 2);
        assert_eq!(body.agents[1].agent_card, Value::Null);
    }
}
