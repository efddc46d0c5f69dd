//! In-memory store of registered agents.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::a2a::{normalize_url, AgentCard};

/// One registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEntry {
    /// Base URL of the agent.
    pub address: String,
    pub agent_card: AgentCard,
    /// RFC 3339 timestamp of (re-)registration.
    pub registered_at: String,
}

/// Concurrent address → entry map backing the registry service.
#[derive(Debug, Default)]
pub struct RegistryStore {
    agents: DashMap<String, AgentEntry>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) the agent at `address`.
    pub fn register(&self, address: &str, agent_card: AgentCard) -> AgentEntry {
        let address = normalize_url(address);
        let entry = AgentEntry {
            address: address.clone(),
            agent_card,
            registered_at: Utc::now().to_rfc3339(),
        };
        if self.agents.insert(address.clone(), entry.clone()).is_some() {
            log::info!("Re-registered agent {} at {}", entry.agent_card.name, address);
        } else {
            log::info!("Registered agent {} at {}", entry.agent_card.name, address);
        }
        entry
    }

    /// Remove the agent at `address`. Returns `false` if it was not registered.
    pub fn unregister(&self, address: &str) -> bool {
        let address = normalize_url(address);
        match self.agents.remove(&address) {
            Some((_, entry)) => {
                log::info!("Unregistered agent {} at {}", entry.agent_card.name, address);
                true
            }
            None => {
                log::warn!("Attempted to unregister unknown agent at {}", address);
                false
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<AgentEntry> {
        self.agents.get(&normalize_url(address)).map(|e| e.clone())
    }

    /// All entries, ordered by address.
    pub fn get_all(&self) -> Vec<AgentEntry> {
        let mut entries: Vec<AgentEntry> = self.agents.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.address.cmp(&b.address));
        entries
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }

    pub fn clear(&self) {
        self.agents.clear();
    }
}
