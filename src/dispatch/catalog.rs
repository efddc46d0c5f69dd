//! Peer descriptors and the catalog snapshot they are grouped into.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::a2a::{normalize_url, AgentCard};

/// Immutable snapshot of one discoverable peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Registry address; unique key of the peer.
    pub address: String,
    /// Display name, used for matching and target resolution.
    pub name: String,
    pub description: String,
    /// Union of the tags of every skill on the card.
    pub skill_tags: BTreeSet<String>,
    /// Skill names in card order, for prompting the semantic matcher.
    #[serde(default)]
    pub skill_names: Vec<String>,
    /// JSON-RPC endpoint advertised by the card.
    pub endpoint: String,
}

impl PeerDescriptor {
    /// Build a descriptor with no skills; endpoint defaults to the address.
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let address = normalize_url(&address.into());
        Self {
            endpoint: address.clone(),
            address,
            name: name.into(),
            description: description.into(),
            skill_tags: BTreeSet::new(),
            skill_names: Vec::new(),
        }
    }

    /// Builder: add skill tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skill_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Derive a descriptor from the card a peer published at `address`.
    pub fn from_card(address: &str, card: &AgentCard) -> Self {
        let address = normalize_url(address);
        let endpoint = if card.url.trim().is_empty() {
            address.clone()
        } else {
            card.url.trim().to_string()
        };
        Self {
            address,
            name: card.name.trim().to_string(),
            description: card.description.clone(),
            skill_tags: card
                .skills
                .iter()
                .flat_map(|s| s.tags.iter().cloned())
                .collect(),
            skill_names: card.skills.iter().map(|s| s.name.clone()).collect(),
            endpoint,
        }
    }
}

/// Address-keyed set of peers from one directory fetch.
///
/// A catalog is never mutated after construction; the directory cache swaps
/// whole catalogs instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCatalog {
    peers: BTreeMap<String, PeerDescriptor>,
    fetched_at: DateTime<Utc>,
}

impl Default for PeerCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl PeerCatalog {
    pub fn empty() -> Self {
        Self {
            peers: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Collect descriptors into a catalog stamped with the current time.
    /// A later descriptor for the same address replaces an earlier one.
    pub fn from_peers(peers: impl IntoIterator<Item = PeerDescriptor>) -> Self {
        Self {
            peers: peers
                .into_iter()
                .map(|p| (p.address.clone(), p))
                .collect(),
            fetched_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn get(&self, address: &str) -> Option<&PeerDescriptor> {
        self.peers.get(&normalize_url(address))
    }

    /// First peer whose name equals `name`, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<&PeerDescriptor> {
        let wanted = name.trim();
        self.peers
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(wanted))
    }

    /// Peers in address order.
    pub fn peers(&self) -> impl Iterator<Item = &PeerDescriptor> {
        self.peers.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.peers.values().map(|p| p.name.as_str()).collect()
    }
}
