//! Peer Matcher: choose which peers in a catalog a request should go to.
//!
//! Two strategies share the [`PeerMatcher`] trait:
//!
//! - [`KeywordMatcher`] — deterministic keyword rules, no external calls.
//! - [`SemanticMatcher`] — asks a [`MatchingCollaborator`] (an LLM) for a
//!   JSON list of agent names and maps them back onto the catalog.
//!
//! Both fail closed: on any problem they return no peers rather than all of
//! them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::catalog::{PeerCatalog, PeerDescriptor};
use crate::errors::MatchError;

/// Strategy for selecting peers.
#[async_trait]
pub trait PeerMatcher: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Peers relevant to `description`, in the strategy's own order.
    async fn match_peers(&self, description: &str, catalog: &PeerCatalog) -> Vec<PeerDescriptor>;
}

// ---------------------------------------------------------------------------
// Keyword strategy
// ---------------------------------------------------------------------------

/// A request/capability keyword pair for one service domain.
///
/// A peer matches when the request mentions any `request_terms` and the
/// peer's name, description or skill tags mention any `capability_terms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub domain: String,
    pub request_terms: Vec<String>,
    pub capability_terms: Vec<String>,
}

impl KeywordRule {
    pub fn new(domain: &str, request_terms: &[&str], capability_terms: &[&str]) -> Self {
        Self {
            domain: domain.to_string(),
            request_terms: request_terms.iter().map(|t| t.to_lowercase()).collect(),
            capability_terms: capability_terms.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Lowercased, trimmed copy; blank terms are dropped.
    fn normalized(self) -> Self {
        let clean = |terms: Vec<String>| -> Vec<String> {
            terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        };
        Self {
            domain: self.domain,
            request_terms: clean(self.request_terms),
            capability_terms: clean(self.capability_terms),
        }
    }

    fn applies_to(&self, request: &str) -> bool {
        self.request_terms.iter().any(|t| request.contains(t.as_str()))
    }

    fn covers(&self, capabilities: &str) -> bool {
        self.capability_terms.iter().any(|t| capabilities.contains(t.as_str()))
    }
}

/// Fire, police, medical and weather rules.
pub fn default_keyword_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(
            "fire",
            &["fire", "burning", "smoke", "flame"],
            &["fire", "firefighter", "extinguish"],
        ),
        KeywordRule::new(
            "police",
            &["police", "arrest", "criminal", "theft", "crime"],
            &["police", "crime", "investigation"],
        ),
        KeywordRule::new(
            "medical",
            &["ambulance", "injury", "injured", "medical", "hurt"],
            &["ambulance", "medical", "paramedic", "emergency medical"],
        ),
        KeywordRule::new(
            "weather",
            &["weather", "forecast", "rain", "storm"],
            &["weather", "forecast", "meteorology"],
        ),
    ]
}

/// Deterministic rule-based matcher.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new(default_keyword_rules())
    }
}

impl KeywordMatcher {
    /// Rules are compared case-insensitively however they were written.
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self {
            rules: rules.into_iter().map(KeywordRule::normalized).collect(),
        }
    }

    /// Synchronous core; results follow catalog order.
    pub fn select(&self, description: &str, catalog: &PeerCatalog) -> Vec<PeerDescriptor> {
        let request = description.to_lowercase();
        let active: Vec<&KeywordRule> = self.rules.iter().filter(|r| r.applies_to(&request)).collect();
        if active.is_empty() {
            return Vec::new();
        }

        catalog
            .peers()
            .filter(|peer| {
                let capabilities = capability_text(peer);
                active.iter().any(|rule| rule.covers(&capabilities))
            })
            .cloned()
            .collect()
    }
}

fn capability_text(peer: &PeerDescriptor) -> String {
    let mut text = format!("{} {}", peer.name, peer.description);
    for tag in &peer.skill_tags {
        text.push(' ');
        text.push_str(tag);
    }
    text.to_lowercase()
}

#[async_trait]
impl PeerMatcher for KeywordMatcher {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn match_peers(&self, description: &str, catalog: &PeerCatalog) -> Vec<PeerDescriptor> {
        self.select(description, catalog)
    }
}

// ---------------------------------------------------------------------------
// Semantic strategy
// ---------------------------------------------------------------------------

/// Opaque completion call used by [`SemanticMatcher`].
#[async_trait]
pub trait MatchingCollaborator: Send + Sync {
    /// Complete a system/user prompt pair; the reply should be a JSON object.
    async fn complete(&self, system: &str, user: &str) -> Result<String, MatchError>;
}

const MATCH_SYSTEM_PROMPT: &str = "You route emergency requests to responder agents. \
Given a request and a list of available agents, choose every agent that should be \
contacted and no others. Reply with a JSON object of the form \
{\"agents\": [\"<exact agent name>\", ...], \"reasoning\": \"<one sentence>\"}. \
Use agent names exactly as listed. Reply with an empty list if no agent fits.";

#[derive(Debug, Deserialize)]
struct MatchResponse {
    agents: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

/// LLM-backed matcher.
pub struct SemanticMatcher {
    collaborator: Arc<dyn MatchingCollaborator>,
    timeout: Duration,
    fence: Regex,
}

impl SemanticMatcher {
    pub fn new(collaborator: Arc<dyn MatchingCollaborator>, timeout: Duration) -> Self {
        Self {
            collaborator,
            timeout,
            fence: Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("static regex"),
        }
    }

    fn user_prompt(description: &str, catalog: &PeerCatalog) -> String {
        let agents: Vec<Value> = catalog
            .peers()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "description": p.description,
                    "skills": p.skill_names,
                    "tags": p.skill_tags,
                })
            })
            .collect();
        format!(
            "Request:\n{}\n\nAvailable agents:\n{}",
            description,
            serde_json::to_string_pretty(&agents).unwrap_or_default()
        )
    }

    fn parse(&self, raw: &str) -> Result<MatchResponse, MatchError> {
        let body = match self.fence.captures(raw) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
            None => raw.trim(),
        };
        serde_json::from_str(body).map_err(|e| MatchError::Parse(e.to_string()))
    }

    async fn try_match(
        &self,
        description: &str,
        catalog: &PeerCatalog,
    ) -> Result<Vec<PeerDescriptor>, MatchError> {
        let user = Self::user_prompt(description, catalog);
        let raw = tokio::time::timeout(self.timeout, self.collaborator.complete(MATCH_SYSTEM_PROMPT, &user))
            .await
            .map_err(|_| MatchError::Timeout(self.timeout))??;
        let response = self.parse(&raw)?;
        log::debug!("Semantic match reasoning: {}", response.reasoning);

        let mut seen = HashSet::new();
        let mut matched = Vec::new();
        for name in &response.agents {
            match catalog.find_by_name(name) {
                Some(peer) => {
                    if seen.insert(peer.address.clone()) {
                        matched.push(peer.clone());
                    }
                }
                None => log::warn!("Matcher returned unknown agent '{}'; ignoring", name),
            }
        }
        Ok(matched)
    }
}

#[async_trait]
impl PeerMatcher for SemanticMatcher {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn match_peers(&self, description: &str, catalog: &PeerCatalog) -> Vec<PeerDescriptor> {
        if catalog.is_empty() {
            return Vec::new();
        }
        match self.try_match(description, catalog).await {
            Ok(peers) => peers,
            Err(e) => {
                log::warn!("Semantic matching failed, dispatching to no peers: {}", e);
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible collaborator
// ---------------------------------------------------------------------------

/// [`MatchingCollaborator`] over an OpenAI-compatible `/chat/completions` API.
#[derive(Debug, Clone)]
pub struct ChatCompletionsCollaborator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsCollaborator {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl MatchingCollaborator for ChatCompletionsCollaborator {
    async fn complete(&self, system: &str, user: &str) -> Result<String, MatchError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0,
        });

        let response = self
            .http
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| MatchError::Collaborator(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MatchError::Collaborator(e.to_string()))?;
        if !status.is_success() {
            return Err(MatchError::Collaborator(format!(
                "chat completions error ({}): {}",
                status,
                text.chars().take(500).collect::<String>()
            )));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| MatchError::Parse(e.to_string()))?;
        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MatchError::Parse("no message content in completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog() -> PeerCatalog {
        PeerCatalog::from_peers(vec![
            PeerDescriptor::new("http://fire", "fireAgent", "").with_tags(["fire"]),
            PeerDescriptor::new("http://police", "policeAgent", "").with_tags(["police"]),
            PeerDescriptor::new("http://amb", "AmbulanceAgent", "Paramedic response"),
        ])
    }

    #[tokio::test]
    async fn test_keyword_selects_only_fire_agent() {
        let matcher = KeywordMatcher::default();
        let matched = matcher.match_peers("fire at 10 Main St", &catalog()).await;
        let names: Vec<_> = matched.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["fireAgent"]);
    }

    #[tokio::test]
    async fn test_keyword_multiple_domains_follow_catalog_order() {
        let matcher = KeywordMatcher::default();
        let matched = matcher
            .match_peers("Car on FIRE, driver injured, suspected theft", &catalog())
            .await;
        let names: Vec<_> = matched.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["AmbulanceAgent", "fireAgent", "policeAgent"]);
    }

    #[tokio::test]
    async fn test_keyword_is_deterministic() {
        let matcher = KeywordMatcher::default();
        let catalog = catalog();
        let first = matcher.match_peers("smoke and an injured person", &catalog).await;
        for _ in 0..5 {
            assert_eq!(matcher.match_peers("smoke and an injured person", &catalog).await, first);
        }
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_no_match_and_custom_rules() {
        let matcher = KeywordMatcher::default();
        assert!(matcher.match_peers("hello there", &catalog()).await.is_empty());

        let matcher = KeywordMatcher::new(vec![KeywordRule::new("flood", &["flood"], &["police"])]);
        let matched = matcher.match_peers("Flood on Elm St", &catalog()).await;
        assert_eq!(matched[0].name, "policeAgent");
    }

    struct FakeCollaborator {
        reply: Result<String, String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeCollaborator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MatchingCollaborator for FakeCollaborator {
        async fn complete(&self, system: &str, user: &str) -> Result<String, MatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(system.contains("JSON"));
            assert!(user.contains("fireAgent"));
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(MatchError::Collaborator)
        }
    }

    fn semantic(collaborator: Arc<FakeCollaborator>) -> SemanticMatcher {
        SemanticMatcher::new(collaborator, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_semantic_maps_names_and_drops_unknown() {
        let collaborator = Arc::new(FakeCollaborator::replying(
            "```json\n{\"agents\": [\"policeAgent\", \"SWAT\", \"fireagent\", \"policeAgent\"], \"reasoning\": \"arson\"}\n```",
        ));
        let matched = semantic(collaborator.clone())
            .match_peers("arson suspect", &catalog())
            .await;
        let names: Vec<_> = matched.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["policeAgent", "fireAgent"]);
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_semantic_empty_catalog_makes_no_call() {
        let collaborator = Arc::new(FakeCollaborator::replying("{\"agents\": []}"));
        let matched = semantic(collaborator.clone())
            .match_peers("fire", &PeerCatalog::empty())
            .await;
        assert!(matched.is_empty());
        assert_eq!(collaborator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_semantic_fails_closed() {
        let bad_json = Arc::new(FakeCollaborator::replying("send everyone!"));
        assert!(semantic(bad_json).match_peers("fire", &catalog()).await.is_empty());

        let wrong_shape = Arc::new(FakeCollaborator::replying("{\"agent\": \"fireAgent\"}"));
        assert!(semantic(wrong_shape).match_peers("fire", &catalog()).await.is_empty());

        let failing = Arc::new(FakeCollaborator {
            reply: Err("503".to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        });
        assert!(semantic(failing).match_peers("fire", &catalog()).await.is_empty());

        let slow = Arc::new(FakeCollaborator {
            reply: Ok("{\"agents\": [\"fireAgent\"]}".to_string()),
            delay: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        });
        assert!(semantic(slow).match_peers("fire", &catalog()).await.is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_with_multibyte_body_fails_closed() {
        use axum::{http::StatusCode, routing::post, Router};

        let body = format!("{}é", "x".repeat(499));
        let router = Router::new().route(
            "/chat/completions",
            post(move || {
                let body = body.clone();
                async move { (StatusCode::SERVICE_UNAVAILABLE, body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let collaborator =
            ChatCompletionsCollaborator::new(&base_url, "sk-test", "test-model", Duration::from_secs(5))
                .unwrap();
        let err = collaborator.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, MatchError::Collaborator(ref m) if m.ends_with('é')));

        let matcher = SemanticMatcher::new(Arc::new(collaborator), Duration::from_secs(5));
        let matched = tokio::spawn(async move { matcher.match_peers("fire", &catalog()).await })
            .await
            .expect("matching does not panic");
        assert!(matched.is_empty());
    }
}
