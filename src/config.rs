//! Runtime configuration.
//!
//! Sources, later wins: built-in defaults, an optional YAML file named by
//! `DISPATCH_CONFIG`, then individual environment variables.
//!
//! ```yaml
//! server:
//!   port: 8016
//! directory:
//!   cache_ttl_secs: 30
//! matcher:
//!   strategy: semantic
//!   model: gpt-4o-mini
//! orchestrator:
//!   max_concurrent_dispatches: 4
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dispatch::matcher::{default_keyword_rules, KeywordRule};
use crate::errors::ConfigError;

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_ENV: &str = "DISPATCH_CONFIG";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where the operator agent listens and how it advertises itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL; defaults to `http://{host}:{port}`.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8016 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub url: String,
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
    /// Register the operator's card at startup and unregister on shutdown.
    #[serde(default = "default_true")]
    pub register_self: bool,
}

fn default_registry_url() -> String { "http://127.0.0.1:8090".to_string() }
fn default_registry_timeout() -> u64 { 10 }
fn default_true() -> bool { true }

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            timeout_secs: default_registry_timeout(),
            register_self: true,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Deadline for resolving one peer's card.
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,
}

fn default_cache_ttl() -> u64 { 60 }
fn default_resolve_timeout() -> u64 { 10 }

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            resolve_timeout_secs: default_resolve_timeout(),
        }
    }
}

impl DirectoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// Deadline for one peer dispatch, card re-resolution included.
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,
}

fn default_dispatch_timeout() -> u64 { 30 }

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dispatch_timeout(),
        }
    }
}

impl InvokerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which matcher the operator uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherStrategy {
    #[default]
    Keyword,
    Semantic,
}

impl FromStr for MatcherStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "semantic" | "llm" => Ok(Self::Semantic),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default)]
    pub strategy: MatcherStrategy,
    #[serde(default = "default_matcher_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Never written back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_keyword_rules")]
    pub keyword_rules: Vec<KeywordRule>,
}

fn default_matcher_timeout() -> u64 { 30 }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_api_base() -> String { "https://api.openai.com/v1".to_string() }

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            strategy: MatcherStrategy::default(),
            timeout_secs: default_matcher_timeout(),
            model: default_model(),
            api_base: default_api_base(),
            api_key: None,
            keyword_rules: default_keyword_rules(),
        }
    }
}

impl MatcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Steps dispatched at once; 1 dispatches strictly one after another.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_dispatches: usize,
    /// Longest request text accepted, in characters.
    #[serde(default = "default_max_request_chars")]
    pub max_request_chars: usize,
}

fn default_max_concurrent() -> usize { 1 }
fn default_max_request_chars() -> usize { 8192 }

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dispatches: default_max_concurrent(),
            max_request_chars: default_max_request_chars(),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Complete configuration of the operator agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub invoker: InvokerConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl DispatchConfig {
    /// Parse a YAML document; missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::Yaml {
            path: display,
            source,
        })
    }

    /// Defaults, then the `DISPATCH_CONFIG` file if set, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                log::info!("Loading configuration from {}", path);
                Self::from_yaml_file(path.trim())?
            }
            _ => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = get("BASE_URL") {
            self.server.base_url = Some(v);
        }
        if let Some(v) = get("A2A_REGISTRY_URL") {
            self.registry.url = v;
        }
        if let Some(v) = get("PEER_CACHE_TTL_SECS") {
            self.directory.cache_ttl_secs = parse_env("PEER_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = get("PEER_RESOLVE_TIMEOUT_SECS") {
            self.directory.resolve_timeout_secs = parse_env("PEER_RESOLVE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("PEER_DISPATCH_TIMEOUT_SECS") {
            self.invoker.timeout_secs = parse_env("PEER_DISPATCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("MATCHER_STRATEGY") {
            self.matcher.strategy = parse_env("MATCHER_STRATEGY", &v)?;
        }
        if let Some(v) = get("MATCHER_MODEL") {
            self.matcher.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.matcher.api_base = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.matcher.api_key = Some(v);
        }
        if let Some(v) = get("MAX_CONCURRENT_DISPATCHES") {
            self.orchestrator.max_concurrent_dispatches = parse_env("MAX_CONCURRENT_DISPATCHES", &v)?;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.server.base_url(), "http://127.0.0.1:8016");
        assert_eq!(config.registry.url, "http://127.0.0.1:8090");
        assert_eq!(config.registry.timeout(), Duration::from_secs(10));
        assert_eq!(config.directory.ttl(), Duration::from_secs(60));
        assert_eq!(config.directory.resolve_timeout(), Duration::from_secs(10));
        assert_eq!(config.invoker.timeout(), Duration::from_secs(30));
        assert_eq!(config.matcher.timeout(), Duration::from_secs(30));
        assert_eq!(config.matcher.strategy, MatcherStrategy::Keyword);
        assert_eq!(config.matcher.keyword_rules.len(), 4);
        assert_eq!(config.orchestrator.max_concurrent_dispatches, 1);
    }

    #[test]
    fn test_partial_yaml_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "directory:\n  cache_ttl_secs: 5\nmatcher:\n  strategy: semantic\norchestrator:\n  max_concurrent_dispatches: 3"
        )
        .unwrap();

        let config = DispatchConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.directory.cache_ttl_secs, 5);
        assert_eq!(config.directory.resolve_timeout_secs, 10);
        assert_eq!(config.matcher.strategy, MatcherStrategy::Semantic);
        assert_eq!(config.matcher.model, "gpt-4o-mini");
        assert_eq!(config.orchestrator.max_concurrent_dispatches, 3);
        assert_eq!(config.server.port, 8016);
    }

    #[test]
    fn test_yaml_errors_name_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [not, a, map]").unwrap();
        let err = DispatchConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));

        let err = DispatchConfig::from_yaml_file("/nonexistent/dispatch.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9100"),
            ("BASE_URL", "http://operator.local"),
            ("A2A_REGISTRY_URL", "http://registry:8090"),
            ("PEER_CACHE_TTL_SECS", "15"),
            ("PEER_DISPATCH_TIMEOUT_SECS", "5"),
            ("MATCHER_STRATEGY", "LLM"),
            ("OPENAI_API_KEY", "sk-test"),
            ("MAX_CONCURRENT_DISPATCHES", "4"),
            ("HOST", ""),
        ]
        .into_iter()
        .collect();

        let mut config = DispatchConfig::default();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.base_url(), "http://operator.local");
        assert_eq!(config.registry.url, "http://registry:8090");
        assert_eq!(config.directory.cache_ttl_secs, 15);
        assert_eq!(config.invoker.timeout_secs, 5);
        assert_eq!(config.matcher.strategy, MatcherStrategy::Semantic);
        assert_eq!(config.matcher.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.orchestrator.max_concurrent_dispatches, 4);
    }

    #[test]
    fn test_invalid_env_value_is_reported() {
        let mut config = DispatchConfig::default();
        let err = config
            .apply_env_with(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid value 'eighty' for PORT");
    }

    #[test]
    fn test_yaml_keyword_rules_match_regardless_of_case() {
        use crate::dispatch::{KeywordMatcher, PeerCatalog, PeerDescriptor};

        let yaml = r#"
matcher:
  keyword_rules:
    - domain: flood
      request_terms: [Flood]
      capability_terms: [" Police "]
"#;
        let config = DispatchConfig::from_yaml_str(yaml).unwrap();
        let matcher = KeywordMatcher::new(config.matcher.keyword_rules);
        let catalog = PeerCatalog::from_peers(vec![
            PeerDescriptor::new("http://police", "PoliceAgent", "").with_tags(["police"]),
            PeerDescriptor::new("http://fire", "FireAgent", "").with_tags(["fire"]),
        ]);

        let matched = matcher.select("Flood on Elm St", &catalog);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "PoliceAgent");
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let mut config = DispatchConfig::default();
        config.matcher.api_key = Some("sk-secret".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("sk-secret"));
    }
}
