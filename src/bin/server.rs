//! Emergency operator server binary.
//!
//! Starts an axum HTTP server that accepts emergency requests over A2A,
//! matches them against the peers listed in the registry and dispatches them.
//!
//! # Environment Variables
//!
//! - `DISPATCH_CONFIG` — Optional YAML config file
//! - `HOST` / `PORT` — Bind address (default: 127.0.0.1:8016)
//! - `A2A_REGISTRY_URL` — Registry base URL (default: http://127.0.0.1:8090)
//! - `MATCHER_STRATEGY` — "keyword" (default) or "semantic"
//! - `OPENAI_API_KEY` — Required by the semantic matcher
//! - `RUST_LOG` — Tracing filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use agent_dispatch::a2a::A2AClient;
use agent_dispatch::config::{DispatchConfig, MatcherStrategy};
use agent_dispatch::dispatch::{
    A2aTransport, ChatCompletionsCollaborator, HttpDirectorySource, KeywordMatcher, Orchestrator,
    PeerDirectoryCache, PeerInvoker, PeerMatcher, SemanticMatcher,
};
use agent_dispatch::registry::RegistryClient;
use agent_dispatch::server::{app_router, operator_card, AppState};

fn build_matcher(config: &DispatchConfig) -> anyhow::Result<Arc<dyn PeerMatcher>> {
    let keyword = || -> Arc<dyn PeerMatcher> {
        Arc::new(KeywordMatcher::new(config.matcher.keyword_rules.clone()))
    };
    match (config.matcher.strategy, config.matcher.api_key.as_deref()) {
        (MatcherStrategy::Semantic, Some(api_key)) => {
            let collaborator = ChatCompletionsCollaborator::new(
                &config.matcher.api_base,
                api_key,
                config.matcher.model.clone(),
                config.matcher.timeout(),
            )
            .context("building matching collaborator client")?;
            tracing::info!("Using semantic matcher (model {})", config.matcher.model);
            Ok(Arc::new(SemanticMatcher::new(
                Arc::new(collaborator),
                config.matcher.timeout(),
            )))
        }
        (MatcherStrategy::Semantic, None) => {
            tracing::warn!("Semantic matcher requested without an API key; using keyword rules");
            Ok(keyword())
        }
        (MatcherStrategy::Keyword, _) => Ok(keyword()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agent_dispatch=debug".into()),
        )
        .init();

    let config = DispatchConfig::load().context("loading configuration")?;
    let base_url = config.server.base_url();
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let registry = RegistryClient::new(&config.registry.url, config.registry.timeout())
        .context("building registry client")?;
    let cards = A2AClient::new(config.directory.resolve_timeout()).context("building A2A client")?;
    let peers = A2AClient::new(config.invoker.timeout()).context("building A2A client")?;

    let source = HttpDirectorySource::new(registry.clone(), cards).excluding(&base_url);
    let directory = Arc::new(
        PeerDirectoryCache::new(
            Arc::new(source),
            config.directory.ttl(),
            config.directory.resolve_timeout(),
        )
        .with_list_timeout(config.registry.timeout()),
    );
    let orchestrator = Orchestrator::new(
        Arc::clone(&directory),
        build_matcher(&config)?,
        PeerInvoker::new(Arc::new(A2aTransport::new(peers)), config.invoker.timeout()),
    )
    .with_config(config.orchestrator.clone());

    let card = operator_card(&base_url);
    if config.registry.register_self {
        match registry.register(&base_url, &card).await {
            Ok(()) => tracing::info!("Registered {} with {}", base_url, registry.base_url()),
            Err(e) => tracing::warn!("Could not register with the registry: {}", e),
        }
    }

    let cached = directory.prime().await;
    tracing::info!("Peer directory primed with {} services", cached);

    let app = app_router(AppState::new(Arc::new(orchestrator), card));

    tracing::info!("Emergency operator starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /.well-known/agent-card.json — agent card");
    tracing::info!("  POST /                            — A2A JSON-RPC");
    tracing::info!("  GET  /tasks/{{task_id}}             — running task");
    tracing::info!("  GET  /health                      — liveness probe");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("server failed")?;

    if config.registry.register_self {
        match registry.unregister(&base_url).await {
            Ok(()) => tracing::info!("Unregistered {}", base_url),
            Err(e) => tracing::warn!("Could not unregister from the registry: {}", e),
        }
    }
    Ok(())
}
