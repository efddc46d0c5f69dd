//! Agent registry server binary.
//!
//! # Environment Variables
//!
//! - `REGISTRY_HOST` — Bind host (default: 127.0.0.1)
//! - `REGISTRY_PORT` — Bind port (default: 8090)
//! - `RUST_LOG` — Tracing filter (default: "info")

use anyhow::Context;
use agent_dispatch::registry::{registry_router, RegistryState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agent_dispatch=debug".into()),
        )
        .init();

    let host = std::env::var("REGISTRY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = match std::env::var("REGISTRY_PORT") {
        Ok(v) => v
            .trim()
            .parse()
            .with_context(|| format!("invalid REGISTRY_PORT '{}'", v))?,
        Err(_) => 8090,
    };
    let bind_addr = format!("{}:{}", host, port);

    let state = RegistryState::default();
    let app = registry_router(state.clone());

    tracing::info!("Agent registry starting on {}", bind_addr);
    tracing::info!("  POST   /register             — register an agent");
    tracing::info!("  DELETE /unregister/{{address}} — remove an agent");
    tracing::info!("  GET    /agents               — list agents");
    tracing::info!("  GET    /health               — liveness probe");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("registry server failed")?;

    tracing::info!("Clearing {} registered agents", state.store.count());
    state.store.clear();
    Ok(())
}
