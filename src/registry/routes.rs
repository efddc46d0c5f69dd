//! Axum route handlers for the registry service.
//!
//! # Routes
//!
//! - `POST   /register`             — Register an agent card under an address
//! - `DELETE /unregister/{address}` — Remove a registration (address may be percent-encoded)
//! - `GET    /agents`               — List all registrations
//! - `GET    /health`               — Liveness probe with agent count

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::store::RegistryStore;
use crate::a2a::AgentCard;

/// Shared state of the registry service.
#[derive(Clone, Default)]
pub struct RegistryState {
    pub store: Arc<RegistryStore>,
}

impl RegistryState {
    pub fn new(store: Arc<RegistryStore>) -> Self {
        Self { store }
    }
}

/// Body of `POST /register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub address: String,
    pub agent_card: AgentCard,
}

/// Build the registry router.
pub fn registry_router(state: RegistryState) -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/unregister/{*address}", delete(unregister_handler))
        .route("/agents", get(list_agents_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /register — 201 with the registered name and normalized address.
async fn register_handler(
    State(state): State<RegistryState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if request.address.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "Missing 'address'"})),
        ));
    }

    let entry = state.store.register(&request.address, request.agent_card);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "registered",
            "agent_name": entry.agent_card.name,
            "address": entry.address,
        })),
    ))
}

/// DELETE /unregister/{address}
async fn unregister_handler(
    State(state): State<RegistryState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !state.store.unregister(&address) {
        return Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "detail": format!("Agent at address {} not found", address),
            })),
        ));
    }
    Ok(Json(serde_json::json!({
        "status": "unregistered",
        "address": address,
    })))
}

/// GET /agents
async fn list_agents_handler(State(state): State<RegistryState>) -> impl IntoResponse {
    let agents = state.store.get_all();
    log::debug!("Listing {} registered agents", agents.len());
    Json(serde_json::json!({ "agents": agents }))
}

/// GET /health
async fn health_handler(State(state): State<RegistryState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "agent_count": state.store.count(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
