//! HTTP server exposing the orchestrator as an A2A agent.
//!
//! # Endpoints
//!
//! - `GET  /.well-known/agent-card.json` — Agent card
//! - `POST /`                            — JSON-RPC (`message/send`, `message/stream`, `tasks/get`)
//! - `GET  /tasks/{task_id}`             — Running task snapshot
//! - `GET  /health`                      — Liveness probe

pub mod card;
pub mod routes;

pub use card::operator_card;
pub use routes::{app_router, AppState};
