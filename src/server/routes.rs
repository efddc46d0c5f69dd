//! Axum route handlers exposing the orchestrator as an A2A agent.
//!
//! # Routes
//!
//! - `GET  /.well-known/agent-card.json` — The operator's agent card
//! - `POST /`                            — JSON-RPC: `message/send`, `message/stream`, `tasks/get`
//! - `GET  /tasks/{task_id}`             — Snapshot of a running task
//! - `GET  /health`                      — Liveness probe

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::a2a::errors::success_response;
use crate::a2a::types::{A2ATaskStatus, TaskStatusUpdateEvent};
use crate::a2a::{A2AError, A2AErrorCode, A2AMessage, A2ATaskState, AgentCard, AGENT_CARD_PATH};
use crate::dispatch::{
    ChannelSink, DispatchTask, MemorySink, Orchestrator, ProgressEmitter, ProgressEvent, TaskState,
};

/// Shared application state for the operator server.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub card: Arc<AgentCard>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, card: AgentCard) -> Self {
        Self {
            orchestrator,
            card: Arc::new(card),
        }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route(AGENT_CARD_PATH, get(agent_card_handler))
        .route("/", post(jsonrpc_handler))
        .route("/tasks/{task_id}", get(get_task_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health — liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let directory = state.orchestrator.directory();
    let cached_peers = directory.cached().map_or(0, |c| c.len());
    Json(serde_json::json!({
        "status": "ok",
        "service": "agent-dispatch",
        "version": crate::VERSION,
        "active_tasks": state.orchestrator.active_task_count(),
        "cached_peers": cached_peers,
        "cache_ttl_secs": directory.ttl().as_secs(),
    }))
}

async fn agent_card_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.card.as_ref().clone())
}

/// GET /tasks/{task_id}
async fn get_task_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let task = state.orchestrator.get_task(&task_id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("Task '{}' not found", task_id)})),
        )
    })?;
    Ok(Json(task_to_a2a(&task, None, Vec::new())))
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

/// A validated `message/*` request.
struct IncomingMessage {
    text: String,
    task_id: String,
    context_id: String,
    message: A2AMessage,
}

/// POST / — JSON-RPC 2.0 entry point.
async fn jsonrpc_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return rpc_error(A2AError::new(A2AErrorCode::JsonParseError, e.to_string()), None);
        }
    };
    let request_id = request.get("id").cloned();

    if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return rpc_error(A2AError::from_code(A2AErrorCode::InvalidRequest), request_id);
    }
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return rpc_error(A2AError::from_code(A2AErrorCode::InvalidRequest), request_id);
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    log::debug!("JSON-RPC {} (id={:?})", method, request_id);
    match method {
        "message/send" => match parse_message(&params) {
            Ok(incoming) => send_message(state, incoming, request_id).await,
            Err(e) => rpc_error(e, request_id),
        },
        "message/stream" => match parse_message(&params) {
            Ok(incoming) => stream_message(state, incoming, request_id),
            Err(e) => rpc_error(e, request_id),
        },
        "tasks/get" => {
            let Some(id) = params.get("id").and_then(Value::as_str) else {
                return rpc_error(
                    A2AError::new(A2AErrorCode::InvalidParams, "missing 'id'"),
                    request_id,
                );
            };
            match state.orchestrator.get_task(id) {
                Some(task) => Json(success_response(task_to_a2a(&task, None, Vec::new()), request_id))
                    .into_response(),
                None => rpc_error(A2AError::from_code(A2AErrorCode::TaskNotFound), request_id),
            }
        }
        "tasks/cancel" => rpc_error(A2AError::from_code(A2AErrorCode::UnsupportedOperation), request_id),
        _ => rpc_error(A2AError::from_code(A2AErrorCode::MethodNotFound), request_id),
    }
}

fn rpc_error(error: A2AError, request_id: Option<Value>) -> Response {
    Json(error.to_response(request_id)).into_response()
}

fn parse_message(params: &Value) -> Result<IncomingMessage, A2AError> {
    let raw = params
        .get("message")
        .cloned()
        .ok_or_else(|| A2AError::new(A2AErrorCode::InvalidParams, "missing 'message'"))?;
    let message: A2AMessage = serde_json::from_value(raw)
        .map_err(|e| A2AError::new(A2AErrorCode::InvalidParams, e.to_string()))?;

    let context_id = message
        .context_id
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let task_id = message
        .task_id
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    Ok(IncomingMessage {
        text: message.text(),
        task_id,
        context_id,
        message,
    })
}

/// `message/send`: run the task to completion and answer with the final task.
async fn send_message(state: AppState, incoming: IncomingMessage, request_id: Option<Value>) -> Response {
    let sink = Arc::new(MemorySink::new());
    let emitter = ProgressEmitter::new(sink.clone());

    let outcome = state
        .orchestrator
        .handle_request(&incoming.text, &incoming.task_id, &incoming.context_id, &emitter)
        .await;

    let events = sink.events();
    let mut history = vec![incoming.message.clone().with_context(incoming.context_id.clone())];
    history.extend(events.iter().map(event_message));
    let final_text = events.iter().rev().find(|e| e.is_final).map(|e| e.text.as_str());

    let result = match outcome {
        Ok(task) => task_to_a2a(&task, final_text, history),
        Err(_) => {
            let mut task = DispatchTask::new(&incoming.task_id, &incoming.context_id, incoming.text.trim());
            task.mark_failed();
            task_to_a2a(&task, final_text, history)
        }
    };
    Json(success_response(result, request_id)).into_response()
}

/// `message/stream`: run the task in the background and stream every
/// progress event as a `status-update` over SSE.
fn stream_message(state: AppState, incoming: IncomingMessage, request_id: Option<Value>) -> Response {
    let (sink, rx) = ChannelSink::new();
    let (done_tx, done_rx) = oneshot::channel();

    let initial = {
        let mut task = DispatchTask::new(&incoming.task_id, &incoming.context_id, incoming.text.trim());
        task.start();
        let history = vec![incoming.message.clone().with_context(incoming.context_id.clone())];
        success_response(task_to_a2a(&task, None, history), request_id.clone())
    };

    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        let emitter = ProgressEmitter::new(Arc::new(sink));
        let state = match orchestrator
            .handle_request(&incoming.text, &incoming.task_id, &incoming.context_id, &emitter)
            .await
        {
            Ok(task) => task.state(),
            Err(_) => TaskState::Failed,
        };
        let _ = done_tx.send(state);
    });

    let first = stream::iter(vec![Ok::<_, Infallible>(Event::default().data(initial.to_string()))]);
    Sse::new(first.chain(status_updates(rx, done_rx, request_id)))
        .keep_alive(KeepAlive::default())
        .into_response()
}

struct UpdateStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    done: Option<oneshot::Receiver<TaskState>>,
    finished: bool,
    request_id: Option<Value>,
}

fn status_updates(
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    done: oneshot::Receiver<TaskState>,
    request_id: Option<Value>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let initial = UpdateStream {
        rx,
        done: Some(done),
        finished: false,
        request_id,
    };
    stream::unfold(initial, |mut st| async move {
        if st.finished {
            return None;
        }
        let event = st.rx.recv().await?;
        let state = if event.is_final {
            st.finished = true;
            match st.done.take() {
                Some(done) => done.await.unwrap_or(TaskState::Failed),
                None => TaskState::Failed,
            }
        } else {
            TaskState::Working
        };

        let update = TaskStatusUpdateEvent::new(
            &event.task_id,
            &event.context_id,
            A2ATaskStatus {
                state: wire_state(state),
                message: Some(event_message(&event)),
                timestamp: Some(event.timestamp.to_rfc3339()),
            },
            event.is_final,
        );
        let payload = success_response(
            serde_json::to_value(&update).unwrap_or(Value::Null),
            st.request_id.clone(),
        );
        Some((Ok(Event::default().data(payload.to_string())), st))
    })
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn wire_state(state: TaskState) -> A2ATaskState {
    match state {
        TaskState::Submitted => A2ATaskState::Submitted,
        TaskState::Working => A2ATaskState::Working,
        TaskState::Completed => A2ATaskState::Completed,
        TaskState::Failed => A2ATaskState::Failed,
        TaskState::Canceled => A2ATaskState::Canceled,
    }
}

fn event_message(event: &ProgressEvent) -> A2AMessage {
    A2AMessage::agent_text(event.text.clone(), &event.context_id, &event.task_id)
}

/// Render a task as an A2A `Task` object; steps go under `metadata`.
fn task_to_a2a(task: &DispatchTask, status_text: Option<&str>, history: Vec<A2AMessage>) -> Value {
    let status = A2ATaskStatus {
        state: wire_state(task.state()),
        message: status_text.map(|t| A2AMessage::agent_text(t, &task.context_id, &task.task_id)),
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
    };
    let steps: Vec<Value> = task
        .steps()
        .iter()
        .map(|s| {
            serde_json::json!({
                "stepId": s.step_id,
                "targetName": s.target_name,
                "targetAddress": s.target_address,
                "state": s.state(),
                "result": s.result(),
                "errorReason": s.error_reason(),
            })
        })
        .collect();
    let (completed, total) = task.progress();

    serde_json::json!({
        "kind": "task",
        "id": task.task_id,
        "contextId": task.context_id,
        "status": status,
        "history": history,
        "metadata": {
            "description": task.description,
            "cursor": task.cursor(),
            "progress": {"completed": completed, "total": total},
            "steps": steps,
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
