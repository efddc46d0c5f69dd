//! Progress Emitter and the sinks it writes to.
//!
//! Events for one task are delivered in the order they are emitted. The
//! event with `is_final == true` is the last one for its task; anything
//! emitted for that task afterwards is dropped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::directory::DiscoveryObserver;

/// One user-visible progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: String,
    pub context_id: String,
    pub text: String,
    pub is_final: bool,
    /// Emitter-wide sequence number, strictly increasing.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// Caller-facing destination of progress events.
pub trait ProgressSink: Send + Sync {
    /// Deliver one event. Returns `false` if the caller is gone.
    fn send(&self, event: ProgressEvent) -> bool;

    /// Whether the caller has disconnected.
    fn is_closed(&self) -> bool;
}

/// Sink backed by an unbounded tokio channel; closed once the receiver drops.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn send(&self, event: ProgressEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Sink that keeps every event in memory.
///
/// `disconnect_after(n)` makes it report closed once `n` events arrived.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
    limit: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disconnect_after(limit: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            limit: Some(limit),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.text.clone()).collect()
    }
}

impl ProgressSink for MemorySink {
    fn send(&self, event: ProgressEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        self.events.lock().push(event);
        true
    }

    fn is_closed(&self) -> bool {
        self.limit.is_some_and(|limit| self.events.lock().len() >= limit)
    }
}

// ---------------------------------------------------------------------------
// ProgressEmitter
// ---------------------------------------------------------------------------

/// Stamps and forwards progress events to a [`ProgressSink`].
pub struct ProgressEmitter {
    sink: Arc<dyn ProgressSink>,
    sequence: AtomicU64,
    finished: Mutex<HashSet<String>>,
    disconnected: AtomicBool,
}

impl ProgressEmitter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            sequence: AtomicU64::new(0),
            finished: Mutex::new(HashSet::new()),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Emit one event for `task_id`. A `final` event closes the task's stream.
    pub fn emit(&self, task_id: &str, context_id: &str, text: impl Into<String>, is_final: bool) {
        {
            let mut finished = self.finished.lock();
            if finished.contains(task_id) {
                log::warn!("Dropping progress event for finished task {}", task_id);
                return;
            }
            if is_final {
                finished.insert(task_id.to_string());
            }
        }

        let event = ProgressEvent {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            text: text.into(),
            is_final,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
        };
        log::debug!("[{}] {}", task_id, event.text);
        if !self.sink.send(event) && !self.disconnected.swap(true, Ordering::SeqCst) {
            log::info!("Progress stream for task {} closed by caller", task_id);
        }
    }

    /// Whether the caller stopped listening.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst) || self.sink.is_closed()
    }

    /// Adapter forwarding directory keep-alive text as events of one task.
    pub fn for_discovery<'a>(&'a self, task_id: &'a str, context_id: &'a str) -> DiscoveryRelay<'a> {
        DiscoveryRelay {
            emitter: self,
            task_id,
            context_id,
        }
    }
}

/// [`DiscoveryObserver`] that relays into a task's progress stream.
pub struct DiscoveryRelay<'a> {
    emitter: &'a ProgressEmitter,
    task_id: &'a str,
    context_id: &'a str,
}

#[async_trait]
impl DiscoveryObserver for DiscoveryRelay<'_> {
    async fn on_discovery_progress(&self, text: &str) {
        self.emitter.emit(self.task_id, self.context_id, text, false);
    }
}
