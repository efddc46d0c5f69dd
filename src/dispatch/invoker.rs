//! Peer Invoker: one bounded call to one peer.
//!
//! [`PeerInvoker::dispatch`] never fails. Connect errors, timeouts, protocol
//! errors and peer-reported errors all become [`InvokeOutcome::Failed`] with
//! a readable reason, so one bad peer cannot abort a batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::task::{DispatchStep, StepPayload};
use crate::a2a::{normalize_url, A2AClient, A2AMessage, Part, PeerReply, Role};
use crate::errors::TransportError;

/// Text recorded for a peer that answered in an unrecognized shape.
const UNKNOWN_REPLY_SUMMARY: &str = "Acknowledged";

/// RPC seam to a peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(
        &self,
        address: &str,
        context_id: &str,
        payload: &StepPayload,
    ) -> Result<PeerReply, TransportError>;
}

/// A2A JSON-RPC transport. Re-resolves the peer's card on every call so a
/// re-registered peer's new endpoint is picked up.
#[derive(Debug, Clone)]
pub struct A2aTransport {
    client: A2AClient,
}

impl A2aTransport {
    pub fn new(client: A2AClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PeerTransport for A2aTransport {
    async fn send(
        &self,
        address: &str,
        context_id: &str,
        payload: &StepPayload,
    ) -> Result<PeerReply, TransportError> {
        let card = self
            .client
            .get_agent_card(address)
            .await
            .map_err(|source| TransportError::Resolve {
                address: address.to_string(),
                source,
            })?;
        let endpoint = if card.url.trim().is_empty() {
            normalize_url(address)
        } else {
            card.url.trim().to_string()
        };

        let part = match payload {
            StepPayload::Text(text) => Part::Text { text: text.clone() },
            StepPayload::Data(data) => Part::Data { data: data.clone() },
        };
        let message = A2AMessage::new(Role::User, vec![part]).with_context(context_id);
        self.client.send_message(&endpoint, message).await
    }
}

/// Result of dispatching one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    Ok { summary: String },
    Failed { reason: String },
}

impl InvokeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Calls peers through a [`PeerTransport`] with a per-call deadline.
#[derive(Clone)]
pub struct PeerInvoker {
    transport: Arc<dyn PeerTransport>,
    timeout: Duration,
}

impl PeerInvoker {
    pub fn new(transport: Arc<dyn PeerTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `step`'s payload to its target, tagged with `context_id`.
    pub async fn dispatch(&self, step: &DispatchStep, context_id: &str) -> InvokeOutcome {
        log::debug!(
            "Dispatching step {} to {} ({})",
            step.step_id,
            step.target_name,
            step.target_address
        );

        let call = self
            .transport
            .send(&step.target_address, context_id, &step.payload);
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => InvokeOutcome::Failed {
                reason: format!("no response within {}s", self.timeout.as_secs_f32()),
            },
            Ok(Err(e)) => InvokeOutcome::Failed { reason: e.to_string() },
            Ok(Ok(PeerReply::Success(summary))) => InvokeOutcome::Ok { summary },
            Ok(Ok(PeerReply::Error(message))) => InvokeOutcome::Failed {
                reason: format!("peer reported an error: {}", message),
            },
            Ok(Ok(PeerReply::Unknown(raw))) => {
                log::debug!("Unrecognized reply from {}: {}", step.target_name, raw);
                InvokeOutcome::Ok {
                    summary: UNKNOWN_REPLY_SUMMARY.to_string(),
                }
            }
        };

        if let InvokeOutcome::Failed { reason } = &outcome {
            log::warn!("Dispatch to {} failed: {}", step.target_name, reason);
        }
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dispatch::catalog::PeerDescriptor;
    use crate::dispatch::task::DispatchTask;
    use std::collections::HashMap;

    /// Scripted behavior for one address.
    #[derive(Debug, Clone)]
    pub(crate) enum Script {
        Reply(PeerReply),
        Refuse,
        Hang,
    }

    /// Transport that follows a per-address script and records every call.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub scripts: HashMap<String, Script>,
        pub calls: parking_lot::Mutex<Vec<(String, String, StepPayload)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn with(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts
                    .iter()
                    .map(|(a, s)| (a.to_string(), s.clone()))
                    .collect(),
                calls: parking_lot::Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl PeerTransport for ScriptedTransport {
        async fn send(
            &self,
            address: &str,
            context_id: &str,
            payload: &StepPayload,
        ) -> Result<PeerReply, TransportError> {
            self.calls
                .lock()
                .push((address.to_string(), context_id.to_string(), payload.clone()));
            match self.scripts.get(address) {
                Some(Script::Reply(reply)) => Ok(reply.clone()),
                Some(Script::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(PeerReply::Success("too late".to_string()))
                }
                Some(Script::Refuse) | None => Err(TransportError::Protocol {
                    address: address.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn step_for(address: &str) -> DispatchStep {
        let mut task = DispatchTask::new("t1", "c1", "fire");
        task.add_step(
            &PeerDescriptor::new(address, "Peer", ""),
            StepPayload::dispatch_text("fire"),
        )
        .unwrap()
        .clone()
    }

    fn invoker(transport: ScriptedTransport) -> PeerInvoker {
        PeerInvoker::new(Arc::new(transport), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_success_carries_summary_and_context() {
        let transport = Arc::new(ScriptedTransport::with(&[(
            "http://a",
            Script::Reply(PeerReply::Success("Crew en route".into())),
        )]));
        let invoker = PeerInvoker::new(transport.clone(), Duration::from_millis(50));

        let outcome = invoker.dispatch(&step_for("http://a"), "ctx-9").await;
        assert_eq!(outcome, InvokeOutcome::Ok { summary: "Crew en route".into() });
        let calls = transport.calls.lock();
        assert_eq!(calls[0].1, "ctx-9");
        assert_eq!(calls[0].2, StepPayload::Text("Emergency dispatch: fire".into()));
    }

    #[tokio::test]
    async fn test_failures_are_normalized() {
        let invoker = invoker(ScriptedTransport::with(&[
            ("http://err", Script::Reply(PeerReply::Error("no units".into()))),
            ("http://down", Script::Refuse),
            ("http://odd", Script::Reply(PeerReply::Unknown(serde_json::json!({"x": 1})))),
        ]));

        match invoker.dispatch(&step_for("http://err"), "c").await {
            InvokeOutcome::Failed { reason } => assert!(reason.contains("no units")),
            other => panic!("unexpected {:?}", other),
        }
        match invoker.dispatch(&step_for("http://down"), "c").await {
            InvokeOutcome::Failed { reason } => assert!(reason.contains("connection refused")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            invoker.dispatch(&step_for("http://odd"), "c").await,
            InvokeOutcome::Ok { summary: "Acknowledged".into() }
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let invoker = invoker(ScriptedTransport::with(&[("http://slow", Script::Hang)]));
        let outcome = invoker.dispatch(&step_for("http://slow"), "c").await;
        match outcome {
            InvokeOutcome::Failed { reason } => assert!(reason.contains("no response within")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_a2a_transport_reports_unresolvable_peer() {
        let client = A2AClient::new(Duration::from_millis(500)).unwrap();
        let transport = A2aTransport::new(client);
        let err = transport
            .send("http://127.0.0.1:1", "c", &StepPayload::Text("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }));
    }
}
