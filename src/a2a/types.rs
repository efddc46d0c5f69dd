//! A2A protocol wire types.
//!
//! Field names follow the A2A JSON schema (camelCase on the wire).

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Agent card types
// ---------------------------------------------------------------------------

/// Describes a skill/capability that an A2A agent offers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    /// Unique identifier for the skill.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description of what the skill does.
    #[serde(default)]
    pub description: String,
    /// Tags for categorization; the keyword matcher reads these.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Example requests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_modes: Vec<String>,
}

/// Capabilities advertised by an A2A agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
    #[serde(default)]
    pub state_transition_history: bool,
}

/// Agent card describing an A2A agent's capabilities and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Agent name. Peers are addressed by this name during matching.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-RPC endpoint of the agent.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_transport")]
    pub preferred_transport: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
}

fn default_transport() -> String {
    "JSONRPC".to_string()
}

impl AgentCard {
    /// Create a text-in/text-out card with no skills.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            url: url.into(),
            version: "0.1.0".to_string(),
            preferred_transport: default_transport(),
            capabilities: AgentCapabilities::default(),
            skills: Vec::new(),
            default_input_modes: vec!["text".to_string()],
            default_output_modes: vec!["text".to_string()],
        }
    }

    /// Builder: add a skill.
    pub fn with_skill(mut self, skill: AgentSkill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Builder: advertise streaming support.
    pub fn streaming(mut self, enabled: bool) -> Self {
        self.capabilities.streaming = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One part of an A2A message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
}

impl Part {
    /// Text content of the part, if it is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text.as_str()),
            Part::Data { .. } => None,
        }
    }
}

/// Sender role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A message in the A2A protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2AMessage {
    #[serde(default = "message_kind")]
    pub kind: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

fn message_kind() -> String {
    "message".to_string()
}

impl A2AMessage {
    /// Build a message with a fresh message id.
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            kind: message_kind(),
            role,
            parts,
            message_id: uuid::Uuid::new_v4().simple().to_string(),
            context_id: None,
            task_id: None,
        }
    }

    /// An agent-authored text message tied to a task.
    pub fn agent_text(text: impl Into<String>, context_id: &str, task_id: &str) -> Self {
        let mut msg = Self::new(Role::Agent, vec![Part::Text { text: text.into() }]);
        msg.context_id = Some(context_id.to_string());
        msg.task_id = Some(task_id.to_string());
        msg
    }

    /// Builder: set the context id.
    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// All text parts joined by newlines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Task state as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum A2ATaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Canceled,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl A2ATaskState {
    /// Whether a peer reporting this state refused or failed the work.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled | Self::Rejected)
    }
}

/// Status block of an A2A task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2ATaskStatus {
    pub state: A2ATaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<A2AMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Streaming status update for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    #[serde(default = "status_update_kind")]
    pub kind: String,
    pub task_id: String,
    pub context_id: String,
    pub status: A2ATaskStatus,
    #[serde(rename = "final")]
    pub is_final: bool,
}

fn status_update_kind() -> String {
    "status-update".to_string()
}

impl TaskStatusUpdateEvent {
    pub fn new(task_id: &str, context_id: &str, status: A2ATaskStatus, is_final: bool) -> Self {
        Self {
            kind: status_update_kind(),
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            status,
            is_final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_parses_camel_case_wire_format() {
        let raw = serde_json::json!({
            "name": "FireFighterAgent",
            "description": "Responds to fire emergencies.",
            "url": "http://127.0.0.1:8011",
            "version": "0.1.0",
            "defaultInputModes": ["text"],
            "defaultOutputModes": ["text"],
            "capabilities": {"streaming": false, "pushNotifications": false},
            "skills": [{
                "id": "extinguish_fire",
                "name": "Extinguish Fire",
                "description": "Put out the fire.",
                "tags": ["fire", "emergency"],
                "inputModes": ["text"]
            }]
        });
        let card: AgentCard = serde_json::from_value(raw).unwrap();
        assert_eq!(card.name, "FireFighterAgent");
        assert_eq!(card.preferred_transport, "JSONRPC");
        assert_eq!(card.skills[0].tags, vec!["fire", "emergency"]);
        assert_eq!(card.skills[0].input_modes, vec!["text"]);
    }

    #[test]
    fn test_parts_are_tagged_by_kind() {
        let msg = A2AMessage::new(
            Role::User,
            vec![
                Part::Text { text: "fire at 10 Main St".to_string() },
                Part::Data { data: serde_json::json!({"floor": 3}) },
            ],
        )
        .with_context("ctx-1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["role"], "user");
        assert_eq!(json["contextId"], "ctx-1");
        assert_eq!(json["parts"][0]["kind"], "text");
        assert_eq!(json["parts"][1]["kind"], "data");
        assert_eq!(msg.text(), "fire at 10 Main St");
    }

    #[test]
    fn test_unknown_task_state_does_not_fail_parsing() {
        let state: A2ATaskState = serde_json::from_str("\"auth-required\"").unwrap();
        assert_eq!(state, A2ATaskState::Unknown);
        let state: A2ATaskState = serde_json::from_str("\"input-required\"").unwrap();
        assert_eq!(state, A2ATaskState::InputRequired);
        assert!(A2ATaskState::Rejected.is_failure());
        assert!(!A2ATaskState::Working.is_failure());
    }

    #[test]
    fn test_status_update_serializes_final_flag() {
        let status = A2ATaskStatus {
            state: A2ATaskState::Completed,
            message: Some(A2AMessage::agent_text("done", "c1", "t1")),
            timestamp: None,
        };
        let event = TaskStatusUpdateEvent::new("t1", "c1", status, true);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "status-update");
        assert_eq!(json["final"], true);
        assert_eq!(json["status"]["state"], "completed");
        assert_eq!(json["taskId"], "t1");
    }
}
