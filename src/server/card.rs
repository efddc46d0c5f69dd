//! The operator's own agent card.

use crate::a2a::{AgentCard, AgentSkill};

/// Card advertised at `/.well-known/agent-card.json` and sent to the registry.
pub fn operator_card(base_url: &str) -> AgentCard {
    let mut card = AgentCard::new(
        "Emergency Operator",
        "Routes emergency calls to fire, police, ambulance, or other Agents.",
        base_url,
    )
    .streaming(true)
    .with_skill(AgentSkill {
        id: "route_emergency".to_string(),
        name: "Route Emergency".to_string(),
        description: "Triage an emergency report and contact the appropriate responder agents."
            .to_string(),
        tags: vec!["orchestration".to_string()],
        examples: vec![
            "Route a fire reported at 55 State St".to_string(),
            "Send police for a robbery in progress".to_string(),
        ],
        input_modes: vec!["text".to_string()],
        output_modes: vec!["text".to_string()],
    });
    card.version = crate::VERSION.to_string();
    card.capabilities.state_transition_history = true;
    card
}
