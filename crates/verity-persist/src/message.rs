//! Cross-agent coordination messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use verity_core::AgentType;

/// Who a message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "agent", rename_all = "snake_case")]
pub enum Recipient {
    Agent(AgentType),
    Broadcast,
}

impl Recipient {
    pub fn includes(&self, agent: AgentType) -> bool {
        match self {
            Self::Agent(a) => *a == agent,
            Self::Broadcast => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationMessage {
    pub id: String,
    pub from: AgentType,
    pub recipient: Recipient,
    pub body: serde_json::Value,
    pub acknowledged_by: BTreeSet<AgentType>,
    pub created_at: DateTime<Utc>,
}

impl CoordinationMessage {
    pub fn new(from: AgentType, recipient: Recipient, body: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            recipient,
            body,
            acknowledged_by: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Still pending for this agent
    pub fn is_pending_for(&self, agent: AgentType) -> bool {
        self.recipient.includes(agent) && !self.acknowledged_by.contains(&agent)
    }

    /// Acknowledged by its recipient, or for a broadcast by every other
    /// participant (and at least one agent)
    pub fn is_settled(&self, participants: &[AgentType]) -> bool {
        match self.recipient {
            Recipient::Agent(a) => self.acknowledged_by.contains(&a),
            Recipient::Broadcast => {
                !self.acknowledged_by.is_empty()
                    && participants
                        .iter()
                        .filter(|a| **a != self.from)
                        .all(|a| self.acknowledged_by.contains(a))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_settles_after_all_acks() {
        let mut msg = CoordinationMessage::new(
            AgentType::Academic,
            Recipient::Broadcast,
            serde_json::json!({"note": "re-check dates"}),
        );
        let participants = [AgentType::Academic, AgentType::News, AgentType::Social];

        assert!(msg.is_pending_for(AgentType::News));
        msg.acknowledged_by.insert(AgentType::News);
        assert!(!msg.is_pending_for(AgentType::News));
        assert!(!msg.is_settled(&participants));

        msg.acknowledged_by.insert(AgentType::Social);
        assert!(msg.is_settled(&participants));
    }

    #[test]
    fn test_direct_message_only_reaches_recipient() {
        let msg = CoordinationMessage::new(
            AgentType::News,
            Recipient::Agent(AgentType::Financial),
            serde_json::Value::Null,
        );
        assert!(msg.is_pending_for(AgentType::Financial));
        assert!(!msg.is_pending_for(AgentType::Government));
    }
}
