//! Typed records held by the coordination bus

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use verity_adversarial::{ConsensusResult, DebateRound};
use verity_core::{Claim, Investigation};

use crate::message::CoordinationMessage;
use crate::progress::ProgressUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Claim,
    Investigation,
    DebateRound,
    Consensus,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RecordPayload {
    Claim(Claim),
    Investigation(Investigation),
    DebateRound {
        claim_id: String,
        round: Box<DebateRound>,
    },
    Consensus(Box<ConsensusResult>),
    Message(CoordinationMessage),
}

impl RecordPayload {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Claim(_) => RecordKind::Claim,
            Self::Investigation(_) => RecordKind::Investigation,
            Self::DebateRound { .. } => RecordKind::DebateRound,
            Self::Consensus(_) => RecordKind::Consensus,
            Self::Message(_) => RecordKind::Message,
        }
    }

    /// Notification implied by storing this payload.
    ///
    /// Consensus records carry none: the orchestrator announces the outcome
    /// itself since a stored consensus may belong to a timed-out session.
    pub fn implied_update(&self) -> Option<ProgressUpdate> {
        match self {
            Self::Claim(c) => Some(ProgressUpdate::ClaimExtracted {
                claim_id: c.id.clone(),
                claim_text: c.claim_text.clone(),
            }),
            Self::Investigation(i) => Some(ProgressUpdate::InvestigationCompleted {
                claim_id: i.claim_id.clone(),
                agent: i.agent_type,
                conclusion: i.conclusion,
                confidence: i.confidence_score,
            }),
            Self::DebateRound { claim_id, round } => Some(ProgressUpdate::DebateRound {
                claim_id: claim_id.clone(),
                round: round.round_number,
                conflicts: round.conflicts.len(),
                agreement: round.agreement(),
            }),
            Self::Consensus(_) => None,
            Self::Message(m) => Some(ProgressUpdate::MessagePosted {
                message_id: m.id.clone(),
                from: m.from,
                recipient: m.recipient,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub session_id: String,
    pub payload: RecordPayload,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(session_id: &str, payload: RecordPayload, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            payload,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
