//! Progress events and the per-session progress projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use verity_adversarial::Veracity;
use verity_core::{AgentType, Conclusion};

use crate::message::Recipient;

/// Typed progress notification, one variant per update kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressUpdate {
    ClaimExtracted {
        claim_id: String,
        claim_text: String,
    },
    InvestigationStarted {
        claim_id: String,
        agents: Vec<AgentType>,
    },
    InvestigationCompleted {
        claim_id: String,
        agent: AgentType,
        conclusion: Conclusion,
        confidence: f64,
    },
    DebateStarted {
        claim_id: String,
        participants: Vec<AgentType>,
        max_rounds: u32,
    },
    DebateRound {
        claim_id: String,
        round: u32,
        conflicts: usize,
        agreement: f64,
    },
    ConflictsResolved {
        claim_id: String,
        round: u32,
        resolved: usize,
        manual_review: usize,
    },
    ConsensusReached {
        claim_id: String,
        veracity: Veracity,
        confidence: f64,
        agreement: f64,
        forced: bool,
    },
    DebateTimedOut {
        claim_id: String,
        rounds_completed: u32,
    },
    DebateFailed {
        claim_id: String,
        reason: String,
    },
    MessagePosted {
        message_id: String,
        from: AgentType,
        recipient: Recipient,
    },
}

impl ProgressUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClaimExtracted { .. } => "CLAIM_EXTRACTED",
            Self::InvestigationStarted { .. } => "INVESTIGATION_STARTED",
            Self::InvestigationCompleted { .. } => "INVESTIGATION_COMPLETED",
            Self::DebateStarted { .. } => "DEBATE_STARTED",
            Self::DebateRound { .. } => "DEBATE_ROUND",
            Self::ConflictsResolved { .. } => "CONFLICTS_RESOLVED",
            Self::ConsensusReached { .. } => "CONSENSUS_REACHED",
            Self::DebateTimedOut { .. } => "DEBATE_TIMED_OUT",
            Self::DebateFailed { .. } => "DEBATE_FAILED",
            Self::MessagePosted { .. } => "MESSAGE_POSTED",
        }
    }
}

/// A progress update as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    /// Strictly increasing within a session, starting at 1
    pub sequence: u64,
    pub update: ProgressUpdate,
    pub timestamp: DateTime<Utc>,
}

/// Coarse phase of the pipeline for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    Extraction,
    Investigation,
    Debate,
    Consensus,
    Completed,
    Failed,
}

/// Progress projection maintained from stored data and published updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateProgress {
    pub session_id: String,
    pub phase: DebatePhase,
    pub processed_claims: usize,
    pub total_claims: usize,
    pub active_agents: Vec<AgentType>,
    pub current_round: u32,
    pub last_updated: DateTime<Utc>,
}

impl DebateProgress {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: DebatePhase::Extraction,
            processed_claims: 0,
            total_claims: 0,
            active_agents: Vec::new(),
            current_round: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn apply(&mut self, update: &ProgressUpdate) {
        match update {
            ProgressUpdate::ClaimExtracted { .. } => {
                self.total_claims += 1;
            }
            ProgressUpdate::InvestigationStarted { agents, .. } => {
                self.phase = DebatePhase::Investigation;
                self.set_agents(agents.iter().copied());
            }
            ProgressUpdate::InvestigationCompleted { agent, .. } => {
                self.phase = DebatePhase::Investigation;
                self.add_agent(*agent);
            }
            ProgressUpdate::DebateStarted { participants, .. } => {
                self.phase = DebatePhase::Debate;
                self.current_round = 0;
                self.set_agents(participants.iter().copied());
            }
            ProgressUpdate::DebateRound { round, .. } => {
                self.phase = DebatePhase::Debate;
                self.current_round = *round;
            }
            ProgressUpdate::ConflictsResolved { .. } | ProgressUpdate::MessagePosted { .. } => {}
            ProgressUpdate::ConsensusReached { .. } | ProgressUpdate::DebateTimedOut { .. } => {
                self.finish_claim(DebatePhase::Completed);
            }
            ProgressUpdate::DebateFailed { .. } => {
                self.finish_claim(DebatePhase::Failed);
            }
        }
        self.last_updated = Utc::now();
    }

    fn finish_claim(&mut self, phase: DebatePhase) {
        self.processed_claims = (self.processed_claims + 1).min(self.total_claims.max(1));
        self.total_claims = self.total_claims.max(self.processed_claims);
        self.active_agents.clear();
        self.phase = if self.processed_claims < self.total_claims {
            DebatePhase::Investigation
        } else {
            phase
        };
    }

    fn set_agents(&mut self, agents: impl Iterator<Item = AgentType>) {
        self.active_agents = agents.collect::<BTreeSet<_>>().into_iter().collect();
    }

    fn add_agent(&mut self, agent: AgentType) {
        if let Err(pos) = self.active_agents.binary_search(&agent) {
            self.active_agents.insert(pos, agent);
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, DebatePhase::Completed | DebatePhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_follows_pipeline() {
        let mut p = DebateProgress::new("s");
        p.apply(&ProgressUpdate::ClaimExtracted {
            claim_id: "c".into(),
            claim_text: "text".into(),
        });
        assert_eq!(p.total_claims, 1);

        p.apply(&ProgressUpdate::InvestigationCompleted {
            claim_id: "c".into(),
            agent: AgentType::News,
            conclusion: Conclusion::True,
            confidence: 70.0,
        });
        p.apply(&ProgressUpdate::DebateStarted {
            claim_id: "c".into(),
            participants: vec![AgentType::News, AgentType::Academic],
            max_rounds: 3,
        });
        assert_eq!(p.phase, DebatePhase::Debate);
        assert_eq!(p.active_agents, vec![AgentType::Academic, AgentType::News]);

        p.apply(&ProgressUpdate::DebateRound {
            claim_id: "c".into(),
            round: 2,
            conflicts: 0,
            agreement: 40.0,
        });
        assert_eq!(p.current_round, 2);

        p.apply(&ProgressUpdate::DebateTimedOut {
            claim_id: "c".into(),
            rounds_completed: 2,
        });
        assert_eq!(p.processed_claims, 1);
        assert!(p.is_finished());
        assert!(p.active_agents.is_empty());
    }

    #[test]
    fn test_update_serializes_with_type_tag() {
        let update = ProgressUpdate::DebateFailed {
            claim_id: "c".into(),
            reason: "boom".into(),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "DEBATE_FAILED");
        assert_eq!(update.kind(), "DEBATE_FAILED");
    }
}
