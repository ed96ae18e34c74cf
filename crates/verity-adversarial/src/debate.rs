//! Debate sessions and their rounds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use verity_core::{AgentType, Argument, DebateConfig, DebateError, EvidenceRef};

use crate::conflict::EvidenceConflict;
use crate::consensus::ConsensusResult;
use crate::resolution::ConflictResolution;

/// Lifecycle of a debate session
///
/// `Initializing -> Debating -> {ConsensusReached | Timeout | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebateStatus {
    Initializing,
    Debating,
    ConsensusReached,
    Timeout,
    Failed,
}

impl DebateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConsensusReached | Self::Timeout | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Debating => "DEBATING",
            Self::ConsensusReached => "CONSENSUS_REACHED",
            Self::Timeout => "TIMEOUT",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single round of a debate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRound {
    /// 1-based round number
    pub round_number: u32,
    pub participants: Vec<AgentType>,
    pub arguments: Vec<Argument>,
    pub conflicts: Vec<EvidenceConflict>,
    pub resolutions: Vec<ConflictResolution>,
    pub interim_consensus: Option<ConsensusResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DebateRound {
    pub fn new(round_number: u32, participants: Vec<AgentType>) -> Self {
        Self {
            round_number,
            participants,
            arguments: Vec::new(),
            conflicts: Vec::new(),
            resolutions: Vec::new(),
            interim_consensus: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Every evidence item cited in the round, deduplicated by fingerprint
    pub fn evidence_pool(&self) -> Vec<EvidenceRef> {
        let mut seen = std::collections::HashSet::new();
        self.arguments
            .iter()
            .flat_map(|a| a.evidence.iter())
            .filter(|e| seen.insert(e.fingerprint()))
            .cloned()
            .collect()
    }

    /// Agreement of the interim consensus (0 when none was computed)
    pub fn agreement(&self) -> f64 {
        self.interim_consensus
            .as_ref()
            .map_or(0.0, |c| c.agreement_level)
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }
}

/// Per-claim debate state.
///
/// Owned by a single orchestrator task while running; read-only once it
/// reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    pub session_id: String,
    pub claim_id: String,
    pub config: DebateConfig,
    pub current_round: u32,
    pub participants: Vec<AgentType>,
    pub rounds: Vec<DebateRound>,
    pub final_consensus: Option<ConsensusResult>,
    pub status: DebateStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl DebateSession {
    pub fn new(
        session_id: &str,
        claim_id: &str,
        participants: Vec<AgentType>,
        config: DebateConfig,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            claim_id: claim_id.to_string(),
            config,
            current_round: 0,
            participants,
            rounds: Vec::new(),
            final_consensus: None,
            status: DebateStatus::Initializing,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advance the round counter, moving to `Debating` on the first round
    pub fn begin_round(&mut self) -> Result<DebateRound, DebateError> {
        if self.is_terminal() {
            return Err(DebateError::SessionTerminal(self.session_id.clone()));
        }
        if self.current_round >= self.config.max_rounds {
            return Err(DebateError::RoundFailed {
                session_id: self.session_id.clone(),
                round: self.current_round + 1,
                reason: format!("round limit of {} reached", self.config.max_rounds),
            });
        }
        self.current_round += 1;
        self.status = DebateStatus::Debating;
        Ok(DebateRound::new(self.current_round, self.participants.clone()))
    }

    /// Append a completed round
    pub fn push_round(&mut self, round: DebateRound) -> Result<(), DebateError> {
        if self.is_terminal() {
            return Err(DebateError::SessionTerminal(self.session_id.clone()));
        }
        if self.rounds.len() as u32 >= self.config.max_rounds {
            return Err(DebateError::RoundFailed {
                session_id: self.session_id.clone(),
                round: round.round_number,
                reason: format!("session already holds {} rounds", self.rounds.len()),
            });
        }
        self.rounds.push(round);
        Ok(())
    }

    /// Move to a terminal status. Returns `false` if the session had
    /// already concluded, in which case nothing changes.
    pub fn conclude(&mut self, status: DebateStatus, consensus: Option<ConsensusResult>) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.final_consensus = consensus;
        self.end_time = Some(Utc::now());
        true
    }

    /// Interim consensus of the most recent round that produced one
    pub fn last_interim(&self) -> Option<&ConsensusResult> {
        self.rounds
            .iter()
            .rev()
            .find_map(|r| r.interim_consensus.as_ref())
    }

    /// Milliseconds from start to end (or to now while running)
    pub fn elapsed_ms(&self) -> u64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0) as u64
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &EvidenceConflict> {
        self.rounds.iter().flat_map(|r| r.conflicts.iter())
    }

    pub fn resolutions(&self) -> impl Iterator<Item = &ConflictResolution> {
        self.rounds.iter().flat_map(|r| r.resolutions.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(max_rounds: u32) -> DebateSession {
        let config = DebateConfig {
            max_rounds,
            ..DebateConfig::default()
        };
        DebateSession::new(
            "s-1",
            "c-1",
            vec![AgentType::Academic, AgentType::News],
            config,
        )
    }

    #[test]
    fn test_session_lifecycle() {
        let mut s = session(2);
        assert_eq!(s.status, DebateStatus::Initializing);
        assert!(s.end_time.is_none());

        let round = s.begin_round().unwrap();
        assert_eq!(round.round_number, 1);
        assert_eq!(s.status, DebateStatus::Debating);
        s.push_round(round).unwrap();

        assert!(s.conclude(DebateStatus::ConsensusReached, None));
        assert!(s.is_terminal());
        assert!(s.end_time.is_some());
    }

    #[test]
    fn test_round_limit() {
        let mut s = session(1);
        let r = s.begin_round().unwrap();
        s.push_round(r).unwrap();

        assert!(matches!(s.begin_round(), Err(DebateError::RoundFailed { .. })));
        assert!(s
            .push_round(DebateRound::new(2, s.participants.clone()))
            .is_err());
        assert_eq!(s.rounds.len(), 1);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut s = session(3);
        assert!(s.conclude(DebateStatus::Timeout, None));
        let ended = s.end_time;

        assert!(!s.conclude(DebateStatus::ConsensusReached, None));
        assert_eq!(s.status, DebateStatus::Timeout);
        assert_eq!(s.end_time, ended);
        assert!(matches!(s.begin_round(), Err(DebateError::SessionTerminal(_))));
    }

    #[test]
    fn test_non_terminal_conclude_is_rejected() {
        let mut s = session(3);
        assert!(!s.conclude(DebateStatus::Debating, None));
        assert!(s.end_time.is_none());
    }
}
