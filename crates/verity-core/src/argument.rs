//! Arguments exchanged during a debate round

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::claim::{AgentType, Conclusion};
use crate::evidence::EvidenceRef;

/// Stance an argument takes on the claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Supports,
    Refutes,
    Neutral,
}

impl Position {
    pub fn is_neutral(&self) -> bool {
        matches!(self, Self::Neutral)
    }

    pub fn opposes(&self, other: Position) -> bool {
        matches!(
            (self, other),
            (Self::Supports, Position::Refutes) | (Self::Refutes, Position::Supports)
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Supports => "supports",
            Self::Refutes => "refutes",
            Self::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// One agent's positioned, evidenced contribution to a round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub agent_type: AgentType,
    pub position: Position,
    /// Conclusion of the investigation this argument was built from
    pub conclusion: Conclusion,
    /// Subset of the source investigation's evidence
    pub evidence: Vec<EvidenceRef>,
    pub reasoning: String,
    /// Confidence (0 - 100)
    pub confidence: f64,
}

impl Argument {
    pub fn new(agent_type: AgentType, conclusion: Conclusion, confidence: f64) -> Self {
        Self {
            agent_type,
            position: conclusion.position(),
            conclusion,
            evidence: Vec::new(),
            reasoning: String::new(),
            confidence: confidence.clamp(0.0, 100.0),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<EvidenceRef>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_reasoning(mut self, reasoning: &str) -> Self {
        self.reasoning = reasoning.to_string();
        self
    }
}
