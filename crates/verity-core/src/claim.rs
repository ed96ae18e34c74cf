//! Claims under debate and the investigations that seed them

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::argument::{Argument, Position};
use crate::evidence::EvidenceRef;

/// Category of evidence investigator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Academic,
    Government,
    News,
    Financial,
    Social,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        Self::Academic,
        Self::Government,
        Self::News,
        Self::Financial,
        Self::Social,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Government => "government",
            Self::News => "news",
            Self::Financial => "financial",
            Self::Social => "social",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim extracted from user content. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    /// Session of the extraction step that produced this claim
    pub session_id: String,
    pub claim_text: String,
    /// Extraction confidence (0 - 100)
    pub extraction_confidence: f64,
}

impl Claim {
    pub fn new(session_id: &str, claim_text: &str, extraction_confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            claim_text: claim_text.to_string(),
            extraction_confidence: extraction_confidence.clamp(0.0, 100.0),
        }
    }
}

/// Conclusion category reached by an investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    True,
    False,
    Misleading,
    PartiallyTrue,
    Insufficient,
}

impl Conclusion {
    /// Debate position implied by this conclusion
    pub fn position(&self) -> Position {
        match self {
            Self::True => Position::Supports,
            Self::False | Self::Misleading => Position::Refutes,
            Self::PartiallyTrue | Self::Insufficient => Position::Neutral,
        }
    }
}

/// One agent's investigation of one claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub claim_id: String,
    pub agent_type: AgentType,
    pub evidence_found: Vec<EvidenceRef>,
    pub reasoning: String,
    pub conclusion: Conclusion,
    /// Confidence in the conclusion (0 - 100)
    pub confidence_score: f64,
    pub processing_time_ms: u64,
    /// Whether every evidence item passed real-data validation
    #[serde(default)]
    pub safla_compliant: bool,
}

impl Investigation {
    pub fn new(
        claim_id: &str,
        agent_type: AgentType,
        conclusion: Conclusion,
        confidence_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            claim_id: claim_id.to_string(),
            agent_type,
            evidence_found: Vec::new(),
            reasoning: String::new(),
            conclusion,
            confidence_score: confidence_score.clamp(0.0, 100.0),
            processing_time_ms: 0,
            safla_compliant: false,
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<EvidenceRef>) -> Self {
        self.safla_compliant =
            !evidence.is_empty() && evidence.iter().all(|e| e.verified_real_data);
        self.evidence_found = evidence;
        self
    }

    pub fn with_reasoning(mut self, reasoning: &str) -> Self {
        self.reasoning = reasoning.to_string();
        self
    }

    /// Build the argument this investigation contributes to a round.
    ///
    /// The evidence list is carried over by reference, never copied or extended.
    pub fn to_argument(&self) -> Argument {
        Argument {
            agent_type: self.agent_type,
            position: self.conclusion.position(),
            conclusion: self.conclusion,
            evidence: self.evidence_found.clone(),
            reasoning: self.reasoning.clone(),
            confidence: self.confidence_score,
        }
    }
}
