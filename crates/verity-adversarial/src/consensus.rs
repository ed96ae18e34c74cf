//! Consensus voting over per-agent positions
//!
//! Methods are tried in a fixed priority order (unanimous, majority, weighted
//! vote, expert override) and the first one whose outcome clears both the
//! confidence and agreement thresholds decides the verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use verity_core::credibility::evidence_quality_weight;
use verity_core::{AgentType, Argument, Conclusion, DebateConfig, EvidenceRef, Position, VotingWeights};

/// Final verdict on a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Veracity {
    VerifiedTrue,
    VerifiedFalse,
    PartiallyTrue,
    Misleading,
    InsufficientEvidence,
}

impl Veracity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VerifiedTrue => "verified-true",
            Self::VerifiedFalse => "verified-false",
            Self::PartiallyTrue => "partially-true",
            Self::Misleading => "misleading",
            Self::InsufficientEvidence => "insufficient-evidence",
        }
    }
}

impl fmt::Display for Veracity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Conclusion> for Veracity {
    fn from(conclusion: Conclusion) -> Self {
        match conclusion {
            Conclusion::True => Self::VerifiedTrue,
            Conclusion::False => Self::VerifiedFalse,
            Conclusion::Misleading => Self::Misleading,
            Conclusion::PartiallyTrue => Self::PartiallyTrue,
            Conclusion::Insufficient => Self::InsufficientEvidence,
        }
    }
}

/// Voting algorithm that produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    Unanimous,
    Majority,
    WeightedVote,
    ExpertOverride,
}

impl ConsensusMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanimous => "unanimous",
            Self::Majority => "majority",
            Self::WeightedVote => "weighted_vote",
            Self::ExpertOverride => "expert_override",
        }
    }
}

impl fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical output of the consensus calculator. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub claim_id: String,
    pub final_veracity: Veracity,
    /// Confidence (0 - 100)
    pub confidence: f64,
    /// `None` when no method cleared the thresholds
    pub method: Option<ConsensusMethod>,
    pub supporting_evidence: Vec<EvidenceRef>,
    pub reasoning: String,
    pub participating_agents: Vec<AgentType>,
    /// Agreement (0 - 100)
    pub agreement_level: f64,
    pub minority_opinions: Vec<Argument>,
    /// Set when the debate ran out of rounds below the consensus threshold and
    /// this result was accepted as a best effort
    #[serde(default)]
    pub forced: bool,
    pub created_at: DateTime<Utc>,
}

impl ConsensusResult {
    /// Result used when no verdict can be determined
    pub fn insufficient(
        claim_id: &str,
        participating_agents: Vec<AgentType>,
        minority_opinions: Vec<Argument>,
        reasoning: String,
    ) -> Self {
        Self {
            claim_id: claim_id.to_string(),
            final_veracity: Veracity::InsufficientEvidence,
            confidence: 0.0,
            method: None,
            supporting_evidence: Vec::new(),
            reasoning,
            participating_agents,
            agreement_level: 0.0,
            minority_opinions,
            forced: false,
            created_at: Utc::now(),
        }
    }

    /// Whether a voting method produced this verdict
    pub fn is_decisive(&self) -> bool {
        self.method.is_some()
    }

    /// Mark as a best-effort result
    pub fn into_forced(mut self) -> Self {
        self.forced = true;
        self
    }
}

/// Thresholds a method outcome must clear to be accepted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Agreement required (0.0 - 1.0)
    pub consensus_threshold: f64,
    /// Confidence required (0.0 - 1.0)
    pub confidence_threshold: f64,
    /// Majority voting needs at least this many arguments
    pub min_majority_arguments: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 0.6,
            confidence_threshold: 0.6,
            min_majority_arguments: 3,
        }
    }
}

impl From<&DebateConfig> for ConsensusConfig {
    fn from(config: &DebateConfig) -> Self {
        Self {
            consensus_threshold: config.consensus_threshold,
            confidence_threshold: config.confidence_threshold,
            ..Self::default()
        }
    }
}

/// Raw outcome of a single voting method, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    pub method: ConsensusMethod,
    pub position: Position,
    /// Confidence (0 - 100)
    pub confidence: f64,
    /// Agreement (0 - 100)
    pub agreement: f64,
    pub reasoning: String,
}

/// Anything able to turn a round's arguments into a consensus
pub trait ConsensusEngine: Send + Sync + fmt::Debug {
    fn evaluate(&self, claim_id: &str, arguments: &[Argument], config: &DebateConfig)
        -> ConsensusResult;
}

/// Multi-method consensus calculator
#[derive(Debug, Clone, Default)]
pub struct ConsensusCalculator {
    pub config: ConsensusConfig,
}

impl ConsensusCalculator {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    /// Compute the verdict for a claim from one round's arguments
    pub fn calculate(
        &self,
        claim_id: &str,
        arguments: &[Argument],
        weights: Option<&VotingWeights>,
    ) -> ConsensusResult {
        let participants = participating_agents(arguments);

        if arguments.is_empty() {
            return ConsensusResult::insufficient(
                claim_id,
                participants,
                Vec::new(),
                "No arguments were presented; verdict cannot be determined".to_string(),
            );
        }

        let default_weights;
        let weights = match weights {
            Some(w) => w,
            None => {
                default_weights = VotingWeights::default();
                &default_weights
            }
        };

        let attempts = [
            self.unanimous(arguments),
            self.majority(arguments),
            self.weighted_vote(arguments, weights),
            self.expert_override(arguments, weights),
        ];

        for outcome in attempts.into_iter().flatten() {
            if !self.is_valid(&outcome) {
                tracing::debug!(
                    claim_id = %claim_id,
                    method = %outcome.method,
                    confidence = outcome.confidence,
                    agreement = outcome.agreement,
                    "Consensus method below thresholds"
                );
                continue;
            }
            metrics::counter!("verity_consensus_decisions_total", "method" => outcome.method.as_str())
                .increment(1);
            return self.build_result(claim_id, arguments, participants, outcome);
        }

        metrics::counter!("verity_consensus_decisions_total", "method" => "none").increment(1);

        let minority: Vec<Argument> = arguments
            .iter()
            .filter(|a| !a.position.is_neutral())
            .cloned()
            .collect();
        let reasoning = format!(
            "No consensus method reached the required thresholds (confidence >= {:.0}%, agreement >= {:.0}%); {} dissenting opinions retained for review",
            self.config.confidence_threshold * 100.0,
            self.config.consensus_threshold * 100.0,
            minority.len()
        );
        ConsensusResult::insufficient(claim_id, participants, minority, reasoning)
    }

    /// Valid only when every non-neutral argument takes the same position
    pub fn unanimous(&self, arguments: &[Argument]) -> Option<VoteOutcome> {
        let decided: Vec<&Argument> = non_neutral(arguments).collect();
        let position = decided.first()?.position;
        if decided.iter().any(|a| a.position != position) {
            return None;
        }

        let confidence = mean(decided.iter().map(|a| a.confidence));
        Some(VoteOutcome {
            method: ConsensusMethod::Unanimous,
            position,
            confidence,
            agreement: 100.0,
            reasoning: format!(
                "All {} agents that took a position agree the claim is {}; mean confidence {:.1}%",
                decided.len(),
                verdict_for(position, &decided),
                confidence
            ),
        })
    }

    /// A position wins with more than half of the non-neutral votes
    pub fn majority(&self, arguments: &[Argument]) -> Option<VoteOutcome> {
        if arguments.len() < self.config.min_majority_arguments {
            return None;
        }
        let decided: Vec<&Argument> = non_neutral(arguments).collect();
        if decided.is_empty() {
            return None;
        }

        let mut counts: BTreeMap<Position, usize> = BTreeMap::new();
        for arg in &decided {
            *counts.entry(arg.position).or_default() += 1;
        }
        let (position, count) = counts
            .into_iter()
            .find(|(_, count)| count * 2 > decided.len())?;

        let winners: Vec<&Argument> = decided.iter().copied().filter(|a| a.position == position).collect();
        let agreement = count as f64 / decided.len() as f64 * 100.0;
        let confidence = mean(winners.iter().map(|a| a.confidence));

        Some(VoteOutcome {
            method: ConsensusMethod::Majority,
            position,
            confidence,
            agreement,
            reasoning: format!(
                "{} agents determined the claim is {}, {} agents disagreed; agreement {:.1}%",
                count,
                verdict_for(position, &winners),
                decided.len() - count,
                agreement
            ),
        })
    }

    /// Expertise- and evidence-weighted vote.
    ///
    /// Each argument weighs `expertise × evidence quality × confidence/100`.
    /// Agreement is the winner's share of the total weight; confidence is the
    /// expertise-and-quality weighted mean confidence of the non-neutral
    /// arguments, which is non-decreasing in every argument's confidence.
    pub fn weighted_vote(&self, arguments: &[Argument], weights: &VotingWeights) -> Option<VoteOutcome> {
        let mut totals: BTreeMap<Position, f64> = BTreeMap::new();
        let mut base_sum = 0.0;
        let mut weighted_confidence = 0.0;

        for arg in arguments {
            let base = weights.expertise(arg.agent_type) * evidence_quality_weight(&arg.evidence);
            *totals.entry(arg.position).or_default() += base * arg.confidence / 100.0;
            if !arg.position.is_neutral() {
                base_sum += base;
                weighted_confidence += base * arg.confidence;
            }
        }

        let total: f64 = totals.values().sum();
        if total <= 0.0 || base_sum <= 0.0 {
            return None;
        }

        let supports = totals.get(&Position::Supports).copied().unwrap_or(0.0);
        let refutes = totals.get(&Position::Refutes).copied().unwrap_or(0.0);
        if (supports - refutes).abs() < f64::EPSILON {
            return None;
        }
        let (position, winning) = if supports > refutes {
            (Position::Supports, supports)
        } else {
            (Position::Refutes, refutes)
        };

        let share = winning / total * 100.0;
        let confidence = weighted_confidence / base_sum;
        let winners: Vec<&Argument> = arguments.iter().filter(|a| a.position == position).collect();

        Some(VoteOutcome {
            method: ConsensusMethod::WeightedVote,
            position,
            confidence,
            agreement: share,
            reasoning: format!(
                "Weighted vote favours {} with {:.1}% of expertise-weighted support across {} agents",
                verdict_for(position, &winners),
                share,
                arguments.len()
            ),
        })
    }

    /// The most expert agent type decides alone.
    ///
    /// Not applicable when that agent is neutral, or when several arguments
    /// share the top expertise weight but disagree.
    pub fn expert_override(&self, arguments: &[Argument], weights: &VotingWeights) -> Option<VoteOutcome> {
        let top_weight = arguments
            .iter()
            .map(|a| weights.expertise(a.agent_type))
            .fold(f64::NEG_INFINITY, f64::max);
        let experts: Vec<&Argument> = arguments
            .iter()
            .filter(|a| (weights.expertise(a.agent_type) - top_weight).abs() < f64::EPSILON)
            .collect();

        let position = experts.first()?.position;
        if position.is_neutral() || experts.iter().any(|a| a.position != position) {
            return None;
        }

        let confidence = mean(experts.iter().map(|a| a.confidence));
        let agent = experts[0].agent_type;
        Some(VoteOutcome {
            method: ConsensusMethod::ExpertOverride,
            position,
            confidence,
            agreement: 100.0,
            reasoning: format!(
                "Expert override: {} agent (expertise {:.2}) determined the claim is {} with {:.1}% confidence",
                agent,
                top_weight,
                verdict_for(position, &experts),
                confidence
            ),
        })
    }

    pub fn is_valid(&self, outcome: &VoteOutcome) -> bool {
        outcome.confidence >= self.config.confidence_threshold * 100.0
            && outcome.agreement >= self.config.consensus_threshold * 100.0
    }

    fn build_result(
        &self,
        claim_id: &str,
        arguments: &[Argument],
        participants: Vec<AgentType>,
        outcome: VoteOutcome,
    ) -> ConsensusResult {
        let winners: Vec<&Argument> = arguments.iter().filter(|a| a.position == outcome.position).collect();

        let mut seen = HashSet::new();
        let supporting_evidence = winners
            .iter()
            .flat_map(|a| a.evidence.iter())
            .filter(|e| seen.insert(e.fingerprint()))
            .cloned()
            .collect();

        let minority_opinions = arguments
            .iter()
            .filter(|a| a.position.opposes(outcome.position))
            .cloned()
            .collect();

        ConsensusResult {
            claim_id: claim_id.to_string(),
            final_veracity: verdict_for(outcome.position, &winners),
            confidence: outcome.confidence.clamp(0.0, 100.0),
            method: Some(outcome.method),
            supporting_evidence,
            reasoning: outcome.reasoning,
            participating_agents: participants,
            agreement_level: outcome.agreement.clamp(0.0, 100.0),
            minority_opinions,
            forced: false,
            created_at: Utc::now(),
        }
    }
}

impl ConsensusEngine for ConsensusCalculator {
    fn evaluate(&self, claim_id: &str, arguments: &[Argument], config: &DebateConfig) -> ConsensusResult {
        let calculator = ConsensusCalculator::new(ConsensusConfig {
            min_majority_arguments: self.config.min_majority_arguments,
            ..ConsensusConfig::from(config)
        });
        calculator.calculate(claim_id, arguments, Some(&config.voting_weights))
    }
}

fn non_neutral(arguments: &[Argument]) -> impl Iterator<Item = &Argument> {
    arguments.iter().filter(|a| !a.position.is_neutral())
}

fn participating_agents(arguments: &[Argument]) -> Vec<AgentType> {
    let mut agents: Vec<AgentType> = arguments.iter().map(|a| a.agent_type).collect();
    agents.sort();
    agents.dedup();
    agents
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Verdict for a winning position. A refuting side mostly built on
/// "misleading" conclusions yields `Misleading` rather than `VerifiedFalse`.
fn verdict_for(position: Position, winners: &[&Argument]) -> Veracity {
    match position {
        Position::Supports => Veracity::VerifiedTrue,
        Position::Refutes => {
            let misleading = winners
                .iter()
                .filter(|a| a.conclusion == Conclusion::Misleading)
                .count();
            if misleading * 2 > winners.len() {
                Veracity::Misleading
            } else {
                Veracity::VerifiedFalse
            }
        }
        Position::Neutral => Veracity::InsufficientEvidence,
    }
}
