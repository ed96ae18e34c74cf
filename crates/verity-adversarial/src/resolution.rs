//! Conflict resolution strategies
//!
//! Each conflict is resolved on its own into a kept/discarded partition of
//! its evidence. A conflict that cannot be resolved degrades to a manual
//! review resolution that keeps everything; it never aborts the batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use verity_core::credibility::{self, CredibilityWeights};
use verity_core::EvidenceRef;

use crate::conflict::{ConflictType, EvidenceConflict, MethodologyGroup};

/// Confidence assigned to conflicts routed to manual review
pub const MANUAL_REVIEW_CONFIDENCE: f64 = 30.0;
/// Confidence ceiling when conflicting interpretations are merged
pub const INTERPRETATION_CONFIDENCE_CAP: f64 = 75.0;

/// How a conflict was (or will be) resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    CredibilityWeighted,
    TemporalPriority,
    MethodologyRanking,
    InterpretationMerge,
    ManualReview,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredibilityWeighted => "credibility_weighted",
            Self::TemporalPriority => "temporal_priority",
            Self::MethodologyRanking => "methodology_ranking",
            Self::InterpretationMerge => "interpretation_merge",
            Self::ManualReview => "manual_review",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one conflict. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict_id: String,
    pub method: ResolutionStrategy,
    pub resolved_evidence: Vec<EvidenceRef>,
    pub discarded_evidence: Vec<EvidenceRef>,
    /// Confidence (0 - 100)
    pub confidence: f64,
    pub rationale: String,
    pub resolved_at: DateTime<Utc>,
}

impl ConflictResolution {
    pub fn needs_review(&self) -> bool {
        self.method == ResolutionStrategy::ManualReview
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Conflict {0} carries no evidence")]
    EmptyConflict(String),
    #[error("Conflict {conflict_id} references evidence outside the round: {url}")]
    UnknownEvidence { conflict_id: String, url: String },
}

/// Resolves evidence conflicts with a per-type strategy
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    pub weights: CredibilityWeights,
}

impl ConflictResolver {
    pub fn new(weights: CredibilityWeights) -> Self {
        Self { weights }
    }

    /// Resolve every conflict independently.
    ///
    /// `all_evidence` is the pool the conflicts were detected in; a conflict
    /// citing anything outside it is sent to manual review.
    pub fn resolve_conflicts(
        &self,
        conflicts: &[EvidenceConflict],
        all_evidence: &[EvidenceRef],
        weights: Option<&CredibilityWeights>,
    ) -> Vec<ConflictResolution> {
        let weights = weights.unwrap_or(&self.weights);
        let pool: HashSet<String> = all_evidence.iter().map(|e| e.fingerprint()).collect();

        conflicts
            .iter()
            .map(|conflict| match self.resolve(conflict, &pool, weights) {
                Ok(resolution) => {
                    tracing::debug!(
                        conflict_id = %conflict.id,
                        method = %resolution.method,
                        kept = resolution.resolved_evidence.len(),
                        discarded = resolution.discarded_evidence.len(),
                        "Conflict resolved"
                    );
                    resolution
                }
                Err(e) => {
                    tracing::warn!(conflict_id = %conflict.id, error = %e, "Conflict sent to manual review");
                    metrics::counter!("verity_conflicts_manual_review_total").increment(1);
                    Self::manual_review(conflict, &e.to_string())
                }
            })
            .collect()
    }

    /// Resolve a single conflict with the strategy for its type
    pub fn resolve(
        &self,
        conflict: &EvidenceConflict,
        pool: &HashSet<String>,
        weights: &CredibilityWeights,
    ) -> Result<ConflictResolution, ResolutionError> {
        if conflict.evidence.is_empty() {
            return Err(ResolutionError::EmptyConflict(conflict.id.clone()));
        }
        if let Some(stray) = conflict.evidence.iter().find(|e| !pool.contains(&e.fingerprint())) {
            return Err(ResolutionError::UnknownEvidence {
                conflict_id: conflict.id.clone(),
                url: stray.source_url.clone(),
            });
        }

        let reference = credibility::newest_publish_date(&conflict.evidence).unwrap_or_else(Utc::now);
        let resolution = match conflict.conflict_type {
            ConflictType::SourceDisagreement => self.credibility_weighted(conflict, weights, reference),
            ConflictType::TemporalDiscrepancy => self.temporal_priority(conflict, weights, reference),
            ConflictType::MethodologyDifference => self.methodology_ranking(conflict, weights, reference),
            ConflictType::InterpretationVariance => self.interpretation_merge(conflict, weights, reference),
        };
        Ok(resolution)
    }

    /// Resolution that keeps all evidence for a human to arbitrate
    pub fn manual_review(conflict: &EvidenceConflict, reason: &str) -> ConflictResolution {
        ConflictResolution {
            conflict_id: conflict.id.clone(),
            method: ResolutionStrategy::ManualReview,
            resolved_evidence: conflict.evidence.clone(),
            discarded_evidence: Vec::new(),
            confidence: MANUAL_REVIEW_CONFIDENCE,
            rationale: format!("Automatic resolution failed ({reason}); all evidence preserved for manual review"),
            resolved_at: Utc::now(),
        }
    }

    /// Keep every item scoring at least 60% of the most credible one
    fn credibility_weighted(
        &self,
        conflict: &EvidenceConflict,
        weights: &CredibilityWeights,
        reference: DateTime<Utc>,
    ) -> ConflictResolution {
        let scored: Vec<(EvidenceRef, f64)> = conflict
            .evidence
            .iter()
            .map(|e| (e.clone(), credibility::credibility_score(e, weights, reference)))
            .collect();
        let top = scored.iter().map(|(_, s)| *s).fold(0.0, f64::max);
        let cutoff = top * 0.6;

        let (kept, discarded): (Vec<_>, Vec<_>) = scored.into_iter().partition(|(_, s)| *s >= cutoff);
        let confidence = mean(kept.iter().map(|(_, s)| *s)) * 100.0;

        ConflictResolution {
            conflict_id: conflict.id.clone(),
            method: ResolutionStrategy::CredibilityWeighted,
            rationale: format!(
                "Kept {} of {} items scoring at least 60% of the top credibility ({:.2})",
                kept.len(),
                kept.len() + discarded.len(),
                top
            ),
            resolved_evidence: kept.into_iter().map(|(e, _)| e).collect(),
            discarded_evidence: discarded.into_iter().map(|(e, _)| e).collect(),
            confidence: confidence.clamp(0.0, 100.0),
            resolved_at: Utc::now(),
        }
    }

    /// Newest first with a decaying recency bonus; keep the top 70%
    fn temporal_priority(
        &self,
        conflict: &EvidenceConflict,
        weights: &CredibilityWeights,
        reference: DateTime<Utc>,
    ) -> ConflictResolution {
        let mut by_date: Vec<EvidenceRef> = conflict.evidence.clone();
        // Undated items rank last
        by_date.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));

        let mut scored: Vec<(EvidenceRef, f64, f64)> = by_date
            .into_iter()
            .enumerate()
            .map(|(rank, e)| {
                let base = credibility::credibility_score(&e, weights, reference);
                let bonus = (1.0 - 0.1 * rank as f64).max(0.0)
                    * credibility::recency_weight(e.publish_date, reference, weights);
                (e, base, base + bonus)
            })
            .collect();
        scored.sort_by(|a, b| b.2.total_cmp(&a.2));

        let keep = ((scored.len() as f64) * 0.7).ceil().max(1.0) as usize;
        let discarded: Vec<_> = scored.split_off(keep.min(scored.len()));
        let confidence = mean(scored.iter().map(|(_, base, _)| *base)) * 100.0;

        ConflictResolution {
            conflict_id: conflict.id.clone(),
            method: ResolutionStrategy::TemporalPriority,
            rationale: format!(
                "Prioritised the {} most recent and credible of {} items",
                scored.len(),
                scored.len() + discarded.len()
            ),
            resolved_evidence: scored.into_iter().map(|(e, _, _)| e).collect(),
            discarded_evidence: discarded.into_iter().map(|(e, _, _)| e).collect(),
            confidence: confidence.clamp(0.0, 100.0),
            resolved_at: Utc::now(),
        }
    }

    /// Keep the single best methodology cluster
    fn methodology_ranking(
        &self,
        conflict: &EvidenceConflict,
        weights: &CredibilityWeights,
        reference: DateTime<Utc>,
    ) -> ConflictResolution {
        let mut clusters: BTreeMap<MethodologyGroup, Vec<EvidenceRef>> = BTreeMap::new();
        for e in &conflict.evidence {
            clusters.entry(MethodologyGroup::detect(&e.content)).or_default().push(e.clone());
        }

        let score = |items: &[EvidenceRef]| {
            let credibility = mean(
                items
                    .iter()
                    .map(|e| credibility::credibility_score(e, weights, reference)),
            );
            credibility * (1.0 + (items.len() as f64).ln() * 0.1)
        };

        let mut best: Option<(MethodologyGroup, f64)> = None;
        for (group, items) in &clusters {
            let s = score(items);
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((*group, s));
            }
        }
        let (group, best_score) = best.unwrap_or((MethodologyGroup::General, 0.0));

        let mut resolved_evidence = Vec::new();
        let mut discarded_evidence = Vec::new();
        for (g, items) in clusters {
            if g == group {
                resolved_evidence.extend(items);
            } else {
                discarded_evidence.extend(items);
            }
        }

        ConflictResolution {
            conflict_id: conflict.id.clone(),
            method: ResolutionStrategy::MethodologyRanking,
            rationale: format!(
                "Kept the {} cluster ({} items, score {:.2}); discarded {} items from other methodologies",
                group.as_str(),
                resolved_evidence.len(),
                best_score,
                discarded_evidence.len()
            ),
            resolved_evidence,
            discarded_evidence,
            confidence: (best_score * 100.0).clamp(0.0, 100.0),
            resolved_at: Utc::now(),
        }
    }

    /// Keep everything; cap confidence to signal residual uncertainty
    fn interpretation_merge(
        &self,
        conflict: &EvidenceConflict,
        weights: &CredibilityWeights,
        reference: DateTime<Utc>,
    ) -> ConflictResolution {
        let credibility = mean(
            conflict
                .evidence
                .iter()
                .map(|e| credibility::credibility_score(e, weights, reference)),
        );
        ConflictResolution {
            conflict_id: conflict.id.clone(),
            method: ResolutionStrategy::InterpretationMerge,
            resolved_evidence: conflict.evidence.clone(),
            discarded_evidence: Vec::new(),
            confidence: (credibility * 100.0).min(INTERPRETATION_CONFIDENCE_CAP),
            rationale: format!(
                "Agents read the same {} items differently; all retained with capped confidence",
                conflict.evidence.len()
            ),
            resolved_at: Utc::now(),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use verity_core::{AgentType, Evidence, SourceType};

    fn conflict(kind: ConflictType, evidence: Vec<EvidenceRef>) -> EvidenceConflict {
        EvidenceConflict::new(kind, [AgentType::Academic, AgentType::Social], evidence, String::new())
    }

    fn resolve_one(c: &EvidenceConflict) -> ConflictResolution {
        ConflictResolver::default()
            .resolve_conflicts(std::slice::from_ref(c), &c.evidence, None)
            .remove(0)
    }

    #[test]
    fn test_credibility_weighted_discards_weak_sources() {
        let strong = Evidence::new("https://uni.edu/a", SourceType::Academic, "x")
            .with_scores(90.0, 90.0)
            .verified(true)
            .shared();
        let weak = Evidence::new("https://social.example/b", SourceType::Social, "y")
            .with_scores(30.0, 40.0)
            .shared();

        let c = conflict(ConflictType::SourceDisagreement, vec![strong.clone(), weak.clone()]);
        let r = resolve_one(&c);

        assert_eq!(r.method, ResolutionStrategy::CredibilityWeighted);
        assert_eq!(r.resolved_evidence.len(), 1);
        assert_eq!(r.resolved_evidence[0].source_url, strong.source_url);
        assert_eq!(r.discarded_evidence[0].source_url, weak.source_url);
    }

    #[test]
    fn test_temporal_priority_keeps_recent() {
        let dates = [2021, 2022, 2023, 2024];
        let evidence: Vec<EvidenceRef> = dates
            .iter()
            .map(|y| {
                Evidence::new(&format!("https://n.com/{y}"), SourceType::News, "x")
                    .with_scores(70.0, 70.0)
                    .published(Utc.with_ymd_and_hms(*y, 6, 1, 0, 0, 0).unwrap())
                    .shared()
            })
            .collect();

        let c = conflict(ConflictType::TemporalDiscrepancy, evidence);
        let r = resolve_one(&c);

        assert_eq!(r.method, ResolutionStrategy::TemporalPriority);
        assert_eq!(r.resolved_evidence.len(), 3);
        assert_eq!(r.discarded_evidence.len(), 1);
        assert_eq!(r.discarded_evidence[0].source_url, "https://n.com/2021");
    }

    #[test]
    fn test_methodology_ranking_keeps_one_cluster() {
        let evidence = vec![
            Evidence::new("https://u.edu/1", SourceType::Academic, "A clinical trial").with_scores(90.0, 90.0).shared(),
            Evidence::new("https://u.edu/2", SourceType::Academic, "A second study").with_scores(85.0, 85.0).shared(),
            Evidence::new("https://p.com/3", SourceType::Social, "An online poll").with_scores(40.0, 50.0).shared(),
        ];
        let c = conflict(ConflictType::MethodologyDifference, evidence);
        let r = resolve_one(&c);

        assert_eq!(r.method, ResolutionStrategy::MethodologyRanking);
        assert_eq!(r.resolved_evidence.len(), 2);
        assert_eq!(r.discarded_evidence.len(), 1);
        assert!(r.rationale.contains("research"));
    }

    #[test]
    fn test_interpretation_merge_caps_confidence() {
        let e = Evidence::new("https://u.edu/1", SourceType::Academic, "x")
            .with_scores(100.0, 100.0)
            .verified(true)
            .shared();
        let c = conflict(ConflictType::InterpretationVariance, vec![e]);
        let r = resolve_one(&c);

        assert_eq!(r.discarded_evidence.len(), 0);
        assert_eq!(r.confidence, INTERPRETATION_CONFIDENCE_CAP);
    }

    #[test]
    fn test_unknown_evidence_degrades_to_manual_review() {
        let inside = Evidence::new("https://a.org", SourceType::News, "x").shared();
        let outside = Evidence::new("https://b.org", SourceType::News, "y").shared();
        let c = conflict(ConflictType::SourceDisagreement, vec![inside.clone(), outside]);
        let empty = conflict(ConflictType::TemporalDiscrepancy, Vec::new());

        let resolutions =
            ConflictResolver::default().resolve_conflicts(&[c, empty], &[inside], None);

        assert_eq!(resolutions.len(), 2);
        for r in &resolutions {
            assert!(r.needs_review());
            assert_eq!(r.confidence, MANUAL_REVIEW_CONFIDENCE);
        }
        assert_eq!(resolutions[0].resolved_evidence.len(), 2);
    }
}
