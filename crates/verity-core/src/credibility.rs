//! Credibility model: pure scoring functions over evidence.
//!
//! Every function here is deterministic given its inputs. Recency is always
//! measured against an explicit reference time instead of the wall clock, so
//! scoring the same evidence twice yields the same result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::evidence::{Evidence, EvidenceRef, SourceType};

/// Weights used by the credibility model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredibilityWeights {
    /// Trust placed in each source category (0.0 - 1.0)
    pub source_type: BTreeMap<SourceType, f64>,
    /// Multiplier for evidence flagged as verified real data
    pub verified_weight: f64,
    /// Multiplier for evidence without the verified flag
    pub unverified_weight: f64,
    /// Age at which the recency bonus halves
    pub recency_half_life_days: f64,
    /// Lowest recency weight an old item can decay to
    pub recency_floor: f64,
    /// Recency weight for items without a publication date
    pub undated_weight: f64,
}

impl Default for CredibilityWeights {
    fn default() -> Self {
        let source_type = BTreeMap::from([
            (SourceType::Academic, 1.0),
            (SourceType::Government, 0.95),
            (SourceType::Financial, 0.85),
            (SourceType::News, 0.75),
            (SourceType::Social, 0.4),
        ]);
        Self {
            source_type,
            verified_weight: 1.0,
            unverified_weight: 0.7,
            recency_half_life_days: 365.0,
            recency_floor: 0.5,
            undated_weight: 0.8,
        }
    }
}

/// Trust placed in the evidence's source category
pub fn source_type_weight(evidence: &Evidence, weights: &CredibilityWeights) -> f64 {
    weights
        .source_type
        .get(&evidence.source_type)
        .copied()
        .unwrap_or(0.5)
        .clamp(0.0, 1.0)
}

pub fn verification_weight(evidence: &Evidence, weights: &CredibilityWeights) -> f64 {
    if evidence.verified_real_data {
        weights.verified_weight
    } else {
        weights.unverified_weight
    }
}

/// Exponential decay from 1.0 toward `recency_floor` with the configured half-life.
/// Items dated after `reference` count as brand new.
pub fn recency_weight(
    publish_date: Option<DateTime<Utc>>,
    reference: DateTime<Utc>,
    weights: &CredibilityWeights,
) -> f64 {
    let Some(date) = publish_date else {
        return weights.undated_weight;
    };
    let age_days = (reference - date).num_seconds().max(0) as f64 / 86_400.0;
    let half_life = weights.recency_half_life_days.max(1.0);
    let decay = 0.5_f64.powf(age_days / half_life);
    let floor = weights.recency_floor.clamp(0.0, 1.0);
    floor + (1.0 - floor) * decay
}

/// Credibility of a single item in [0, 1]:
/// source-type weight × verification weight × recency weight × relevance.
pub fn credibility_score(
    evidence: &Evidence,
    weights: &CredibilityWeights,
    reference: DateTime<Utc>,
) -> f64 {
    let score = source_type_weight(evidence, weights)
        * verification_weight(evidence, weights)
        * recency_weight(evidence.publish_date, reference, weights)
        * (evidence.relevance_score / 100.0);
    score.clamp(0.0, 1.0)
}

/// Newest publication date in a set, used as the recency reference point
pub fn newest_publish_date(evidence: &[EvidenceRef]) -> Option<DateTime<Utc>> {
    evidence.iter().filter_map(|e| e.publish_date).max()
}

/// Quality of an evidence list for vote weighting.
///
/// Blends mean credibility (40%), mean relevance (30%) and the share of
/// verified real data (30%); floored at 0.1 and capped at 1.0.
pub fn evidence_quality_weight(evidence: &[EvidenceRef]) -> f64 {
    if evidence.is_empty() {
        return 0.1;
    }
    let n = evidence.len() as f64;
    let credibility = evidence.iter().map(|e| e.credibility_score).sum::<f64>() / n / 100.0;
    let relevance = evidence.iter().map(|e| e.relevance_score).sum::<f64>() / n / 100.0;
    let verified = evidence.iter().filter(|e| e.verified_real_data).count() as f64 / n;

    (credibility * 0.4 + relevance * 0.3 + verified * 0.3).clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_recency_decay() {
        let w = CredibilityWeights::default();
        let now = reference();

        assert_eq!(recency_weight(None, now, &w), 0.8);
        assert!((recency_weight(Some(now), now, &w) - 1.0).abs() < 1e-9);

        let one_year = recency_weight(Some(now - Duration::days(365)), now, &w);
        assert!((one_year - 0.75).abs() < 0.01);

        let ancient = recency_weight(Some(now - Duration::days(365 * 30)), now, &w);
        assert!(ancient >= 0.5 && ancient < 0.51);

        // Future-dated items are treated as new
        assert!((recency_weight(Some(now + Duration::days(3)), now, &w) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_credibility_score_ordering() {
        let w = CredibilityWeights::default();
        let academic = Evidence::new("https://uni.edu/p", SourceType::Academic, "study")
            .with_scores(90.0, 90.0)
            .verified(true);
        let social = Evidence::new("https://social.example/p", SourceType::Social, "post")
            .with_scores(90.0, 90.0);

        let a = credibility_score(&academic, &w, reference());
        let s = credibility_score(&social, &w, reference());
        assert!(a > s);
        assert!(a <= 1.0 && s >= 0.0);
    }

    #[test]
    fn test_evidence_quality_bounds() {
        assert_eq!(evidence_quality_weight(&[]), 0.1);

        let best = Evidence::new("https://a.org", SourceType::Academic, "x")
            .with_scores(100.0, 100.0)
            .verified(true)
            .shared();
        assert!((evidence_quality_weight(&[best]) - 1.0).abs() < 1e-9);

        let worst = Evidence::new("https://a.org", SourceType::Social, "x")
            .with_scores(0.0, 0.0)
            .shared();
        assert_eq!(evidence_quality_weight(&[worst]), 0.1);
    }
}
