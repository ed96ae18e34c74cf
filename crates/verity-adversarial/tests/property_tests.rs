use std::collections::HashSet;

use proptest::prelude::*;
use verity_adversarial::{
    ConflictResolver, ConflictType, ConsensusCalculator, EvidenceConflict,
};
use verity_core::{
    AgentType, Argument, Conclusion, CredibilityWeights, Evidence, EvidenceRef, SourceType,
    VotingWeights,
};

fn conclusion() -> impl Strategy<Value = Conclusion> {
    prop_oneof![
        Just(Conclusion::True),
        Just(Conclusion::False),
        Just(Conclusion::Misleading),
        Just(Conclusion::PartiallyTrue),
        Just(Conclusion::Insufficient),
    ]
}

fn agent() -> impl Strategy<Value = AgentType> {
    (0..AgentType::ALL.len()).prop_map(|i| AgentType::ALL[i])
}

fn source_type() -> impl Strategy<Value = SourceType> {
    (0..SourceType::ALL.len()).prop_map(|i| SourceType::ALL[i])
}

fn argument() -> impl Strategy<Value = Argument> {
    (agent(), conclusion(), 0.0..=100.0f64)
        .prop_map(|(agent, conclusion, confidence)| Argument::new(agent, conclusion, confidence))
}

fn evidence() -> impl Strategy<Value = EvidenceRef> {
    (
        0u32..20,
        source_type(),
        "[a-z ]{0,24}",
        0.0..=100.0f64,
        0.0..=100.0f64,
        any::<bool>(),
        proptest::option::of(1_500_000_000i64..1_750_000_000),
    )
        .prop_map(|(n, source, content, cred, rel, verified, ts)| {
            let mut e = Evidence::new(&format!("https://src{n}.example/doc"), source, &content)
                .with_scores(cred, rel)
                .verified(verified);
            if let Some(ts) = ts.and_then(|s| chrono::DateTime::from_timestamp(s, 0)) {
                e = e.published(ts);
            }
            e.shared()
        })
}

fn conflict_type() -> impl Strategy<Value = ConflictType> {
    prop_oneof![
        Just(ConflictType::SourceDisagreement),
        Just(ConflictType::TemporalDiscrepancy),
        Just(ConflictType::MethodologyDifference),
        Just(ConflictType::InterpretationVariance),
    ]
}

fn fingerprints(evidence: &[EvidenceRef]) -> HashSet<String> {
    evidence.iter().map(|e| e.fingerprint()).collect()
}

proptest! {
    #[test]
    fn unanimous_requires_a_single_position(arguments in prop::collection::vec(argument(), 0..8)) {
        let positions: HashSet<_> = arguments
            .iter()
            .filter(|a| !a.position.is_neutral())
            .map(|a| a.position)
            .collect();
        let outcome = ConsensusCalculator::default().unanimous(&arguments);
        if positions.len() != 1 {
            prop_assert!(outcome.is_none());
        } else {
            prop_assert!(outcome.is_some());
        }
    }

    #[test]
    fn weighted_confidence_is_monotone(
        arguments in prop::collection::vec(argument(), 1..7),
        index in any::<prop::sample::Index>(),
        bump in 0.0..=50.0f64,
    ) {
        let calculator = ConsensusCalculator::default();
        let weights = VotingWeights::default();
        let i = index.index(arguments.len());

        let mut raised = arguments.clone();
        raised[i].confidence = (raised[i].confidence + bump).min(100.0);

        let before = calculator.weighted_vote(&arguments, &weights);
        let after = calculator.weighted_vote(&raised, &weights);
        if let (Some(before), Some(after)) = (before, after) {
            prop_assert!(after.confidence + 1e-9 >= before.confidence);
        }
    }

    #[test]
    fn resolution_stays_within_conflict_evidence(
        kind in conflict_type(),
        evidence in prop::collection::vec(evidence(), 1..8),
    ) {
        let conflict = EvidenceConflict::new(
            kind,
            [AgentType::Academic, AgentType::Social],
            evidence.clone(),
            String::new(),
        );
        let resolutions = ConflictResolver::default().resolve_conflicts(
            std::slice::from_ref(&conflict),
            &evidence,
            None,
        );
        prop_assert_eq!(resolutions.len(), 1);

        let input = fingerprints(&evidence);
        let r = &resolutions[0];
        prop_assert!(fingerprints(&r.resolved_evidence).is_subset(&input));
        prop_assert!(fingerprints(&r.discarded_evidence).is_subset(&input));
        prop_assert!((0.0..=100.0).contains(&r.confidence));
    }

    #[test]
    fn resolution_is_idempotent(
        kind in conflict_type(),
        evidence in prop::collection::vec(evidence(), 1..8),
    ) {
        let conflict = EvidenceConflict::new(
            kind,
            [AgentType::News, AgentType::Financial],
            evidence.clone(),
            String::new(),
        );
        let resolver = ConflictResolver::default();
        let weights = CredibilityWeights::default();

        let first = resolver.resolve_conflicts(std::slice::from_ref(&conflict), &evidence, Some(&weights));
        let second = resolver.resolve_conflicts(std::slice::from_ref(&conflict), &evidence, Some(&weights));

        let a: Vec<String> = first[0].resolved_evidence.iter().map(|e| e.fingerprint()).collect();
        let b: Vec<String> = second[0].resolved_evidence.iter().map(|e| e.fingerprint()).collect();
        prop_assert_eq!(a, b);
    }
}
