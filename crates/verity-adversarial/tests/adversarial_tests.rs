use verity_adversarial::{
    ConflictDetector, ConflictResolver, ConflictType, ConsensusCalculator, ConsensusEngine,
    ConsensusMethod, ResolutionStrategy, Veracity,
};
use verity_core::{
    AgentType, Argument, Conclusion, DebateConfig, Evidence, SourceType, VotingWeights,
};

#[test]
fn test_majority_of_five() {
    let arguments = vec![
        Argument::new(AgentType::Academic, Conclusion::True, 80.0),
        Argument::new(AgentType::Government, Conclusion::True, 80.0),
        Argument::new(AgentType::News, Conclusion::True, 80.0),
        Argument::new(AgentType::Financial, Conclusion::True, 80.0),
        Argument::new(AgentType::Social, Conclusion::False, 60.0),
    ];

    let result = ConsensusCalculator::default().calculate("claim-1", &arguments, None);

    assert_eq!(result.method, Some(ConsensusMethod::Majority));
    assert_eq!(result.final_veracity, Veracity::VerifiedTrue);
    assert!((result.agreement_level - 80.0).abs() < 1e-9);
    assert!((result.confidence - 80.0).abs() < 1e-9);
    assert_eq!(result.minority_opinions.len(), 1);
    assert_eq!(result.participating_agents.len(), 5);
    assert!(result.reasoning.contains("4 agents"));
}

#[test]
fn test_even_split_is_insufficient() {
    // Two equally weighted experts disagreeing with equal confidence
    let arguments = vec![
        Argument::new(AgentType::Academic, Conclusion::True, 90.0),
        Argument::new(AgentType::Government, Conclusion::False, 90.0),
    ];
    let weights = VotingWeights::uniform(1.0);

    let result = ConsensusCalculator::default().calculate("claim-2", &arguments, Some(&weights));

    assert_eq!(result.final_veracity, Veracity::InsufficientEvidence);
    assert_eq!(result.confidence, 0.0);
    assert!(result.method.is_none());
    assert_eq!(result.minority_opinions.len(), 2);
}

#[test]
fn test_no_arguments_is_insufficient() {
    let result = ConsensusCalculator::default().calculate("claim-0", &[], None);
    assert_eq!(result.final_veracity, Veracity::InsufficientEvidence);
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn test_engine_uses_session_thresholds() {
    let arguments = vec![
        Argument::new(AgentType::Academic, Conclusion::True, 70.0),
        Argument::new(AgentType::News, Conclusion::True, 70.0),
    ];
    let strict = DebateConfig {
        confidence_threshold: 0.8,
        ..DebateConfig::default()
    };

    let engine = ConsensusCalculator::default();
    assert_eq!(
        engine.evaluate("c", &arguments, &DebateConfig::default()).method,
        Some(ConsensusMethod::Unanimous)
    );
    assert!(engine.evaluate("c", &arguments, &strict).method.is_none());
}

#[test]
fn test_misleading_majority() {
    let arguments = vec![
        Argument::new(AgentType::Academic, Conclusion::Misleading, 75.0),
        Argument::new(AgentType::Government, Conclusion::Misleading, 75.0),
        Argument::new(AgentType::News, Conclusion::False, 75.0),
        Argument::new(AgentType::Social, Conclusion::True, 50.0),
    ];

    let result = ConsensusCalculator::default().calculate("claim-3", &arguments, None);
    assert_eq!(result.method, Some(ConsensusMethod::Majority));
    assert_eq!(result.final_veracity, Veracity::Misleading);
}

#[test]
fn test_same_url_contradiction_yields_one_conflict() {
    let supporting = Evidence::new(
        "https://stats.example.org/report",
        SourceType::Government,
        "Unemployment will increase next year",
    )
    .shared();
    let refuting = Evidence::new(
        "https://stats.example.org/report",
        SourceType::Government,
        "Unemployment will decrease next year",
    )
    .shared();

    let arguments = vec![
        Argument::new(AgentType::Government, Conclusion::True, 70.0)
            .with_evidence(vec![supporting.clone()]),
        Argument::new(AgentType::News, Conclusion::False, 70.0)
            .with_evidence(vec![refuting.clone()]),
    ];

    let conflicts = ConflictDetector::new().detect(&arguments);

    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.conflict_type, ConflictType::SourceDisagreement);
    assert_eq!(conflict.strategy, ResolutionStrategy::CredibilityWeighted);
    assert_eq!(conflict.agents, vec![AgentType::Government, AgentType::News]);
    assert_eq!(conflict.evidence.len(), 2);
    assert!(conflict.evidence.iter().any(|e| e.content == supporting.content));
    assert!(conflict.evidence.iter().any(|e| e.content == refuting.content));

    let pool = vec![supporting, refuting];
    let resolutions = ConflictResolver::default().resolve_conflicts(&conflicts, &pool, None);
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].conflict_id, conflict.id);
    assert_eq!(resolutions[0].method, ResolutionStrategy::CredibilityWeighted);
}

#[test]
fn test_agreeing_agents_produce_no_conflicts() {
    let e = Evidence::new("https://a.org/1", SourceType::News, "Prices rose").shared();
    let arguments = vec![
        Argument::new(AgentType::News, Conclusion::True, 70.0).with_evidence(vec![e.clone()]),
        Argument::new(AgentType::Financial, Conclusion::True, 70.0).with_evidence(vec![e]),
    ];
    assert!(ConflictDetector::new().detect(&arguments).is_empty());
}
