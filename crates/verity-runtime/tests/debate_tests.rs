//! Debate lifecycle tests: stop rules, timeouts and failures

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use verity_adversarial::{
    ConsensusEngine, ConsensusMethod, ConsensusResult, DebateRound, DebateStatus, Veracity,
};
use verity_core::{
    AgentType, Argument, Claim, Conclusion, DebateConfig, DebateError, Evidence, Investigation,
    SourceType, SystemConfig,
};
use verity_persist::MemoryBus;
use verity_runtime::{
    ArgumentGenerator, DebateMetrics, DebateOrchestrator, InvestigationArguments, SystemCoordinator,
};

/// Engine replaying a fixed agreement per round
#[derive(Debug)]
struct ScriptedEngine {
    agreements: Vec<f64>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    fn new(agreements: &[f64]) -> Arc<Self> {
        Arc::new(Self {
            agreements: agreements.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl ConsensusEngine for ScriptedEngine {
    fn evaluate(&self, claim_id: &str, arguments: &[Argument], _config: &DebateConfig) -> ConsensusResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let agreement = self.agreements[call.min(self.agreements.len() - 1)];
        let mut result = ConsensusResult::insufficient(
            claim_id,
            arguments.iter().map(|a| a.agent_type).collect(),
            Vec::new(),
            format!("scripted round {}", call + 1),
        );
        result.final_veracity = Veracity::VerifiedTrue;
        result.method = Some(ConsensusMethod::Majority);
        result.confidence = 70.0;
        result.agreement_level = agreement;
        result
    }
}

/// Generator that sleeps before answering
#[derive(Debug)]
struct SlowArguments(Duration);

#[async_trait]
impl ArgumentGenerator for SlowArguments {
    async fn generate(
        &self,
        round: u32,
        investigations: &[Investigation],
        previous: &[DebateRound],
    ) -> Result<Vec<Argument>, DebateError> {
        tokio::time::sleep(self.0).await;
        InvestigationArguments.generate(round, investigations, previous).await
    }
}

/// Generator citing evidence nobody found
#[derive(Debug)]
struct StrayEvidence;

#[async_trait]
impl ArgumentGenerator for StrayEvidence {
    async fn generate(
        &self,
        _round: u32,
        investigations: &[Investigation],
        _previous: &[DebateRound],
    ) -> Result<Vec<Argument>, DebateError> {
        let planted = Evidence::new("https://planted.example/x", SourceType::Social, "made up").shared();
        Ok(investigations
            .iter()
            .map(|i| i.to_argument().with_evidence(vec![planted.clone()]))
            .collect())
    }
}

fn claim() -> Claim {
    Claim::new("req-7", "Unemployment fell to 3.9% in March", 88.0)
}

fn investigation(claim: &Claim, agent: AgentType, conclusion: Conclusion, url: &str) -> Investigation {
    let evidence = Evidence::new(url, SourceType::Government, "labour statistics release")
        .with_scores(85.0, 80.0)
        .shared();
    Investigation::new(&claim.id, agent, conclusion, 80.0).with_evidence(vec![evidence])
}

fn investigations(claim: &Claim) -> Vec<Investigation> {
    vec![
        investigation(claim, AgentType::Government, Conclusion::True, "https://stats.example/march"),
        investigation(claim, AgentType::News, Conclusion::True, "https://news.example/jobs"),
        investigation(claim, AgentType::Financial, Conclusion::PartiallyTrue, "https://markets.example/cpi"),
    ]
}

fn orchestrator(engine: Arc<dyn ConsensusEngine>, generator: Arc<dyn ArgumentGenerator>) -> DebateOrchestrator {
    DebateOrchestrator::with_components(
        Arc::new(MemoryBus::default()),
        DebateConfig::default(),
        generator,
        engine,
        Arc::new(DebateMetrics::new()),
    )
}

#[tokio::test]
async fn test_consensus_reached_only_when_threshold_crossed() {
    let engine = ScriptedEngine::new(&[40.0, 55.0, 65.0]);
    let orch = orchestrator(engine.clone(), Arc::new(InvestigationArguments));
    let claim = claim();
    let config = DebateConfig {
        max_rounds: 3,
        consensus_threshold: 0.6,
        ..DebateConfig::default()
    };

    orch.initialize_debate("s-3", &claim, &investigations(&claim), Some(config))
        .await
        .unwrap();
    let result = orch.run_debate("s-3").await.unwrap();

    assert_eq!(result.status, DebateStatus::ConsensusReached);
    assert_eq!(result.debate_rounds.len(), 3);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 3);
    assert!(!result.final_consensus.forced);
    assert!((result.final_consensus.agreement_level - 65.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_round_limit_yields_forced_result() {
    for allow_partial in [true, false] {
        let orch = orchestrator(ScriptedEngine::new(&[50.0]), Arc::new(InvestigationArguments));
        let claim = claim();
        let config = DebateConfig {
            max_rounds: 2,
            allow_partial_consensus: allow_partial,
            ..DebateConfig::default()
        };
        orch.initialize_debate("s-limit", &claim, &investigations(&claim), Some(config))
            .await
            .unwrap();
        let result = orch.run_debate("s-limit").await.unwrap();

        let expected = if allow_partial {
            DebateStatus::ConsensusReached
        } else {
            DebateStatus::Timeout
        };
        assert_eq!(result.status, expected);
        assert_eq!(result.debate_rounds.len(), 2);
        assert!(result.final_consensus.forced);
        assert_eq!(result.final_consensus.final_veracity, Veracity::VerifiedTrue);
    }
}

#[tokio::test]
async fn test_round_timeout_concludes_without_error() {
    let orch = orchestrator(
        ScriptedEngine::new(&[90.0]),
        Arc::new(SlowArguments(Duration::from_millis(300))),
    );
    let claim = claim();
    let config = DebateConfig {
        timeout_per_round_ms: 30,
        ..DebateConfig::default()
    };
    orch.initialize_debate("s-slow", &claim, &investigations(&claim), Some(config))
        .await
        .unwrap();

    let result = orch.run_debate("s-slow").await.unwrap();
    assert_eq!(result.status, DebateStatus::Timeout);
    assert!(result.debate_rounds.is_empty());
    assert_eq!(result.final_consensus.final_veracity, Veracity::InsufficientEvidence);

    let archived = orch.get_session("s-slow").await.unwrap().unwrap();
    assert_eq!(archived.status, DebateStatus::Timeout);
    assert_eq!(orch.active_sessions().await, 0);
}

#[tokio::test]
async fn test_stray_evidence_fails_the_round() {
    let orch = orchestrator(ScriptedEngine::new(&[90.0]), Arc::new(StrayEvidence));
    let claim = claim();
    orch.initialize_debate("s-bad", &claim, &investigations(&claim), None)
        .await
        .unwrap();

    let err = orch.run_debate("s-bad").await.unwrap_err();
    match err {
        DebateError::RoundFailed { round, reason, .. } => {
            assert_eq!(round, 1);
            assert!(reason.contains("outside its investigation"));
        }
        other => panic!("unexpected error: {other}"),
    }
    let session = orch.get_session("s-bad").await.unwrap().unwrap();
    assert_eq!(session.status, DebateStatus::Failed);
}

#[tokio::test]
async fn test_initialize_rejects_bad_input() {
    let orch = orchestrator(ScriptedEngine::new(&[90.0]), Arc::new(InvestigationArguments));
    let claim = claim();

    let err = orch.initialize_debate("s-4", &claim, &[], None).await.unwrap_err();
    assert_eq!(
        err,
        DebateError::InsufficientAgents {
            claim_id: claim.id.clone(),
            found: 0
        }
    );
    assert!(orch.get_session("s-4").await.unwrap().is_none());

    // Two investigations by the same agent count once
    let dup = vec![
        investigation(&claim, AgentType::News, Conclusion::True, "https://a.example"),
        investigation(&claim, AgentType::News, Conclusion::False, "https://b.example"),
    ];
    let err = orch.initialize_debate("s-4", &claim, &dup, None).await.unwrap_err();
    assert!(matches!(err, DebateError::InsufficientAgents { found: 1, .. }));

    let thin: Vec<Investigation> = investigations(&claim)
        .into_iter()
        .take(2)
        .map(|i| i.with_evidence(Vec::new()))
        .collect();
    let err = orch.initialize_debate("s-4", &claim, &thin, None).await.unwrap_err();
    assert!(matches!(err, DebateError::InsufficientEvidence { required: 2, found: 0, .. }));

    orch.initialize_debate("s-4", &claim, &investigations(&claim), None)
        .await
        .unwrap();
    let err = orch
        .initialize_debate("s-4", &claim, &investigations(&claim), None)
        .await
        .unwrap_err();
    assert_eq!(err, DebateError::SessionExists("s-4".into()));
}

#[tokio::test]
async fn test_coordinator_rejects_missing_investigations() {
    let coordinator = SystemCoordinator::new(SystemConfig::default()).unwrap();
    let claim = claim();

    let err = coordinator.process_claim(&claim, &[], None).await.unwrap_err();
    assert!(matches!(err, DebateError::InsufficientAgents { found: 0, .. }));
    assert!(err.is_input_error());

    let session_id = format!("{}:{}", claim.session_id, claim.id);
    assert!(coordinator.get_session(&session_id).await.unwrap().is_none());
    assert!(coordinator.recent_alerts().await.is_empty());
}

#[tokio::test]
async fn test_stop_before_run_releases_session() {
    let orch = orchestrator(ScriptedEngine::new(&[90.0]), Arc::new(InvestigationArguments));
    let claim = claim();
    let invs = investigations(&claim);

    orch.initialize_debate("s-idle", &claim, &invs, None).await.unwrap();
    assert!(orch.force_stop("s-idle").await.unwrap());
    assert_eq!(orch.active_sessions().await, 0);

    // The concluded state is what a late run sees
    let result = orch.run_debate("s-idle").await.unwrap();
    assert_eq!(result.status, DebateStatus::Timeout);
    assert!(result.debate_rounds.is_empty());
    assert_eq!(result.final_consensus.final_veracity, Veracity::InsufficientEvidence);

    let archived = orch.get_session("s-idle").await.unwrap().unwrap();
    assert_eq!(archived.status, DebateStatus::Timeout);
    assert!(!orch.force_stop("s-idle").await.unwrap());

    // The id is free again
    orch.initialize_debate("s-idle", &claim, &invs, None).await.unwrap();
    let rerun = orch.run_debate("s-idle").await.unwrap();
    assert_eq!(rerun.status, DebateStatus::ConsensusReached);
    assert_eq!(orch.active_sessions().await, 0);
}
