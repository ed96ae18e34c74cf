//! Coordinator tests: capacity, cancellation, progress streams and alerts

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use verity_adversarial::{DebateRound, DebateStatus, Veracity};
use verity_core::{
    AgentType, Argument, Claim, Conclusion, DebateConfig, DebateError, Evidence, Investigation,
    SourceType, SystemConfig,
};
use verity_persist::{MemoryBackend, ProgressUpdate, StorageBackend};
use verity_runtime::{
    ArgumentGenerator, HealthStatus, InvestigationArguments, PerformanceAlert, SystemCoordinator,
};

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

fn evidence(url: &str, source: SourceType) -> Arc<Evidence> {
    Evidence::new(url, source, "supporting excerpt")
        .with_scores(80.0, 75.0)
        .verified(true)
        .shared()
}

fn inputs(session: &str) -> (Claim, Vec<Investigation>) {
    let claim = Claim::new(session, "The reservoir is at 40% capacity", 92.0);
    let invs = vec![
        Investigation::new(&claim.id, AgentType::Government, Conclusion::True, 85.0)
            .with_evidence(vec![evidence("https://water.example/levels", SourceType::Government)]),
        Investigation::new(&claim.id, AgentType::News, Conclusion::True, 75.0)
            .with_evidence(vec![evidence("https://news.example/drought", SourceType::News)]),
        Investigation::new(&claim.id, AgentType::Academic, Conclusion::True, 80.0)
            .with_evidence(vec![evidence("https://uni.example/hydrology", SourceType::Academic)]),
    ];
    (claim, invs)
}

fn slow_coordinator(max_concurrent: usize, delay_ms: u64) -> Arc<SystemCoordinator> {
    let config = SystemConfig {
        max_concurrent_debates: max_concurrent,
        ..SystemConfig::default()
    };
    Arc::new(
        SystemCoordinator::builder(config)
            .argument_generator(Arc::new(SlowArguments(Duration::from_millis(delay_ms))))
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_verified_claim_end_to_end() {
    let backend = Arc::new(MemoryBackend::new());
    let coordinator = SystemCoordinator::builder(SystemConfig::default())
        .storage_backend(backend.clone())
        .build()
        .unwrap();
    let (claim, invs) = inputs("req-1");

    let result = coordinator.process_claim(&claim, &invs, None).await.unwrap();
    assert_eq!(result.status, DebateStatus::ConsensusReached);
    assert_eq!(result.final_consensus.final_veracity, Veracity::VerifiedTrue);
    assert_eq!(result.debate_rounds.len(), 1);
    assert_eq!(result.participating_agents.len(), 3);
    assert_eq!(result.conflicts_detected(), 0);
    assert!((result.quality_metrics.conflict_resolution_success - 100.0).abs() < 1e-9);

    // Concluded sessions land in the configured backend
    let keys = backend.list_keys("session:").await.unwrap();
    assert_eq!(keys, vec![format!("session:{}", result.session_id)]);

    let snapshot = coordinator.metrics_snapshot();
    assert_eq!(snapshot.debates_consensus, 1);
    assert_eq!(snapshot.active_debates, 0);
    assert_eq!(coordinator.health().await.overall, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_capacity_ceiling_rejects_immediately() {
    let coordinator = slow_coordinator(1, 200);
    let (first, first_invs) = inputs("req-a");
    let (second, second_invs) = inputs("req-b");

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.process_claim(&first, &first_invs, None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = coordinator
        .process_claim(&second, &second_invs, None)
        .await
        .unwrap_err();
    assert_eq!(err, DebateError::CapacityExceeded { active: 1, limit: 1 });
    assert!(err.is_retryable());

    let result = running.await.unwrap().unwrap();
    assert_eq!(result.status, DebateStatus::ConsensusReached);
    assert_eq!(coordinator.metrics_snapshot().capacity_rejections, 1);

    // The slot is released once the first debate ends
    coordinator.process_claim(&second, &second_invs, None).await.unwrap();
}

#[tokio::test]
async fn test_force_stop_is_idempotent() {
    let coordinator = slow_coordinator(2, 300);
    let (claim, invs) = inputs("req-stop");
    let session_id = format!("req-stop:{}", claim.id);
    let mut progress = coordinator.subscribe_progress(&session_id).await;

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.process_claim(&claim, &invs, None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(coordinator.force_stop(&session_id).await.unwrap());
    assert!(!coordinator.force_stop(&session_id).await.unwrap());

    let result = running.await.unwrap().unwrap();
    assert_eq!(result.status, DebateStatus::Timeout);
    assert!(!coordinator.force_stop(&session_id).await.unwrap());
    assert_eq!(
        coordinator.force_stop("req-stop:unknown").await.unwrap_err(),
        DebateError::SessionNotFound("req-stop:unknown".into())
    );

    let timed_out = progress
        .drain()
        .into_iter()
        .filter(|e| matches!(e.update, ProgressUpdate::DebateTimedOut { .. }))
        .count();
    assert_eq!(timed_out, 1);

    let session = coordinator.get_session(&session_id).await.unwrap().unwrap();
    assert_eq!(session.status, DebateStatus::Timeout);
}

#[tokio::test]
async fn test_progress_is_ordered_per_session() {
    let coordinator = Arc::new(SystemCoordinator::new(SystemConfig::default()).unwrap());
    let mut all = coordinator.subscribe_all_progress().await;

    let claims: Vec<(Claim, Vec<Investigation>)> = (0..4).map(|i| inputs(&format!("req-{i}"))).collect();
    let runs = claims.iter().map(|(claim, invs)| {
        let coordinator = coordinator.clone();
        async move { coordinator.process_claim(claim, invs, None).await }
    });
    for result in futures::future::join_all(runs).await {
        assert_eq!(result.unwrap().status, DebateStatus::ConsensusReached);
    }

    let events = all.drain();
    for (claim, _) in &claims {
        let session_id = format!("{}:{}", claim.session_id, claim.id);
        let sequences: Vec<u64> = events
            .iter()
            .filter(|e| e.session_id == session_id)
            .map(|e| e.sequence)
            .collect();
        assert!(!sequences.is_empty());
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));

        let progress = coordinator.export_session_data(&session_id).await.unwrap().progress;
        assert!(progress.is_finished());
    }
    assert!(coordinator.unsubscribe_progress(all.id).await);
}

#[tokio::test]
async fn test_alert_subscribers_see_slow_debates() {
    let mut config = SystemConfig::default();
    config.performance.max_debate_duration_ms = 10;
    let coordinator = SystemCoordinator::builder(config)
        .argument_generator(Arc::new(SlowArguments(Duration::from_millis(40))))
        .build()
        .unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    coordinator
        .subscribe_alerts(Arc::new(move |alert: &PerformanceAlert| {
            if alert.kind.name() == "slow_debate" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }))
        .await;

    let (claim, invs) = inputs("req-slow");
    let override_config = DebateConfig {
        max_rounds: 1,
        ..DebateConfig::default()
    };
    coordinator
        .process_claim(&claim, &invs, Some(override_config))
        .await
        .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.metrics_snapshot().alerts_raised, 1);
    let alerts = coordinator.recent_alerts().await;
    assert_eq!(alerts[0].session_id.as_deref(), Some(format!("req-slow:{}", claim.id).as_str()));
    assert!(!alerts[0].recommendations.is_empty());

    let json = serde_json::to_value(&alerts[0]).unwrap();
    assert_eq!(json["kind"]["type"], "SLOW_DEBATE");
}
