use std::sync::Arc;

use verity_adversarial::{DebateSession, DebateStatus};
use verity_core::{AgentType, BusConfig, DebateConfig};
use verity_persist::{MemoryBackend, MemoryBus, ProgressUpdate, StorageBackend};

fn round_update(claim: &str, round: u32) -> ProgressUpdate {
    ProgressUpdate::DebateRound {
        claim_id: claim.to_string(),
        round,
        conflicts: 0,
        agreement: round as f64 * 10.0,
    }
}

#[tokio::test]
async fn test_concurrent_sessions_keep_their_own_order() {
    let bus = Arc::new(MemoryBus::default());
    let sessions: Vec<String> = (0..8).map(|i| format!("session-{i}")).collect();

    let mut subscriptions = Vec::new();
    for s in &sessions {
        subscriptions.push(bus.subscribe(s).await);
    }

    let mut handles = Vec::new();
    for s in sessions.clone() {
        let bus = bus.clone();
        handles.push(tokio::spawn(async move {
            for round in 1..=25 {
                bus.publish(&s, round_update(&s, round)).await;
                tokio::task::yield_now().await;
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    for (session, sub) in sessions.iter().zip(subscriptions.iter_mut()) {
        let events = sub.drain();
        assert_eq!(events.len(), 25);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(&event.session_id, session);
            assert_eq!(event.sequence, i as u64 + 1);
            match &event.update {
                ProgressUpdate::DebateRound { round, .. } => assert_eq!(*round, i as u32 + 1),
                other => panic!("unexpected update {other:?}"),
            }
        }
    }
}

#[tokio::test]
async fn test_archive_through_custom_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let bus = MemoryBus::with_backend(BusConfig::default(), backend.clone());

    let mut session = DebateSession::new(
        "s-9",
        "claim-9",
        vec![AgentType::Government, AgentType::Financial],
        DebateConfig::default(),
    );
    session.conclude(DebateStatus::Failed, None);

    bus.archive_session(&session).await.unwrap();

    assert!(backend.get_value("session:s-9").await.unwrap().is_some());
    let loaded = bus.archived_session("s-9").await.unwrap().unwrap();
    assert_eq!(loaded.status, DebateStatus::Failed);
    assert_eq!(bus.archived_sessions().await.unwrap(), vec!["s-9"]);
}
