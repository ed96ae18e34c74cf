//! Debate orchestrator - drives one session per claim through its rounds

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, RwLock};

use verity_adversarial::{
    ConflictDetector, ConflictResolution, ConflictResolver, ConsensusCalculator, ConsensusEngine,
    ConsensusResult, DebateRound, DebateSession, DebateStatus, ResolutionStrategy,
};
use verity_core::credibility::evidence_quality_weight;
use verity_core::{AgentType, Argument, Claim, DebateConfig, DebateError, Investigation};
use verity_persist::{MemoryBus, ProgressUpdate, RecordPayload};

use crate::metrics::DebateMetrics;

/// Produces the arguments of a round.
///
/// Implementations may re-evaluate between rounds but must only cite
/// evidence found by the agent's own investigation.
#[async_trait]
pub trait ArgumentGenerator: Send + Sync + Debug {
    async fn generate(
        &self,
        round: u32,
        investigations: &[Investigation],
        previous: &[DebateRound],
    ) -> Result<Vec<Argument>, DebateError>;
}

/// One argument per investigation, unchanged across rounds
#[derive(Debug, Default)]
pub struct InvestigationArguments;

#[async_trait]
impl ArgumentGenerator for InvestigationArguments {
    async fn generate(
        &self,
        _round: u32,
        investigations: &[Investigation],
        _previous: &[DebateRound],
    ) -> Result<Vec<Argument>, DebateError> {
        Ok(investigations.iter().map(Investigation::to_argument).collect())
    }
}

/// Aggregate quality indicators of a finished debate (all 0 - 100)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub evidence_quality: f64,
    pub argument_strength: f64,
    pub consensus_confidence: f64,
    /// Share of conflicts resolved without manual review
    pub conflict_resolution_success: f64,
}

/// Single return value of processing one claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateResult {
    pub session_id: String,
    pub claim_id: String,
    pub status: DebateStatus,
    pub final_consensus: ConsensusResult,
    pub debate_rounds: Vec<DebateRound>,
    pub conflict_resolutions: Vec<ConflictResolution>,
    pub processing_time_ms: u64,
    pub participating_agents: Vec<AgentType>,
    pub quality_metrics: QualityMetrics,
}

impl DebateResult {
    pub(crate) fn from_session(session: &DebateSession, processing_time_ms: u64) -> Self {
        let final_consensus = session.final_consensus.clone().unwrap_or_else(|| {
            ConsensusResult::insufficient(
                &session.claim_id,
                session.participants.clone(),
                Vec::new(),
                format!("Debate ended with status {} before any consensus was computed", session.status),
            )
        });
        let conflict_resolutions: Vec<ConflictResolution> = session.resolutions().cloned().collect();
        let quality_metrics = quality_metrics(session, &final_consensus, &conflict_resolutions);

        Self {
            session_id: session.session_id.clone(),
            claim_id: session.claim_id.clone(),
            status: session.status,
            final_consensus,
            debate_rounds: session.rounds.clone(),
            conflict_resolutions,
            processing_time_ms,
            participating_agents: session.participants.clone(),
            quality_metrics,
        }
    }

    pub fn conflicts_detected(&self) -> usize {
        self.debate_rounds.iter().map(|r| r.conflicts.len()).sum()
    }
}

fn quality_metrics(
    session: &DebateSession,
    consensus: &ConsensusResult,
    resolutions: &[ConflictResolution],
) -> QualityMetrics {
    let arguments: &[Argument] = session
        .rounds
        .last()
        .map(|r| r.arguments.as_slice())
        .unwrap_or_default();
    let n = arguments.len().max(1) as f64;

    let evidence_quality = arguments
        .iter()
        .map(|a| evidence_quality_weight(&a.evidence))
        .sum::<f64>()
        / n
        * 100.0;
    let argument_strength = arguments.iter().map(|a| a.confidence).sum::<f64>() / n;
    let conflict_resolution_success = if resolutions.is_empty() {
        100.0
    } else {
        let automatic = resolutions.iter().filter(|r| !r.needs_review()).count();
        automatic as f64 / resolutions.len() as f64 * 100.0
    };

    QualityMetrics {
        evidence_quality: if arguments.is_empty() { 0.0 } else { evidence_quality },
        argument_strength,
        consensus_confidence: consensus.confidence,
        conflict_resolution_success,
    }
}

#[derive(Debug)]
struct SessionHandle {
    session: Arc<Mutex<DebateSession>>,
    investigations: Arc<Vec<Investigation>>,
    cancel: Arc<watch::Sender<bool>>,
    /// Set under the session lock once `run_debate` owns the session
    started: Arc<AtomicBool>,
}

/// How the debate loop ended
enum LoopExit {
    Concluded,
    Stopped,
    TimedOut(DebateError),
    Failed(DebateError),
}

/// Owns every running session and drives each through its rounds
#[derive(Debug)]
pub struct DebateOrchestrator {
    bus: Arc<MemoryBus>,
    generator: Arc<dyn ArgumentGenerator>,
    consensus: Arc<dyn ConsensusEngine>,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    default_config: DebateConfig,
    metrics: Arc<DebateMetrics>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl DebateOrchestrator {
    pub fn new(bus: Arc<MemoryBus>, default_config: DebateConfig) -> Self {
        Self::with_components(
            bus,
            default_config,
            Arc::new(InvestigationArguments),
            Arc::new(ConsensusCalculator::default()),
            Arc::new(DebateMetrics::new()),
        )
    }

    pub fn with_components(
        bus: Arc<MemoryBus>,
        default_config: DebateConfig,
        generator: Arc<dyn ArgumentGenerator>,
        consensus: Arc<dyn ConsensusEngine>,
        metrics: Arc<DebateMetrics>,
    ) -> Self {
        Self {
            bus,
            generator,
            consensus,
            detector: ConflictDetector::new(),
            resolver: ConflictResolver::new(default_config.credibility.clone()),
            default_config,
            metrics,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_config(&self) -> &DebateConfig {
        &self.default_config
    }

    /// Validate inputs and register a new session.
    ///
    /// Nothing is created when validation fails.
    pub async fn initialize_debate(
        &self,
        session_id: &str,
        claim: &Claim,
        investigations: &[Investigation],
        config: Option<DebateConfig>,
    ) -> Result<DebateSession, DebateError> {
        let config = config.unwrap_or_else(|| self.default_config.clone());
        config.validate()?;

        // One investigation per agent type; the first one wins
        let mut by_agent: BTreeMap<AgentType, Investigation> = BTreeMap::new();
        for inv in investigations.iter().filter(|i| i.claim_id == claim.id) {
            by_agent.entry(inv.agent_type).or_insert_with(|| inv.clone());
        }
        if by_agent.len() < 2 {
            return Err(DebateError::InsufficientAgents {
                claim_id: claim.id.clone(),
                found: by_agent.len(),
            });
        }

        let evidence: usize = by_agent.values().map(|i| i.evidence_found.len()).sum();
        if evidence < config.minimum_evidence {
            return Err(DebateError::InsufficientEvidence {
                claim_id: claim.id.clone(),
                required: config.minimum_evidence,
                found: evidence,
            });
        }

        let participants: Vec<AgentType> = by_agent.keys().copied().collect();
        let session = DebateSession::new(session_id, &claim.id, participants, config);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(DebateError::SessionExists(session_id.to_string()));
        }
        let (cancel, _) = watch::channel(false);
        sessions.insert(
            session_id.to_string(),
            SessionHandle {
                session: Arc::new(Mutex::new(session.clone())),
                investigations: Arc::new(by_agent.into_values().collect()),
                cancel: Arc::new(cancel),
                started: Arc::new(AtomicBool::new(false)),
            },
        );

        tracing::info!(
            session_id = %session_id,
            claim_id = %claim.id,
            agents = session.participants.len(),
            max_rounds = session.config.max_rounds,
            "Debate initialized"
        );
        Ok(session)
    }

    /// Run an initialized session to a terminal status.
    ///
    /// Timeouts and force-stops still yield a result; only a failed round
    /// is returned as an error. A session stopped before it ever ran yields
    /// its concluded state.
    pub async fn run_debate(&self, session_id: &str) -> Result<DebateResult, DebateError> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).map(|h| {
                (
                    h.session.clone(),
                    h.investigations.clone(),
                    h.cancel.subscribe(),
                    h.started.clone(),
                )
            })
        };
        let Some((session, investigations, mut cancel, owned)) = handle else {
            return match self.bus.archived_session(session_id).await? {
                Some(archived) => Ok(DebateResult::from_session(&archived, 0)),
                None => Err(DebateError::SessionNotFound(session_id.to_string())),
            };
        };

        let (claim_id, config, participants) = {
            let s = session.lock().await;
            if owned.swap(true, Ordering::Relaxed) {
                return Err(DebateError::SessionTerminal(session_id.to_string()));
            }
            // force_stop releases sessions that never started
            if s.is_terminal() {
                return Ok(DebateResult::from_session(&s, 0));
            }
            (s.claim_id.clone(), s.config.clone(), s.participants.clone())
        };

        let started = Instant::now();
        self.metrics.record_started();
        self.bus
            .publish(
                session_id,
                ProgressUpdate::DebateStarted {
                    claim_id: claim_id.clone(),
                    participants,
                    max_rounds: config.max_rounds,
                },
            )
            .await;

        let exit = match tokio::time::timeout(
            config.session_timeout(),
            self.debate_loop(&session, &investigations, &config, &mut cancel),
        )
        .await
        {
            Ok(exit) => exit,
            Err(_) => LoopExit::TimedOut(DebateError::SessionTimeout {
                session_id: session_id.to_string(),
                limit: config.session_timeout(),
            }),
        };

        let announced = matches!(exit, LoopExit::Stopped);
        let failure = match exit {
            LoopExit::Concluded | LoopExit::Stopped => None,
            LoopExit::TimedOut(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Debate timed out");
                self.conclude_best_effort(&session, DebateStatus::Timeout).await;
                None
            }
            LoopExit::Failed(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Debate failed");
                session.lock().await.conclude(DebateStatus::Failed, None);
                Some(e)
            }
        };

        let snapshot = session.lock().await.clone();
        let processing_time_ms = started.elapsed().as_millis() as u64;
        self.finish(&snapshot, processing_time_ms, failure.as_ref(), announced).await;

        match failure {
            Some(e) => Err(e),
            None => Ok(DebateResult::from_session(&snapshot, processing_time_ms)),
        }
    }

    async fn debate_loop(
        &self,
        session: &Mutex<DebateSession>,
        investigations: &[Investigation],
        config: &DebateConfig,
        cancel: &mut watch::Receiver<bool>,
    ) -> LoopExit {
        loop {
            if *cancel.borrow() {
                return LoopExit::Stopped;
            }
            let (mut round, session_id, claim_id, previous) = {
                let mut s = session.lock().await;
                if s.is_terminal() {
                    return LoopExit::Stopped;
                }
                match s.begin_round() {
                    Ok(r) => (r, s.session_id.clone(), s.claim_id.clone(), s.rounds.clone()),
                    Err(e) => return LoopExit::Failed(e),
                }
            };
            let number = round.round_number;

            let processed = tokio::select! {
                r = tokio::time::timeout(
                    config.timeout_per_round(),
                    self.process_round(&mut round, &claim_id, investigations, &previous, config),
                ) => r,
                _ = cancel.changed() => return LoopExit::Stopped,
            };
            match processed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return LoopExit::Failed(DebateError::RoundFailed {
                        session_id,
                        round: number,
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return LoopExit::TimedOut(DebateError::RoundTimeout {
                        session_id,
                        round: number,
                        limit: config.timeout_per_round(),
                    })
                }
            }
            round.complete();

            let manual = round.resolutions.iter().filter(|r| r.needs_review()).count();
            self.metrics.record_round(round.conflicts.len(), manual);
            let agreement = round.agreement();
            let decisive = round
                .interim_consensus
                .as_ref()
                .is_some_and(|c| c.is_decisive());

            // Round N is persisted before round N+1 starts
            self.bus
                .store(
                    &session_id,
                    RecordPayload::DebateRound {
                        claim_id: claim_id.clone(),
                        round: Box::new(round.clone()),
                    },
                )
                .await;
            if !round.conflicts.is_empty() {
                self.bus
                    .publish(
                        &session_id,
                        ProgressUpdate::ConflictsResolved {
                            claim_id: claim_id.clone(),
                            round: number,
                            resolved: round.resolutions.len() - manual,
                            manual_review: manual,
                        },
                    )
                    .await;
            }

            let mut s = session.lock().await;
            if s.is_terminal() {
                return LoopExit::Stopped;
            }
            if let Err(e) = s.push_round(round) {
                return LoopExit::Failed(e);
            }
            tracing::info!(
                session_id = %session_id,
                round = number,
                agreement,
                decisive,
                "Round complete"
            );

            if decisive && agreement >= config.consensus_threshold * 100.0 {
                let consensus = s.last_interim().cloned();
                s.conclude(DebateStatus::ConsensusReached, consensus);
                return LoopExit::Concluded;
            }
            if s.rounds.len() as u32 >= config.max_rounds {
                drop(s);
                let status = if config.allow_partial_consensus {
                    DebateStatus::ConsensusReached
                } else {
                    DebateStatus::Timeout
                };
                tracing::info!(session_id = %session_id, status = %status, "Round limit reached below threshold");
                self.conclude_best_effort(session, status).await;
                return LoopExit::Concluded;
            }
        }
    }

    async fn process_round(
        &self,
        round: &mut DebateRound,
        claim_id: &str,
        investigations: &[Investigation],
        previous: &[DebateRound],
        config: &DebateConfig,
    ) -> Result<(), DebateError> {
        let arguments = self
            .generator
            .generate(round.round_number, investigations, previous)
            .await?;
        check_arguments(&arguments, investigations)?;

        let mut conflicts = self.detector.detect(&arguments);
        round.arguments = arguments;
        let pool = round.evidence_pool();
        let resolutions = self
            .resolver
            .resolve_conflicts(&conflicts, &pool, Some(&config.credibility));
        for (conflict, resolution) in conflicts.iter_mut().zip(&resolutions) {
            conflict.resolved = resolution.method != ResolutionStrategy::ManualReview;
        }

        round.interim_consensus = Some(self.consensus.evaluate(claim_id, &round.arguments, config));
        round.conflicts = conflicts;
        round.resolutions = resolutions;
        Ok(())
    }

    /// Conclude with the latest interim consensus, marked as forced
    async fn conclude_best_effort(&self, session: &Mutex<DebateSession>, status: DebateStatus) -> bool {
        let mut s = session.lock().await;
        let consensus = s.last_interim().cloned().map(ConsensusResult::into_forced);
        s.conclude(status, consensus)
    }

    async fn finish(
        &self,
        session: &DebateSession,
        processing_time_ms: u64,
        failure: Option<&DebateError>,
        announced: bool,
    ) {
        let claim_id = session.claim_id.clone();
        let update = match (session.status, &session.final_consensus) {
            (DebateStatus::ConsensusReached, Some(c)) => ProgressUpdate::ConsensusReached {
                claim_id,
                veracity: c.final_veracity,
                confidence: c.confidence,
                agreement: c.agreement_level,
                forced: c.forced,
            },
            (DebateStatus::Failed, _) => ProgressUpdate::DebateFailed {
                claim_id,
                reason: failure.map_or_else(|| "failed".to_string(), ToString::to_string),
            },
            _ => ProgressUpdate::DebateTimedOut {
                claim_id,
                rounds_completed: session.rounds.len() as u32,
            },
        };

        if let Some(c) = &session.final_consensus {
            self.bus
                .store(&session.session_id, RecordPayload::Consensus(Box::new(c.clone())))
                .await;
        }
        // force_stop announces its own timeout
        if !announced {
            self.bus.publish(&session.session_id, update).await;
        }

        self.release(session).await;

        let (forced, confidence) = session
            .final_consensus
            .as_ref()
            .map_or((false, 0.0), |c| (c.forced, c.confidence));
        self.metrics
            .record_finished(session.status, forced, processing_time_ms, confidence);

        tracing::info!(
            session_id = %session.session_id,
            status = %session.status,
            rounds = session.rounds.len(),
            forced,
            duration_ms = processing_time_ms,
            "Debate concluded"
        );
    }

    /// Archive a terminal session and free its id
    async fn release(&self, session: &DebateSession) {
        if let Err(e) = self.bus.archive_session(session).await {
            tracing::warn!(session_id = %session.session_id, error = %e, "Failed to archive session");
        }
        self.sessions.write().await.remove(&session.session_id);
    }

    /// Stop a session immediately, concluding it as `Timeout`.
    ///
    /// Returns `false` when the session had already concluded.
    pub async fn force_stop(&self, session_id: &str) -> Result<bool, DebateError> {
        let handle = {
            let sessions = self.sessions.read().await;
            sessions
                .get(session_id)
                .map(|h| (h.session.clone(), h.cancel.clone(), h.started.clone()))
        };
        let Some((session, cancel, started)) = handle else {
            return match self.bus.archived_session(session_id).await? {
                Some(_) => Ok(false),
                None => Err(DebateError::SessionNotFound(session_id.to_string())),
            };
        };

        let (stopped, idle, snapshot) = {
            let mut s = session.lock().await;
            let consensus = s.last_interim().cloned().map(ConsensusResult::into_forced);
            let stopped = s.conclude(DebateStatus::Timeout, consensus);
            (stopped, !started.load(Ordering::Relaxed), s.clone())
        };
        cancel.send_replace(true);
        if !stopped {
            return Ok(false);
        }
        let claim_id = snapshot.claim_id.clone();
        let rounds = snapshot.rounds.len() as u32;

        tracing::warn!(session_id = %session_id, rounds, "Debate force-stopped");
        self.bus
            .publish(
                session_id,
                ProgressUpdate::DebateTimedOut {
                    claim_id,
                    rounds_completed: rounds,
                },
            )
            .await;
        // No debate loop will conclude this one
        if idle {
            self.release(&snapshot).await;
        }
        Ok(true)
    }

    /// Live session, or the archived copy once it has concluded
    pub async fn get_session(&self, session_id: &str) -> Result<Option<DebateSession>, DebateError> {
        let live = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).map(|h| h.session.clone())
        };
        match live {
            Some(session) => Ok(Some(session.lock().await.clone())),
            None => Ok(self.bus.archived_session(session_id).await?),
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Arguments must come from participating agents and only cite evidence
/// their own investigation found.
fn check_arguments(arguments: &[Argument], investigations: &[Investigation]) -> Result<(), DebateError> {
    let allowed: HashMap<AgentType, HashSet<String>> = investigations
        .iter()
        .map(|i| (i.agent_type, i.evidence_found.iter().map(|e| e.fingerprint()).collect()))
        .collect();

    for arg in arguments {
        let Some(own) = allowed.get(&arg.agent_type) else {
            return Err(DebateError::InvalidArgument(format!(
                "argument from non-participating agent {}",
                arg.agent_type
            )));
        };
        if let Some(stray) = arg.evidence.iter().find(|e| !own.contains(&e.fingerprint())) {
            return Err(DebateError::InvalidArgument(format!(
                "{} cited evidence outside its investigation: {}",
                arg.agent_type, stray.source_url
            )));
        }
    }
    Ok(())
}
