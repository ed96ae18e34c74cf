//! System coordinator - the public entry point for processing claims

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

use verity_adversarial::{ConsensusCalculator, ConsensusEngine, DebateSession};
use verity_core::{Claim, DebateConfig, DebateError, Investigation, SystemConfig};
use verity_persist::{
    CleanupReport, MemoryBackend, MemoryBus, ProgressUpdate, RecordPayload, SessionExport,
    StorageBackend, Subscription, SubscriptionId,
};

use crate::metrics::{DebateMetrics, DebateMetricsSnapshot};
use crate::monitor::{
    AlertCallback, AlertSubscriptionId, PerformanceAlert, PerformanceMonitor, PerformanceReport,
    SystemHealth, SystemMetrics,
};
use crate::orchestrator::{
    ArgumentGenerator, DebateOrchestrator, DebateResult, InvestigationArguments,
};

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub cleanup: CleanupReport,
    pub metrics: SystemMetrics,
    pub alerts: Vec<PerformanceAlert>,
}

/// Builder for [`SystemCoordinator`] with swappable collaborators
pub struct SystemCoordinatorBuilder {
    config: SystemConfig,
    generator: Arc<dyn ArgumentGenerator>,
    consensus: Arc<dyn ConsensusEngine>,
    backend: Arc<dyn StorageBackend>,
}

impl SystemCoordinatorBuilder {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            generator: Arc::new(InvestigationArguments),
            consensus: Arc::new(ConsensusCalculator::default()),
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    pub fn argument_generator(mut self, generator: Arc<dyn ArgumentGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn consensus_engine(mut self, consensus: Arc<dyn ConsensusEngine>) -> Self {
        self.consensus = consensus;
        self
    }

    /// Backend concluded sessions are archived to
    pub fn storage_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn build(self) -> Result<SystemCoordinator, DebateError> {
        self.config.validate()?;
        let bus = Arc::new(MemoryBus::with_backend(self.config.bus.clone(), self.backend));
        let metrics = Arc::new(DebateMetrics::new());
        let orchestrator = Arc::new(DebateOrchestrator::with_components(
            bus.clone(),
            self.config.debate.clone(),
            self.generator,
            self.consensus,
            metrics.clone(),
        ));
        let monitor = Arc::new(PerformanceMonitor::new(self.config.performance.clone()));

        tracing::info!(
            max_concurrent = self.config.max_concurrent_debates,
            max_rounds = self.config.debate.max_rounds,
            "System coordinator ready"
        );
        Ok(SystemCoordinator {
            slots: Arc::new(Semaphore::new(self.config.max_concurrent_debates)),
            config: self.config,
            bus,
            orchestrator,
            monitor,
            metrics,
            maintenance: Mutex::new(None),
        })
    }
}

/// Shared handles the maintenance task needs
#[derive(Clone)]
struct Maintenance {
    bus: Arc<MemoryBus>,
    monitor: Arc<PerformanceMonitor>,
    metrics: Arc<DebateMetrics>,
    orchestrator: Arc<DebateOrchestrator>,
    max_concurrent: usize,
}

impl Maintenance {
    async fn sample(&self) -> SystemMetrics {
        let snapshot = self.metrics.snapshot();
        SystemMetrics {
            active_debates: self.orchestrator.active_sessions().await,
            max_concurrent_debates: self.max_concurrent,
            debates_finished: snapshot.debates_finished(),
            consensus_rate: snapshot.consensus_rate(),
            conflict_rate: snapshot.conflict_rate(),
            average_confidence: snapshot.average_confidence(),
            memory_mb: self.bus.stats().await.approx_mb(),
        }
    }

    async fn run(&self) -> MaintenanceReport {
        let cleanup = self.bus.cleanup().await;
        let metrics = self.sample().await;
        let alerts = self.monitor.monitor_system_metrics(&metrics).await;
        self.metrics.record_alerts(alerts.len());
        MaintenanceReport {
            cleanup,
            metrics,
            alerts,
        }
    }
}

/// Runs debates for claims under a global concurrency ceiling, watches
/// their performance and maintains the coordination bus
pub struct SystemCoordinator {
    config: SystemConfig,
    bus: Arc<MemoryBus>,
    orchestrator: Arc<DebateOrchestrator>,
    monitor: Arc<PerformanceMonitor>,
    metrics: Arc<DebateMetrics>,
    slots: Arc<Semaphore>,
    maintenance: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl fmt::Debug for SystemCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemCoordinator")
            .field("config", &self.config)
            .field("available_slots", &self.slots.available_permits())
            .finish_non_exhaustive()
    }
}

impl SystemCoordinator {
    pub fn new(config: SystemConfig) -> Result<Self, DebateError> {
        SystemCoordinatorBuilder::new(config).build()
    }

    pub fn builder(config: SystemConfig) -> SystemCoordinatorBuilder {
        SystemCoordinatorBuilder::new(config)
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<MemoryBus> {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<DebateOrchestrator> {
        &self.orchestrator
    }

    fn maintenance_handles(&self) -> Maintenance {
        Maintenance {
            bus: self.bus.clone(),
            monitor: self.monitor.clone(),
            metrics: self.metrics.clone(),
            orchestrator: self.orchestrator.clone(),
            max_concurrent: self.config.max_concurrent_debates,
        }
    }

    /// Debate one claim to a terminal status.
    ///
    /// Rejected immediately with [`DebateError::CapacityExceeded`] when every
    /// debate slot is taken. The session id is `{claim.session_id}:{claim.id}`.
    pub async fn process_claim(
        &self,
        claim: &Claim,
        investigations: &[Investigation],
        config: Option<DebateConfig>,
    ) -> Result<DebateResult, DebateError> {
        let _permit = match self.slots.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let limit = self.config.max_concurrent_debates;
                self.metrics.record_rejection();
                metrics::counter!("verity_capacity_rejections_total").increment(1);
                tracing::warn!(claim_id = %claim.id, limit, "Debate rejected at capacity");
                return Err(DebateError::CapacityExceeded {
                    active: limit - self.slots.available_permits(),
                    limit,
                });
            }
        };

        let session_id = format!("{}:{}", claim.session_id, claim.id);
        let result = self
            .debate(&session_id, claim, investigations, config)
            .await;

        match &result {
            Ok(result) => {
                let alerts = self.monitor.monitor_session(result).await;
                self.metrics.record_alerts(alerts.len());
            }
            Err(e) if e.is_input_error() => {
                tracing::info!(session_id = %session_id, error = %e, "Claim not debated");
            }
            Err(e) => {
                let alerts = self.monitor.monitor_failure(&session_id, &e.to_string()).await;
                self.metrics.record_alerts(alerts.len());
            }
        }
        result
    }

    async fn debate(
        &self,
        session_id: &str,
        claim: &Claim,
        investigations: &[Investigation],
        config: Option<DebateConfig>,
    ) -> Result<DebateResult, DebateError> {
        let session = self
            .orchestrator
            .initialize_debate(session_id, claim, investigations, config)
            .await?;

        self.bus
            .store(session_id, RecordPayload::Claim(claim.clone()))
            .await;
        self.bus
            .publish(
                session_id,
                ProgressUpdate::InvestigationStarted {
                    claim_id: claim.id.clone(),
                    agents: session.participants.clone(),
                },
            )
            .await;

        let mut seen = BTreeSet::new();
        for inv in investigations
            .iter()
            .filter(|i| i.claim_id == claim.id && seen.insert(i.agent_type))
        {
            self.bus
                .store(session_id, RecordPayload::Investigation(inv.clone()))
                .await;
        }

        self.orchestrator.run_debate(session_id).await
    }

    /// Stop a running debate. `Ok(false)` when it had already concluded.
    pub async fn force_stop(&self, session_id: &str) -> Result<bool, DebateError> {
        self.orchestrator.force_stop(session_id).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<DebateSession>, DebateError> {
        self.orchestrator.get_session(session_id).await
    }

    pub async fn subscribe_progress(&self, session_id: &str) -> Subscription {
        self.bus.subscribe(session_id).await
    }

    pub async fn subscribe_all_progress(&self) -> Subscription {
        self.bus.subscribe_all().await
    }

    pub async fn unsubscribe_progress(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id).await
    }

    pub async fn subscribe_alerts(&self, callback: AlertCallback) -> AlertSubscriptionId {
        self.monitor.subscribe(callback).await
    }

    pub async fn unsubscribe_alerts(&self, id: AlertSubscriptionId) -> bool {
        self.monitor.unsubscribe(id).await
    }

    pub async fn recent_alerts(&self) -> Vec<PerformanceAlert> {
        self.monitor.recent_alerts().await
    }

    pub async fn export_session_data(&self, session_id: &str) -> Option<SessionExport> {
        self.bus.export_session_data(session_id).await
    }

    pub async fn health(&self) -> SystemHealth {
        self.monitor.health().await
    }

    pub async fn report(&self) -> PerformanceReport {
        self.monitor.report().await
    }

    pub fn metrics_snapshot(&self) -> DebateMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current system figures without raising alerts
    pub async fn system_metrics(&self) -> SystemMetrics {
        self.maintenance_handles().sample().await
    }

    /// Sample the system figures and check them against the thresholds
    pub async fn sample_system_metrics(&self) -> Vec<PerformanceAlert> {
        let metrics = self.system_metrics().await;
        let alerts = self.monitor.monitor_system_metrics(&metrics).await;
        self.metrics.record_alerts(alerts.len());
        alerts
    }

    /// Bus cleanup followed by a metrics sample
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.maintenance_handles().run().await
    }

    /// Start the periodic maintenance task. Does nothing if already running.
    pub async fn start_maintenance(&self) {
        let mut slot = self.maintenance.lock().await;
        if slot.is_some() {
            return;
        }

        let (stop, mut stopped) = watch::channel(false);
        let handles = self.maintenance_handles();
        let period = self.config.maintenance_interval();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = handles.run().await;
                        tracing::debug!(
                            cleaned = report.cleanup.total(),
                            alerts = report.alerts.len(),
                            "Maintenance pass"
                        );
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        tracing::info!(interval = ?period, "Maintenance started");
        *slot = Some((stop, task));
    }

    /// Stop the maintenance task and wait for it to exit
    pub async fn shutdown(&self) {
        let Some((stop, task)) = self.maintenance.lock().await.take() else {
            return;
        };
        stop.send_replace(true);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Maintenance task ended abnormally");
        }
        tracing::info!("System coordinator shut down");
    }
}
