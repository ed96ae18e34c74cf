//! Performance monitoring, alerting and health rollup

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use verity_adversarial::DebateStatus;
use verity_core::PerformanceThresholds;

use crate::orchestrator::DebateResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Logical part of the pipeline an alert is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Orchestrator,
    Consensus,
    ConflictResolution,
    Bus,
    Coordinator,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Orchestrator,
        Component::Consensus,
        Component::ConflictResolution,
        Component::Bus,
        Component::Coordinator,
    ];
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Orchestrator => "orchestrator",
            Self::Consensus => "consensus",
            Self::ConflictResolution => "conflict_resolution",
            Self::Bus => "bus",
            Self::Coordinator => "coordinator",
        };
        f.write_str(s)
    }
}

/// What was breached, with the measured value and its limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    SlowDebate { duration_ms: u64, limit_ms: u64 },
    LowConfidence { confidence: f64, minimum: f64 },
    HighConflictRate { rate: f64, maximum: f64 },
    LowConsensusRate { rate: f64, minimum: f64 },
    ConcurrencySaturated { active: usize, limit: usize },
    MemoryPressure { used_mb: f64, limit_mb: f64 },
    DebateUnsuccessful { status: DebateStatus, reason: Option<String> },
}

impl AlertKind {
    pub fn component(&self) -> Component {
        match self {
            Self::SlowDebate { .. } | Self::DebateUnsuccessful { .. } => Component::Orchestrator,
            Self::LowConfidence { .. } | Self::LowConsensusRate { .. } => Component::Consensus,
            Self::HighConflictRate { .. } => Component::ConflictResolution,
            Self::MemoryPressure { .. } => Component::Bus,
            Self::ConcurrencySaturated { .. } => Component::Coordinator,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SlowDebate { .. } => "slow_debate",
            Self::LowConfidence { .. } => "low_confidence",
            Self::HighConflictRate { .. } => "high_conflict_rate",
            Self::LowConsensusRate { .. } => "low_consensus_rate",
            Self::ConcurrencySaturated { .. } => "concurrency_saturated",
            Self::MemoryPressure { .. } => "memory_pressure",
            Self::DebateUnsuccessful { .. } => "debate_unsuccessful",
        }
    }

    fn recommendations(&self) -> Vec<String> {
        let r: &[&str] = match self {
            Self::SlowDebate { .. } => &[
                "Lower max_rounds or timeout_per_round",
                "Check argument generation latency",
            ],
            Self::LowConfidence { .. } => &[
                "Collect more verified evidence before debating",
                "Review agent confidence calibration",
            ],
            Self::HighConflictRate { .. } => &[
                "Audit evidence sources for duplicated or stale items",
                "Review conflicts sent to manual review",
            ],
            Self::LowConsensusRate { .. } => &[
                "Review consensus thresholds",
                "Increase agent coverage for contested claims",
            ],
            Self::ConcurrencySaturated { .. } => &[
                "Raise max_concurrent_debates if resources allow",
                "Have callers retry with backoff",
            ],
            Self::MemoryPressure { .. } => &[
                "Shorten record and message retention",
                "Run bus cleanup more often",
            ],
            Self::DebateUnsuccessful { .. } => &[
                "Inspect the archived session rounds",
                "Retry the claim once the cause is addressed",
            ],
        };
        r.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub id: String,
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub recommendations: Vec<String>,
}

impl PerformanceAlert {
    pub fn new(kind: AlertKind, severity: Severity, message: String, session_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recommendations: kind.recommendations(),
            kind,
            severity,
            message,
            timestamp: Utc::now(),
            session_id: session_id.map(str::to_string),
        }
    }

    pub fn component(&self) -> Component {
        self.kind.component()
    }
}

/// System-wide figures sampled by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub active_debates: usize,
    pub max_concurrent_debates: usize,
    pub debates_finished: u64,
    /// Fraction (0.0 - 1.0) of finished debates reaching consensus
    pub consensus_rate: f64,
    /// Conflicts per round
    pub conflict_rate: f64,
    /// Mean final confidence (0 - 100)
    pub average_confidence: f64,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub overall: HealthStatus,
    pub components: BTreeMap<Component, HealthStatus>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub sessions_observed: usize,
    pub average_duration_ms: f64,
    pub consensus_rate: f64,
    pub average_confidence: f64,
    pub alerts_by_severity: BTreeMap<Severity, usize>,
    /// System-metrics samples inside the window
    pub system_samples: usize,
    pub peak_active_debates: usize,
    pub peak_memory_mb: f64,
    /// Most recent system-metrics sample
    pub latest_system: Option<SystemMetrics>,
    pub health: SystemHealth,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SessionSample {
    session_id: String,
    status: DebateStatus,
    forced: bool,
    duration_ms: u64,
    confidence: f64,
    at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MonitorState {
    alerts: VecDeque<PerformanceAlert>,
    sessions: VecDeque<SessionSample>,
    system: VecDeque<(DateTime<Utc>, SystemMetrics)>,
}

impl MonitorState {
    fn prune(&mut self, cutoff: DateTime<Utc>) {
        while self.alerts.front().is_some_and(|a| a.timestamp < cutoff) {
            self.alerts.pop_front();
        }
        while self.sessions.front().is_some_and(|s| s.at < cutoff) {
            self.sessions.pop_front();
        }
        while self.system.front().is_some_and(|(at, _)| *at < cutoff) {
            self.system.pop_front();
        }
    }
}

pub type AlertSubscriptionId = u64;

/// Alert callback. An `Err` or a panic is logged and otherwise ignored.
pub type AlertCallback = Arc<dyn Fn(&PerformanceAlert) -> Result<(), String> + Send + Sync>;

/// Observes finished debates and system metrics, raising alerts when
/// thresholds are breached
pub struct PerformanceMonitor {
    thresholds: PerformanceThresholds,
    state: RwLock<MonitorState>,
    subscribers: RwLock<Vec<(AlertSubscriptionId, AlertCallback)>>,
    next_subscription: AtomicU64,
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(PerformanceThresholds::default())
    }
}

impl PerformanceMonitor {
    pub fn new(thresholds: PerformanceThresholds) -> Self {
        Self {
            thresholds,
            state: RwLock::new(MonitorState::default()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn thresholds(&self) -> &PerformanceThresholds {
        &self.thresholds
    }

    fn retention(&self) -> Duration {
        Duration::seconds(self.thresholds.retention_secs as i64)
    }

    /// Apply a change to the window, evicting what has aged out first
    async fn record(&self, change: impl FnOnce(&mut MonitorState)) {
        let mut state = self.state.write().await;
        state.prune(Utc::now() - self.retention());
        change(&mut state);
    }

    /// Check a finished debate against the thresholds
    pub async fn monitor_session(&self, result: &DebateResult) -> Vec<PerformanceAlert> {
        let t = &self.thresholds;
        let session = Some(result.session_id.as_str());
        let mut alerts = Vec::new();

        if result.processing_time_ms > t.max_debate_duration_ms {
            let severity = if result.processing_time_ms > t.max_debate_duration_ms * 2 {
                Severity::High
            } else {
                Severity::Medium
            };
            alerts.push(PerformanceAlert::new(
                AlertKind::SlowDebate {
                    duration_ms: result.processing_time_ms,
                    limit_ms: t.max_debate_duration_ms,
                },
                severity,
                format!(
                    "Debate took {} ms (limit {} ms)",
                    result.processing_time_ms, t.max_debate_duration_ms
                ),
                session,
            ));
        }

        let confidence = result.final_consensus.confidence;
        if result.status == DebateStatus::ConsensusReached && confidence < t.min_confidence {
            let severity = if confidence < t.min_confidence / 2.0 {
                Severity::Medium
            } else {
                Severity::Low
            };
            alerts.push(PerformanceAlert::new(
                AlertKind::LowConfidence {
                    confidence,
                    minimum: t.min_confidence,
                },
                severity,
                format!("Consensus confidence {confidence:.1} below {:.1}", t.min_confidence),
                session,
            ));
        }

        let rounds = result.debate_rounds.len();
        if rounds > 0 {
            let rate = result.conflicts_detected() as f64 / rounds as f64;
            if rate > t.max_conflict_rate {
                alerts.push(PerformanceAlert::new(
                    AlertKind::HighConflictRate {
                        rate,
                        maximum: t.max_conflict_rate,
                    },
                    if rate > t.max_conflict_rate * 2.0 {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    format!("{rate:.2} conflicts per round (maximum {:.2})", t.max_conflict_rate),
                    session,
                ));
            }
        }

        if result.status == DebateStatus::Timeout {
            alerts.push(PerformanceAlert::new(
                AlertKind::DebateUnsuccessful {
                    status: result.status,
                    reason: None,
                },
                Severity::Medium,
                format!("Debate timed out after {rounds} rounds"),
                session,
            ));
        }

        let sample = SessionSample {
            session_id: result.session_id.clone(),
            status: result.status,
            forced: result.final_consensus.forced,
            duration_ms: result.processing_time_ms,
            confidence,
            at: Utc::now(),
        };
        self.record(|state| state.sessions.push_back(sample)).await;
        self.raise(alerts).await
    }

    /// Record a debate that ended in failure
    pub async fn monitor_failure(&self, session_id: &str, reason: &str) -> Vec<PerformanceAlert> {
        let sample = SessionSample {
            session_id: session_id.to_string(),
            status: DebateStatus::Failed,
            forced: false,
            duration_ms: 0,
            confidence: 0.0,
            at: Utc::now(),
        };
        self.record(|state| state.sessions.push_back(sample)).await;
        let alert = PerformanceAlert::new(
            AlertKind::DebateUnsuccessful {
                status: DebateStatus::Failed,
                reason: Some(reason.to_string()),
            },
            Severity::High,
            format!("Debate failed: {reason}"),
            Some(session_id),
        );
        self.raise(vec![alert]).await
    }

    /// Check aggregate metrics against the thresholds
    pub async fn monitor_system_metrics(&self, metrics: &SystemMetrics) -> Vec<PerformanceAlert> {
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        if metrics.debates_finished > 0 && metrics.consensus_rate < t.min_consensus_rate {
            alerts.push(PerformanceAlert::new(
                AlertKind::LowConsensusRate {
                    rate: metrics.consensus_rate,
                    minimum: t.min_consensus_rate,
                },
                if metrics.consensus_rate < t.min_consensus_rate / 2.0 {
                    Severity::High
                } else {
                    Severity::Medium
                },
                format!(
                    "Consensus rate {:.0}% below {:.0}%",
                    metrics.consensus_rate * 100.0,
                    t.min_consensus_rate * 100.0
                ),
                None,
            ));
        }

        if metrics.conflict_rate > t.max_conflict_rate {
            alerts.push(PerformanceAlert::new(
                AlertKind::HighConflictRate {
                    rate: metrics.conflict_rate,
                    maximum: t.max_conflict_rate,
                },
                Severity::Medium,
                format!("System conflict rate {:.2} per round", metrics.conflict_rate),
                None,
            ));
        }

        if metrics.debates_finished > 0 && metrics.average_confidence < t.min_confidence {
            alerts.push(PerformanceAlert::new(
                AlertKind::LowConfidence {
                    confidence: metrics.average_confidence,
                    minimum: t.min_confidence,
                },
                Severity::Low,
                format!("Average confidence {:.1} below {:.1}", metrics.average_confidence, t.min_confidence),
                None,
            ));
        }

        let limit = if metrics.max_concurrent_debates > 0 {
            metrics.max_concurrent_debates.min(t.max_concurrent_debates)
        } else {
            t.max_concurrent_debates
        };
        if metrics.active_debates >= limit {
            alerts.push(PerformanceAlert::new(
                AlertKind::ConcurrencySaturated {
                    active: metrics.active_debates,
                    limit,
                },
                if metrics.active_debates > limit {
                    Severity::Critical
                } else {
                    Severity::High
                },
                format!("{} of {} debate slots in use", metrics.active_debates, limit),
                None,
            ));
        }

        if metrics.memory_mb > t.max_memory_mb {
            alerts.push(PerformanceAlert::new(
                AlertKind::MemoryPressure {
                    used_mb: metrics.memory_mb,
                    limit_mb: t.max_memory_mb,
                },
                if metrics.memory_mb > t.max_memory_mb * 1.5 {
                    Severity::Critical
                } else {
                    Severity::High
                },
                format!("Bus holds {:.1} MB (limit {:.1} MB)", metrics.memory_mb, t.max_memory_mb),
                None,
            ));
        }

        let sample = (Utc::now(), metrics.clone());
        self.record(|state| state.system.push_back(sample)).await;
        self.raise(alerts).await
    }

    async fn raise(&self, alerts: Vec<PerformanceAlert>) -> Vec<PerformanceAlert> {
        if !alerts.is_empty() {
            self.record(|state| state.alerts.extend(alerts.iter().cloned()))
                .await;
        }

        let subscribers: Vec<AlertCallback> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for alert in &alerts {
            tracing::warn!(
                alert = alert.kind.name(),
                severity = ?alert.severity,
                component = %alert.component(),
                session_id = ?alert.session_id,
                "{}",
                alert.message
            );
            metrics::counter!(
                "verity_alerts_raised_total",
                "kind" => alert.kind.name(),
                "component" => alert.component().to_string()
            )
            .increment(1);

            for callback in &subscribers {
                match catch_unwind(AssertUnwindSafe(|| callback(alert))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(alert_id = %alert.id, error = %e, "Alert subscriber failed"),
                    Err(_) => tracing::error!(alert_id = %alert.id, "Alert subscriber panicked"),
                }
            }
        }
        alerts
    }

    /// Register a callback invoked synchronously for every alert
    pub async fn subscribe(&self, callback: AlertCallback) -> AlertSubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.push((id, callback));
        id
    }

    pub async fn unsubscribe(&self, id: AlertSubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Alerts still inside the retention window, oldest first
    pub async fn recent_alerts(&self) -> Vec<PerformanceAlert> {
        let mut state = self.state.write().await;
        state.prune(Utc::now() - self.retention());
        state.alerts.iter().cloned().collect()
    }

    /// Per-component rollup over the health window.
    ///
    /// Any critical alert or three high alerts make a component critical;
    /// a single high alert degrades it.
    pub async fn health(&self) -> SystemHealth {
        let state = self.state.read().await;
        Self::health_of(&state, self.health_cutoff())
    }

    fn health_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - Duration::seconds(self.thresholds.health_window_secs as i64)
    }

    fn health_of(state: &MonitorState, cutoff: DateTime<Utc>) -> SystemHealth {
        let mut counts: BTreeMap<Component, (usize, usize)> = BTreeMap::new();
        for alert in state.alerts.iter().filter(|a| a.timestamp >= cutoff) {
            let entry = counts.entry(alert.component()).or_default();
            match alert.severity {
                Severity::High => entry.0 += 1,
                Severity::Critical => entry.1 += 1,
                _ => {}
            }
        }

        let components: BTreeMap<Component, HealthStatus> = Component::ALL
            .iter()
            .map(|c| {
                let (high, critical) = counts.get(c).copied().unwrap_or_default();
                let status = if critical > 0 || high >= 3 {
                    HealthStatus::Critical
                } else if high > 0 {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                (*c, status)
            })
            .collect();
        let overall = components
            .values()
            .copied()
            .max()
            .unwrap_or(HealthStatus::Healthy);

        SystemHealth {
            overall,
            components,
            evaluated_at: Utc::now(),
        }
    }

    /// Aggregate view of the retention window
    pub async fn report(&self) -> PerformanceReport {
        let mut state = self.state.write().await;
        state.prune(Utc::now() - self.retention());

        let n = state.sessions.len();
        let (duration, confidence, consensus) = state.sessions.iter().fold((0u64, 0.0, 0usize), |acc, s| {
            let reached = s.status == DebateStatus::ConsensusReached && !s.forced;
            (acc.0 + s.duration_ms, acc.1 + s.confidence, acc.2 + reached as usize)
        });
        let avg = |v: f64| if n == 0 { 0.0 } else { v / n as f64 };

        let mut alerts_by_severity = BTreeMap::new();
        for alert in &state.alerts {
            *alerts_by_severity.entry(alert.severity).or_insert(0) += 1;
        }

        let system = state.system.iter().map(|(_, m)| m);
        let peak_active_debates = system.clone().map(|m| m.active_debates).max().unwrap_or(0);
        let peak_memory_mb = system.fold(0.0_f64, |peak, m| peak.max(m.memory_mb));

        PerformanceReport {
            sessions_observed: n,
            average_duration_ms: avg(duration as f64),
            consensus_rate: avg(consensus as f64),
            average_confidence: avg(confidence),
            alerts_by_severity,
            system_samples: state.system.len(),
            peak_active_debates,
            peak_memory_mb,
            latest_system: state.system.back().map(|(_, m)| m.clone()),
            health: Self::health_of(&state, self.health_cutoff()),
            generated_at: Utc::now(),
        }
    }
}
