//! In-process debate metrics

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use verity_adversarial::DebateStatus;

/// Atomic counters for every debate run by this process
#[derive(Debug, Default)]
pub struct DebateMetrics {
    pub debates_started: AtomicU64,
    pub debates_consensus: AtomicU64,
    pub debates_forced: AtomicU64,
    pub debates_timed_out: AtomicU64,
    pub debates_failed: AtomicU64,
    pub rounds: AtomicU64,
    pub conflicts_detected: AtomicU64,
    pub conflicts_manual_review: AtomicU64,
    pub capacity_rejections: AtomicU64,
    pub alerts_raised: AtomicU64,
    pub active_debates: AtomicU64,
    /// Sum of finished debate durations
    pub duration_ms_total: AtomicU64,
    /// Sum of final confidences, in hundredths of a point
    pub confidence_centi_total: AtomicU64,
}

impl DebateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.debates_started.fetch_add(1, Ordering::Relaxed);
        self.active_debates.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("verity_debates_started_total").increment(1);
        metrics::gauge!("verity_active_debates").increment(1.0);
    }

    pub fn record_round(&self, conflicts: usize, manual_review: usize) {
        self.rounds.fetch_add(1, Ordering::Relaxed);
        self.conflicts_detected.fetch_add(conflicts as u64, Ordering::Relaxed);
        self.conflicts_manual_review
            .fetch_add(manual_review as u64, Ordering::Relaxed);
        metrics::counter!("verity_debate_rounds_total").increment(1);
    }

    pub fn record_finished(&self, status: DebateStatus, forced: bool, duration_ms: u64, confidence: f64) {
        let counter = match status {
            DebateStatus::ConsensusReached if forced => &self.debates_forced,
            DebateStatus::ConsensusReached => &self.debates_consensus,
            DebateStatus::Timeout => &self.debates_timed_out,
            _ => &self.debates_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .active_debates
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
        self.duration_ms_total.fetch_add(duration_ms, Ordering::Relaxed);
        self.confidence_centi_total
            .fetch_add((confidence.clamp(0.0, 100.0) * 100.0).round() as u64, Ordering::Relaxed);

        metrics::gauge!("verity_active_debates").decrement(1.0);
        metrics::histogram!("verity_debate_duration_ms", "status" => status.as_str())
            .record(duration_ms as f64);
    }

    pub fn record_rejection(&self) {
        self.capacity_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alerts(&self, count: usize) {
        self.alerts_raised.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DebateMetricsSnapshot {
        DebateMetricsSnapshot {
            debates_started: self.debates_started.load(Ordering::Relaxed),
            debates_consensus: self.debates_consensus.load(Ordering::Relaxed),
            debates_forced: self.debates_forced.load(Ordering::Relaxed),
            debates_timed_out: self.debates_timed_out.load(Ordering::Relaxed),
            debates_failed: self.debates_failed.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            conflicts_manual_review: self.conflicts_manual_review.load(Ordering::Relaxed),
            capacity_rejections: self.capacity_rejections.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            active_debates: self.active_debates.load(Ordering::Relaxed),
            duration_ms_total: self.duration_ms_total.load(Ordering::Relaxed),
            confidence_centi_total: self.confidence_centi_total.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DebateMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateMetricsSnapshot {
    pub debates_started: u64,
    pub debates_consensus: u64,
    pub debates_forced: u64,
    pub debates_timed_out: u64,
    pub debates_failed: u64,
    pub rounds: u64,
    pub conflicts_detected: u64,
    pub conflicts_manual_review: u64,
    pub capacity_rejections: u64,
    pub alerts_raised: u64,
    pub active_debates: u64,
    pub duration_ms_total: u64,
    pub confidence_centi_total: u64,
}

impl DebateMetricsSnapshot {
    pub fn debates_finished(&self) -> u64 {
        self.debates_consensus + self.debates_forced + self.debates_timed_out + self.debates_failed
    }

    /// Share of finished debates that reached a confident consensus
    pub fn consensus_rate(&self) -> f64 {
        ratio(self.debates_consensus, self.debates_finished())
    }

    /// Conflicts detected per round
    pub fn conflict_rate(&self) -> f64 {
        ratio(self.conflicts_detected, self.rounds)
    }

    pub fn average_duration_ms(&self) -> f64 {
        ratio(self.duration_ms_total, self.debates_finished())
    }

    pub fn average_confidence(&self) -> f64 {
        ratio(self.confidence_centi_total, self.debates_finished()) / 100.0
    }

    /// Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let counters = [
            ("verity_debates_started_total", "Debates started", self.debates_started),
            ("verity_debates_consensus_total", "Debates that reached consensus above threshold", self.debates_consensus),
            ("verity_debates_forced_total", "Debates concluded with a best-effort consensus", self.debates_forced),
            ("verity_debates_timed_out_total", "Debates that timed out or were stopped", self.debates_timed_out),
            ("verity_debates_failed_total", "Debates that failed", self.debates_failed),
            ("verity_debate_rounds_total", "Debate rounds completed", self.rounds),
            ("verity_conflicts_detected_total", "Evidence conflicts detected", self.conflicts_detected),
            ("verity_conflicts_manual_review_total", "Conflicts routed to manual review", self.conflicts_manual_review),
            ("verity_capacity_rejections_total", "Debates rejected at the concurrency ceiling", self.capacity_rejections),
            ("verity_alerts_raised_total", "Performance alerts raised", self.alerts_raised),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }

        let gauges = [
            ("verity_active_debates", "Debates currently running", self.active_debates as f64),
            ("verity_consensus_rate", "Share of finished debates reaching consensus", self.consensus_rate()),
            ("verity_conflict_rate", "Conflicts detected per round", self.conflict_rate()),
            ("verity_average_confidence", "Mean final confidence", self.average_confidence()),
            ("verity_average_duration_ms", "Mean debate duration in milliseconds", self.average_duration_ms()),
        ];
        for (name, help, value) in gauges {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} gauge");
            let _ = writeln!(out, "{name} {value:.4}");
        }
        out
    }
}

fn ratio(n: u64, d: u64) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}
