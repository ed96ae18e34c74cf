//! # Verity Runtime
//!
//! Tokio-based debate orchestration and lifecycle management.
//!
//! - [`SystemCoordinator`]: entry point; one call per claim, bounded by a
//!   global concurrency ceiling
//! - [`DebateOrchestrator`]: drives a session round by round until
//!   consensus, the round limit, a timeout or a force-stop
//! - [`PerformanceMonitor`]: threshold alerts and per-component health

pub mod coordinator;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;

pub use coordinator::{MaintenanceReport, SystemCoordinator, SystemCoordinatorBuilder};
pub use metrics::{DebateMetrics, DebateMetricsSnapshot};
pub use monitor::{
    AlertCallback, AlertKind, AlertSubscriptionId, Component, HealthStatus, PerformanceAlert,
    PerformanceMonitor, PerformanceReport, Severity, SystemHealth, SystemMetrics,
};
pub use orchestrator::{
    ArgumentGenerator, DebateOrchestrator, DebateResult, InvestigationArguments, QualityMetrics,
};
