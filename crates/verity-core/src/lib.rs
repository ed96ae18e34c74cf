//! # Verity Core
//!
//! Core types shared by every Verity crate:
//! - [`Claim`] and [`Investigation`]: inputs produced by the extraction and
//!   investigation collaborators
//! - [`Evidence`]: immutable, reference-shared evidence items
//! - [`Argument`]: one agent's positioned contribution to a debate round
//! - [`credibility`]: pure scoring functions over evidence
//! - [`DebateConfig`] / [`SystemConfig`]: tunables, loadable from the environment
//! - [`DebateError`]: the error taxonomy surfaced to callers

pub mod argument;
pub mod claim;
pub mod config;
pub mod credibility;
pub mod error;
pub mod evidence;

pub use argument::{Argument, Position};
pub use claim::{AgentType, Claim, Conclusion, Investigation};
pub use config::{
    BusConfig, DebateConfig, PerformanceThresholds, SystemConfig, VotingWeights,
};
pub use credibility::CredibilityWeights;
pub use error::{ConfigError, DebateError};
pub use evidence::{Evidence, EvidenceRef, SourceType};
