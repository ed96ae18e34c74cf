//! Configuration for debates, the coordination bus and performance monitoring
//!
//! Defaults match the production settings. [`SystemConfig::from_env`] applies
//! overrides from `VERITY_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::claim::AgentType;
use crate::credibility::CredibilityWeights;
use crate::error::ConfigError;

/// Expertise weight of each agent type in weighted voting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingWeights {
    pub agent_expertise: BTreeMap<AgentType, f64>,
}

impl Default for VotingWeights {
    fn default() -> Self {
        Self {
            agent_expertise: BTreeMap::from([
                (AgentType::Academic, 1.0),
                (AgentType::Government, 0.95),
                (AgentType::Financial, 0.85),
                (AgentType::News, 0.75),
                (AgentType::Social, 0.5),
            ]),
        }
    }
}

impl VotingWeights {
    /// Uniform weights, mostly useful in tests
    pub fn uniform(weight: f64) -> Self {
        Self {
            agent_expertise: AgentType::ALL.iter().map(|a| (*a, weight)).collect(),
        }
    }

    pub fn expertise(&self, agent: AgentType) -> f64 {
        self.agent_expertise.get(&agent).copied().unwrap_or(0.5)
    }

    pub fn with_weight(mut self, agent: AgentType, weight: f64) -> Self {
        self.agent_expertise.insert(agent, weight);
        self
    }
}

/// Per-session debate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Hard ceiling on rounds per session
    pub max_rounds: u32,
    /// Agreement (0.0 - 1.0) needed to conclude
    pub consensus_threshold: f64,
    /// Confidence (0.0 - 1.0) a consensus method must reach to be valid
    pub confidence_threshold: f64,
    pub timeout_per_round_ms: u64,
    /// Minimum evidence items across all participating investigations
    pub minimum_evidence: usize,
    /// Conclude with a best-effort consensus when rounds run out below threshold
    pub allow_partial_consensus: bool,
    pub voting_weights: VotingWeights,
    pub credibility: CredibilityWeights,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            consensus_threshold: 0.6,
            confidence_threshold: 0.6,
            timeout_per_round_ms: 120_000,
            minimum_evidence: 2,
            allow_partial_consensus: true,
            voting_weights: VotingWeights::default(),
            credibility: CredibilityWeights::default(),
        }
    }
}

impl DebateConfig {
    pub fn timeout_per_round(&self) -> Duration {
        Duration::from_millis(self.timeout_per_round_ms)
    }

    /// Upper bound for the whole debate loop
    pub fn session_timeout(&self) -> Duration {
        self.timeout_per_round()
            .checked_mul(self.max_rounds.max(1))
            .unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be at least 1".into()));
        }
        for (name, value) in [
            ("consensus_threshold", self.consensus_threshold),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.timeout_per_round_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeout_per_round_ms must be positive".into(),
            ));
        }
        if self.voting_weights.agent_expertise.values().any(|w| *w < 0.0) {
            return Err(ConfigError::Invalid("voting weights must be non-negative".into()));
        }
        Ok(())
    }
}

/// Alerting thresholds for the performance monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub max_debate_duration_ms: u64,
    /// Fraction of sessions (0.0 - 1.0) expected to reach consensus
    pub min_consensus_rate: f64,
    /// Conflicts per round above which an alert is raised
    pub max_conflict_rate: f64,
    /// Minimum final confidence (0 - 100)
    pub min_confidence: f64,
    pub max_concurrent_debates: usize,
    pub max_memory_mb: f64,
    /// How long alerts and metric snapshots are kept
    pub retention_secs: u64,
    /// Window used for the health rollup
    pub health_window_secs: u64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            max_debate_duration_ms: 360_000,
            min_consensus_rate: 0.7,
            max_conflict_rate: 0.5,
            min_confidence: 60.0,
            max_concurrent_debates: 10,
            max_memory_mb: 512.0,
            retention_secs: 24 * 60 * 60,
            health_window_secs: 60 * 60,
        }
    }
}

/// Retention settings for the coordination bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Default expiry for stored records
    pub record_ttl_secs: u64,
    /// How long messages are kept before being reaped
    pub message_retention_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            record_ttl_secs: 24 * 60 * 60,
            message_retention_secs: 60 * 60,
        }
    }
}

/// Full system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub debate: DebateConfig,
    pub performance: PerformanceThresholds,
    pub bus: BusConfig,
    /// Ceiling on simultaneously running debates
    pub max_concurrent_debates: usize,
    /// Period of the maintenance ticker (cleanup + metric sampling)
    pub maintenance_interval_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            debate: DebateConfig::default(),
            performance: PerformanceThresholds::default(),
            bus: BusConfig::default(),
            max_concurrent_debates: 10,
            maintenance_interval_secs: 300,
        }
    }
}

impl SystemConfig {
    /// Defaults overridden by `VERITY_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("VERITY_MAX_ROUNDS")? {
            config.debate.max_rounds = v;
        }
        if let Some(v) = env_parse("VERITY_CONSENSUS_THRESHOLD")? {
            config.debate.consensus_threshold = v;
        }
        if let Some(v) = env_parse("VERITY_CONFIDENCE_THRESHOLD")? {
            config.debate.confidence_threshold = v;
        }
        if let Some(v) = env_parse("VERITY_ROUND_TIMEOUT_MS")? {
            config.debate.timeout_per_round_ms = v;
        }
        if let Some(v) = env_parse("VERITY_MIN_EVIDENCE")? {
            config.debate.minimum_evidence = v;
        }
        if let Some(v) = env_flag("VERITY_ALLOW_PARTIAL")? {
            config.debate.allow_partial_consensus = v;
        }
        if let Some(v) = env_parse("VERITY_MAX_CONCURRENT")? {
            config.max_concurrent_debates = v;
            config.performance.max_concurrent_debates = v;
        }
        if let Some(v) = env_parse("VERITY_MAINTENANCE_INTERVAL_SECS")? {
            config.maintenance_interval_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.debate.validate()?;
        if self.max_concurrent_debates == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_debates must be at least 1".into(),
            ));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "maintenance_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

fn env_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        },
        Err(_) => Ok(None),
    }
}
