//! Error taxonomy shared across the Verity crates

use std::time::Duration;

/// Errors surfaced to callers of the debate engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DebateError {
    /// Fewer than two agent types investigated the claim
    #[error("Insufficient agents for claim {claim_id}: need at least 2, found {found}")]
    InsufficientAgents { claim_id: String, found: usize },

    #[error("Insufficient evidence for claim {claim_id}: need at least {required}, found {found}")]
    InsufficientEvidence {
        claim_id: String,
        required: usize,
        found: usize,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Session {0} has already concluded")]
    SessionTerminal(String),

    #[error("Round {round} of session {session_id} exceeded {limit:?}")]
    RoundTimeout {
        session_id: String,
        round: u32,
        limit: Duration,
    },

    #[error("Session {session_id} exceeded {limit:?}")]
    SessionTimeout { session_id: String, limit: Duration },

    /// Concurrency ceiling reached; the caller may retry later
    #[error("Capacity exceeded: {active}/{limit} debates already running")]
    CapacityExceeded { active: usize, limit: usize },

    #[error("Round {round} of session {session_id} failed: {reason}")]
    RoundFailed {
        session_id: String,
        round: u32,
        reason: String,
    },

    /// A round produced an argument that breaks the debate rules
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl DebateError {
    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Whether the error was raised because of caller input
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientAgents { .. }
                | Self::InsufficientEvidence { .. }
                | Self::SessionExists(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DebateError::CapacityExceeded { active: 3, limit: 3 }.is_retryable());
        assert!(!DebateError::SessionNotFound("s".into()).is_retryable());

        let err = DebateError::InsufficientAgents {
            claim_id: "c".into(),
            found: 1,
        };
        assert!(err.is_input_error());
        assert!(err.to_string().contains("need at least 2"));
    }
}
