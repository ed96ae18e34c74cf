//! # Verity Adversarial
//!
//! The decision-making pieces of a multi-agent debate.
//!
//! ## Key Types
//!
//! - [`ConflictDetector`]: finds contradictions between agents' evidence
//! - [`ConflictResolver`]: partitions conflicting evidence into kept/discarded
//! - [`ConsensusCalculator`]: democratic verdict over per-agent positions
//! - [`DebateSession`]: per-claim session state machine and its rounds
//!
//! ## Consensus Voting
//!
//! ```rust
//! use verity_adversarial::{ConsensusCalculator, ConsensusMethod, Veracity};
//! use verity_core::{AgentType, Argument, Conclusion};
//!
//! let arguments = vec![
//!     Argument::new(AgentType::Academic, Conclusion::True, 80.0),
//!     Argument::new(AgentType::Government, Conclusion::True, 80.0),
//!     Argument::new(AgentType::News, Conclusion::True, 80.0),
//!     Argument::new(AgentType::Financial, Conclusion::True, 80.0),
//!     Argument::new(AgentType::Social, Conclusion::False, 60.0),
//! ];
//!
//! let result = ConsensusCalculator::default().calculate("claim-1", &arguments, None);
//! assert_eq!(result.method, Some(ConsensusMethod::Majority));
//! assert_eq!(result.final_veracity, Veracity::VerifiedTrue);
//! ```

pub mod conflict;
pub mod consensus;
pub mod debate;
pub mod resolution;

pub use conflict::{ConflictDetector, ConflictType, EvidenceConflict, MethodologyGroup};
pub use consensus::{
    ConsensusCalculator, ConsensusConfig, ConsensusEngine, ConsensusMethod, ConsensusResult,
    Veracity, VoteOutcome,
};
pub use debate::{DebateRound, DebateSession, DebateStatus};
pub use resolution::{ConflictResolution, ConflictResolver, ResolutionError, ResolutionStrategy};
