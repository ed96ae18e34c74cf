//! # Verity Persistence
//!
//! Storage for everything a debate produces while it runs and after it ends.
//!
//! - [`MemoryBus`]: session-partitioned records, coordination messages and
//!   ordered progress events with explicit subscribe/unsubscribe
//! - [`StorageBackend`]: abstract key-value store used to archive concluded
//!   sessions ([`MemoryBackend`] in-process)

pub mod archive;
pub mod backend;
pub mod bus;
pub mod message;
pub mod progress;
pub mod record;

pub use archive::SessionArchive;
pub use backend::{MemoryBackend, StorageBackend, StorageError, StorageExt};
pub use bus::{BusStats, CleanupReport, MemoryBus, SessionExport, Subscription, SubscriptionId};
pub use message::{CoordinationMessage, Recipient};
pub use progress::{DebatePhase, DebateProgress, ProgressEvent, ProgressUpdate};
pub use record::{RecordKind, RecordPayload, StoredRecord};
