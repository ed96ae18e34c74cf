//! In-process coordination bus
//!
//! Records, messages and progress events are partitioned by session id.
//! Each partition has its own lock, so sessions never contend with each
//! other except briefly on the partition map and the subscriber list.
//! Events for one session are sequenced and delivered while that session's
//! partition is locked, which keeps per-session delivery in production order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use verity_adversarial::DebateSession;
use verity_core::{AgentType, BusConfig};

use crate::archive::SessionArchive;
use crate::backend::{MemoryBackend, StorageBackend, StorageError};
use crate::message::CoordinationMessage;
use crate::progress::{DebateProgress, ProgressEvent, ProgressUpdate};
use crate::record::{RecordKind, RecordPayload, StoredRecord};

pub type SubscriptionId = u64;

/// Receiving end of a progress subscription
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// `None` for a subscription to every session
    pub session_id: Option<String>,
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl Subscription {
    /// Next event; `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    /// Everything delivered so far, without waiting
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriptionId,
    session_id: Option<String>,
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl Subscriber {
    fn wants(&self, session_id: &str) -> bool {
        self.session_id.as_deref().map_or(true, |s| s == session_id)
    }
}

#[derive(Debug)]
struct Partition {
    records: Vec<StoredRecord>,
    messages: Vec<CoordinationMessage>,
    events: Vec<ProgressEvent>,
    progress: DebateProgress,
    participants: BTreeSet<AgentType>,
    sequence: u64,
}

impl Partition {
    fn new(session_id: &str) -> Self {
        Self {
            records: Vec::new(),
            messages: Vec::new(),
            events: Vec::new(),
            progress: DebateProgress::new(session_id),
            participants: BTreeSet::new(),
            sequence: 0,
        }
    }

    fn is_idle(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.records.is_empty()
            && self.messages.is_empty()
            && self.progress.last_updated + ttl <= now
    }
}

/// Outcome of a maintenance pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub records_expired: usize,
    pub acknowledged_messages_reaped: usize,
    pub unacknowledged_messages_reaped: usize,
    pub sessions_dropped: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.records_expired
            + self.acknowledged_messages_reaped
            + self.unacknowledged_messages_reaped
    }
}

/// Full dump of one session for backup or audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub records: Vec<StoredRecord>,
    pub messages: Vec<CoordinationMessage>,
    pub events: Vec<ProgressEvent>,
    pub progress: DebateProgress,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusStats {
    pub sessions: usize,
    pub records: usize,
    pub messages: usize,
    pub pending_messages: usize,
    pub subscribers: usize,
    /// Serialized size of live records and messages
    pub approx_bytes: usize,
}

impl BusStats {
    pub fn approx_mb(&self) -> f64 {
        self.approx_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Session-partitioned record store with publish/subscribe progress events
#[derive(Debug)]
pub struct MemoryBus {
    config: BusConfig,
    partitions: RwLock<HashMap<String, Arc<Mutex<Partition>>>>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_subscription: AtomicU64,
    record_count: AtomicUsize,
    archive: SessionArchive<dyn StorageBackend>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl MemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self::with_backend(config, Arc::new(MemoryBackend::new()))
    }

    /// Bus archiving concluded sessions to `backend`
    pub fn with_backend(config: BusConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            config,
            partitions: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            record_count: AtomicUsize::new(0),
            archive: SessionArchive::new(backend),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    fn record_ttl(&self) -> Duration {
        Duration::seconds(self.config.record_ttl_secs as i64)
    }

    fn message_retention(&self) -> Duration {
        Duration::seconds(self.config.message_retention_secs as i64)
    }

    async fn partition(&self, session_id: &str) -> Arc<Mutex<Partition>> {
        if let Some(p) = self.partitions.read().await.get(session_id) {
            return p.clone();
        }
        self.partitions
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Partition::new(session_id))))
            .clone()
    }

    async fn existing(&self, session_id: &str) -> Option<Arc<Mutex<Partition>>> {
        self.partitions.read().await.get(session_id).cloned()
    }

    /// Store a record; it is readable as soon as this returns
    pub async fn store(&self, session_id: &str, payload: RecordPayload) -> String {
        let partition = self.partition(session_id).await;
        let mut p = partition.lock().await;
        self.append_record(&mut p, session_id, payload).await
    }

    async fn append_record(&self, p: &mut Partition, session_id: &str, payload: RecordPayload) -> String {
        let update = payload.implied_update();
        let record = StoredRecord::new(session_id, payload, self.record_ttl());
        let id = record.id.clone();
        tracing::trace!(session_id = %session_id, record_id = %id, kind = ?record.kind(), "Record stored");
        p.records.push(record);

        let total = self.record_count.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("verity_bus_records").set(total as f64);

        if let Some(update) = update {
            self.emit(p, session_id, update).await;
        }
        id
    }

    /// Publish a progress update; returns its sequence number
    pub async fn publish(&self, session_id: &str, update: ProgressUpdate) -> u64 {
        let partition = self.partition(session_id).await;
        let mut p = partition.lock().await;
        self.emit(&mut p, session_id, update).await
    }

    async fn emit(&self, p: &mut Partition, session_id: &str, update: ProgressUpdate) -> u64 {
        p.sequence += 1;
        p.progress.apply(&update);
        match &update {
            ProgressUpdate::InvestigationStarted { agents, .. } => p.participants.extend(agents.iter().copied()),
            ProgressUpdate::DebateStarted { participants, .. } => {
                p.participants.extend(participants.iter().copied())
            }
            ProgressUpdate::InvestigationCompleted { agent, .. } => {
                p.participants.insert(*agent);
            }
            _ => {}
        }

        let event = ProgressEvent {
            session_id: session_id.to_string(),
            sequence: p.sequence,
            update,
            timestamp: Utc::now(),
        };
        p.events.push(event.clone());

        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|s| {
            if !s.wants(session_id) {
                return true;
            }
            let delivered = s.sender.send(event.clone()).is_ok();
            if !delivered {
                tracing::debug!(subscription = s.id, "Dropping closed subscription");
            }
            delivered
        });
        event.sequence
    }

    /// Subscribe to one session's progress events
    pub async fn subscribe(&self, session_id: &str) -> Subscription {
        self.add_subscriber(Some(session_id.to_string())).await
    }

    /// Subscribe to progress events of every session
    pub async fn subscribe_all(&self) -> Subscription {
        self.add_subscriber(None).await
    }

    async fn add_subscriber(&self, session_id: Option<String>) -> Subscription {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(Subscriber {
            id,
            session_id: session_id.clone(),
            sender,
        });
        Subscription {
            id,
            session_id,
            receiver,
        }
    }

    /// Returns whether the subscription was active
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub async fn record(&self, session_id: &str, record_id: &str) -> Option<StoredRecord> {
        let partition = self.existing(session_id).await?;
        let p = partition.lock().await;
        let now = Utc::now();
        p.records
            .iter()
            .find(|r| r.id == record_id && !r.is_expired(now))
            .cloned()
    }

    /// Live records of a session in insertion order, optionally of one kind
    pub async fn records(&self, session_id: &str, kind: Option<RecordKind>) -> Vec<StoredRecord> {
        let Some(partition) = self.existing(session_id).await else {
            return Vec::new();
        };
        let p = partition.lock().await;
        let now = Utc::now();
        p.records
            .iter()
            .filter(|r| !r.is_expired(now) && kind.map_or(true, |k| r.kind() == k))
            .cloned()
            .collect()
    }

    pub async fn progress(&self, session_id: &str) -> Option<DebateProgress> {
        let partition = self.existing(session_id).await?;
        let progress = partition.lock().await.progress.clone();
        Some(progress)
    }

    /// Every event published for a session so far
    pub async fn events(&self, session_id: &str) -> Vec<ProgressEvent> {
        match self.existing(session_id).await {
            Some(partition) => partition.lock().await.events.clone(),
            None => Vec::new(),
        }
    }

    /// Post a coordination message; returns its id
    pub async fn post_message(&self, session_id: &str, message: CoordinationMessage) -> String {
        let partition = self.partition(session_id).await;
        let mut p = partition.lock().await;
        let id = message.id.clone();
        tracing::debug!(session_id = %session_id, message_id = %id, from = %message.from, "Message posted");
        p.messages.push(message.clone());
        self.append_record(&mut p, session_id, RecordPayload::Message(message)).await;
        id
    }

    /// Messages addressed to `agent` that it has not acknowledged
    pub async fn messages_for(&self, session_id: &str, agent: AgentType) -> Vec<CoordinationMessage> {
        let Some(partition) = self.existing(session_id).await else {
            return Vec::new();
        };
        let p = partition.lock().await;
        p.messages
            .iter()
            .filter(|m| m.is_pending_for(agent))
            .cloned()
            .collect()
    }

    /// Returns `true` if this acknowledgement was new
    pub async fn acknowledge(&self, session_id: &str, message_id: &str, agent: AgentType) -> bool {
        let Some(partition) = self.existing(session_id).await else {
            return false;
        };
        let mut p = partition.lock().await;
        match p.messages.iter_mut().find(|m| m.id == message_id) {
            Some(m) if m.recipient.includes(agent) => m.acknowledged_by.insert(agent),
            _ => false,
        }
    }

    /// Evict expired records and messages past the retention window
    pub async fn cleanup(&self) -> CleanupReport {
        let now = Utc::now();
        let retention = self.message_retention();
        let ttl = self.record_ttl();
        let mut report = CleanupReport::default();

        let partitions: Vec<Arc<Mutex<Partition>>> =
            self.partitions.read().await.values().cloned().collect();
        for partition in partitions {
            let mut p = partition.lock().await;

            let before = p.records.len();
            p.records.retain(|r| !r.is_expired(now));
            report.records_expired += before - p.records.len();

            let participants: Vec<AgentType> = p.participants.iter().copied().collect();
            p.messages.retain(|m| {
                if m.created_at + retention > now {
                    return true;
                }
                if m.is_settled(&participants) {
                    report.acknowledged_messages_reaped += 1;
                } else {
                    report.unacknowledged_messages_reaped += 1;
                }
                false
            });
        }

        {
            let mut map = self.partitions.write().await;
            let before = map.len();
            // A partition still referenced elsewhere may be mid-write
            map.retain(|_, p| {
                Arc::strong_count(p) > 1
                    || p.try_lock().map_or(true, |p| !p.is_idle(now, ttl))
            });
            report.sessions_dropped = before - map.len();
        }

        let remaining = self
            .record_count
            .fetch_sub(report.records_expired, Ordering::Relaxed)
            .saturating_sub(report.records_expired);
        metrics::gauge!("verity_bus_records").set(remaining as f64);

        if report.total() > 0 || report.sessions_dropped > 0 {
            tracing::info!(
                records = report.records_expired,
                acknowledged = report.acknowledged_messages_reaped,
                unacknowledged = report.unacknowledged_messages_reaped,
                sessions = report.sessions_dropped,
                "Bus cleanup"
            );
        }
        report
    }

    pub async fn export_session_data(&self, session_id: &str) -> Option<SessionExport> {
        let partition = self.existing(session_id).await?;
        let p = partition.lock().await;
        Some(SessionExport {
            session_id: session_id.to_string(),
            records: p.records.clone(),
            messages: p.messages.clone(),
            events: p.events.clone(),
            progress: p.progress.clone(),
            exported_at: Utc::now(),
        })
    }

    /// Hand a concluded session to the archive backend
    pub async fn archive_session(&self, session: &DebateSession) -> Result<(), StorageError> {
        self.archive.save(session).await
    }

    pub async fn archived_session(&self, session_id: &str) -> Result<Option<DebateSession>, StorageError> {
        self.archive.load(session_id).await
    }

    pub async fn archived_sessions(&self) -> Result<Vec<String>, StorageError> {
        self.archive.list().await
    }

    pub async fn stats(&self) -> BusStats {
        let partitions: Vec<Arc<Mutex<Partition>>> =
            self.partitions.read().await.values().cloned().collect();
        let mut stats = BusStats {
            sessions: partitions.len(),
            subscribers: self.subscribers.read().await.len(),
            ..BusStats::default()
        };

        for partition in partitions {
            let p = partition.lock().await;
            let participants: Vec<AgentType> = p.participants.iter().copied().collect();
            stats.records += p.records.len();
            stats.messages += p.messages.len();
            stats.pending_messages += p.messages.iter().filter(|m| !m.is_settled(&participants)).count();
            stats.approx_bytes += p
                .records
                .iter()
                .map(|r| serde_json::to_vec(r).map_or(0, |v| v.len()))
                .sum::<usize>();
            stats.approx_bytes += p
                .messages
                .iter()
                .map(|m| serde_json::to_vec(m).map_or(0, |v| v.len()))
                .sum::<usize>();
        }
        stats
    }
}
