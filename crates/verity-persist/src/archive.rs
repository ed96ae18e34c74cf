//! Archive of concluded debate sessions

use std::sync::Arc;

use verity_adversarial::DebateSession;

use crate::backend::{StorageBackend, StorageError, StorageExt};

/// Read-only store of terminal sessions, keyed `session:{id}`
#[derive(Debug)]
pub struct SessionArchive<B: StorageBackend + ?Sized> {
    backend: Arc<B>,
    prefix: String,
}

impl<B: StorageBackend + ?Sized> SessionArchive<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_prefix(backend, "session:")
    }

    pub fn with_prefix(backend: Arc<B>, prefix: &str) -> Self {
        Self {
            backend,
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }

    /// Archive a concluded session. Running sessions are rejected.
    pub async fn save(&self, session: &DebateSession) -> Result<(), StorageError> {
        if !session.is_terminal() {
            return Err(StorageError::Internal(format!(
                "session {} is still {}",
                session.session_id, session.status
            )));
        }
        self.backend.set(&self.key(&session.session_id), session).await?;
        tracing::debug!(session_id = %session.session_id, backend = self.backend.name(), "Session archived");
        Ok(())
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<DebateSession>, StorageError> {
        self.backend.get(&self.key(session_id)).await
    }

    pub async fn list(&self) -> Result<Vec<String>, StorageError> {
        let keys = self.backend.list_keys(&self.prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    pub async fn remove(&self, session_id: &str) -> Result<bool, StorageError> {
        self.backend.delete(&self.key(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use verity_adversarial::DebateStatus;
    use verity_core::{AgentType, DebateConfig};

    fn session(id: &str) -> DebateSession {
        DebateSession::new(
            id,
            "claim-1",
            vec![AgentType::Academic, AgentType::Government],
            DebateConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_archive_roundtrip() {
        let archive = SessionArchive::new(Arc::new(MemoryBackend::new()));

        let mut s = session("s-1");
        assert!(archive.save(&s).await.is_err());

        s.conclude(DebateStatus::Timeout, None);
        archive.save(&s).await.unwrap();

        let loaded = archive.load("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, DebateStatus::Timeout);
        assert_eq!(loaded.participants, s.participants);
        assert_eq!(archive.list().await.unwrap(), vec!["s-1"]);
        assert!(archive.load("missing").await.unwrap().is_none());
    }
}
