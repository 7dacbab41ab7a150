//! Session snapshot persistence
//!
//! Every store keeps only the latest snapshot per session id and assigns an
//! incrementing `snapshot_version` on save. Implementations sanitize the
//! snapshot inside `save`, whatever the caller passed in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{SessionSnapshot, SnapshotSummary};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] scout_common::Error),
}

impl From<sqlx::Error> for SnapshotError {
    fn from(err: sqlx::Error) -> Self {
        SnapshotError::Database(scout_common::Error::Database(err))
    }
}

/// Result of a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_version: Option<i64>,
}

impl SaveOutcome {
    pub fn saved(version: i64) -> Self {
        Self {
            success: true,
            snapshot_version: Some(version),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            snapshot_version: None,
        }
    }
}

/// Durable session storage
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the latest state of a session, replacing the previous one
    async fn save(
        &self,
        session_id: &str,
        snapshot: SessionSnapshot,
    ) -> Result<SaveOutcome, SnapshotError>;

    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, SnapshotError>;

    /// Summaries of every stored session, newest first
    async fn list(&self) -> Result<Vec<SnapshotSummary>, SnapshotError>;

    /// Returns whether a snapshot existed
    async fn delete(&self, session_id: &str) -> Result<bool, SnapshotError>;
}

/// In-memory store holding serialized snapshots
///
/// Used for tests and ephemeral runs; stores the same JSON a durable store would write.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: RwLock<HashMap<String, (i64, String)>>,
    fail_saves: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized form of the stored snapshot
    pub async fn raw(&self, session_id: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(session_id)
            .map(|(_, json)| json.clone())
    }

    /// Make every subsequent save fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(
        &self,
        session_id: &str,
        mut snapshot: SessionSnapshot,
    ) -> Result<SaveOutcome, SnapshotError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SnapshotError::Storage("store rejected write".to_string()));
        }

        snapshot.sanitize();

        let mut entries = self.entries.write().await;
        let version = entries.get(session_id).map(|(v, _)| v + 1).unwrap_or(1);
        snapshot.session_id = session_id.to_string();
        snapshot.snapshot_version = version;
        let json = serde_json::to_string(&snapshot)?;
        entries.insert(session_id.to_string(), (version, json));

        Ok(SaveOutcome::saved(version))
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, SnapshotError> {
        let entries = self.entries.read().await;
        match entries.get(session_id) {
            Some((_, json)) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<SnapshotSummary>, SnapshotError> {
        let entries = self.entries.read().await;
        let mut summaries = entries
            .values()
            .map(|(_, json)| serde_json::from_str::<SessionSnapshot>(json).map(|s| s.summary()))
            .collect::<Result<Vec<_>, _>>()?;
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, SnapshotError> {
        Ok(self.entries.write().await.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionCheckpoint, MultiStageProgress, SearchSettings};

    fn snapshot(id: &str, api_key: Option<&str>) -> SessionSnapshot {
        let mut settings = SearchSettings::default();
        settings.llm.api_key = api_key.map(str::to_string);
        let mut snapshot = SessionSnapshot::new(
            MultiStageProgress::new(id),
            &SearchSettings::default(),
            Vec::new(),
            CollectionCheckpoint::default(),
        );
        // Bypass the constructor's sanitizing to exercise the store's own
        snapshot.settings = settings;
        snapshot
    }

    #[tokio::test]
    async fn test_versions_increment() {
        let store = MemorySnapshotStore::new();
        assert_eq!(
            store.save("s1", snapshot("s1", None)).await.unwrap(),
            SaveOutcome::saved(1)
        );
        assert_eq!(
            store.save("s1", snapshot("s1", None)).await.unwrap(),
            SaveOutcome::saved(2)
        );
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.snapshot_version, 2);
    }

    #[tokio::test]
    async fn test_save_strips_api_key() {
        let store = MemorySnapshotStore::new();
        store
            .save("s1", snapshot("s1", Some("sk-very-secret")))
            .await
            .unwrap();

        let raw = store.raw("s1").await.unwrap();
        assert!(!raw.contains("sk-very-secret"));
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert!(loaded.settings.llm.api_key.is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MemorySnapshotStore::new();
        store.save("a", snapshot("a", None)).await.unwrap();
        store.save("b", snapshot("b", None)).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.load("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemorySnapshotStore::new();
        store.set_fail_saves(true);
        assert!(store.save("s1", snapshot("s1", None)).await.is_err());
        assert!(store.load("s1").await.unwrap().is_none());
    }
}
