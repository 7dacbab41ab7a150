//! Session snapshot persistence in SQLite
//!
//! One row per session id holding the latest snapshot as JSON. Status, stage
//! and save time are duplicated into columns for ad-hoc inspection.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::models::{SessionSnapshot, SnapshotSummary};
use crate::services::snapshot_store::{SaveOutcome, SnapshotError, SnapshotStore};
use crate::utils::retry_on_lock;

/// Total time a write keeps retrying while the database is locked
const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Durable [`SnapshotStore`] backed by the `session_snapshots` table
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save(
        &self,
        session_id: &str,
        mut snapshot: SessionSnapshot,
    ) -> Result<SaveOutcome, SnapshotError> {
        // Prepare everything that does not depend on the stored version first
        snapshot.sanitize();
        snapshot.session_id = session_id.to_string();
        let status = snapshot.progress.status.as_str().to_string();
        let current_stage = snapshot.progress.current_stage.as_str().to_string();
        let saved_at = snapshot.saved_at.to_rfc3339();

        let pool = &self.pool;
        let snapshot = &snapshot;
        let (status, current_stage, saved_at) = (&status, &current_stage, &saved_at);

        let version = retry_on_lock("save_snapshot", MAX_LOCK_WAIT_MS, || async move {
            let mut tx = pool.begin().await?;

            let current: Option<i64> = sqlx::query_scalar(
                "SELECT snapshot_version FROM session_snapshots WHERE session_id = ?",
            )
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;
            let version = current.unwrap_or(0) + 1;

            let mut versioned = snapshot.clone();
            versioned.snapshot_version = version;
            let data = serde_json::to_string(&versioned)?;

            sqlx::query(
                r#"
                INSERT INTO session_snapshots (
                    session_id, snapshot_version, status, current_stage, saved_at, data
                ) VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(session_id) DO UPDATE SET
                    snapshot_version = excluded.snapshot_version,
                    status = excluded.status,
                    current_stage = excluded.current_stage,
                    saved_at = excluded.saved_at,
                    data = excluded.data
                "#,
            )
            .bind(session_id)
            .bind(version)
            .bind(status)
            .bind(current_stage)
            .bind(saved_at)
            .bind(&data)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(version)
        })
        .await?;

        Ok(SaveOutcome::saved(version))
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionSnapshot>, SnapshotError> {
        let row = sqlx::query("SELECT data FROM session_snapshots WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<SnapshotSummary>, SnapshotError> {
        let rows = sqlx::query("SELECT session_id, data FROM session_snapshots ORDER BY saved_at DESC")
            .fetch_all(&self.pool)
            .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let data: String = row.get("data");
            match serde_json::from_str::<SessionSnapshot>(&data) {
                Ok(snapshot) => summaries.push(snapshot.summary()),
                Err(e) => {
                    let session_id: String = row.get("session_id");
                    tracing::warn!(session_id = %session_id, error = %e, "Skipping unreadable snapshot");
                }
            }
        }
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, SnapshotError> {
        let pool = &self.pool;
        let result = retry_on_lock("delete_snapshot", MAX_LOCK_WAIT_MS, || async move {
            Ok(sqlx::query("DELETE FROM session_snapshots WHERE session_id = ?")
                .bind(session_id)
                .execute(pool)
                .await?)
        })
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use crate::models::{CollectionCheckpoint, MultiStageProgress, SearchSettings, SessionStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteSnapshotStore) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("scout.db")).await.unwrap();
        (dir, SqliteSnapshotStore::new(pool))
    }

    fn snapshot(id: &str) -> SessionSnapshot {
        SessionSnapshot::new(
            MultiStageProgress::new(id),
            &SearchSettings::default(),
            Vec::new(),
            CollectionCheckpoint::default(),
        )
    }

    #[tokio::test]
    async fn test_save_increments_version() {
        let (_dir, store) = store().await;
        assert_eq!(store.save("s1", snapshot("s1")).await.unwrap(), SaveOutcome::saved(1));
        assert_eq!(store.save("s1", snapshot("s1")).await.unwrap(), SaveOutcome::saved(2));

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.snapshot_version, 2);
        assert_eq!(loaded.progress.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_api_key_never_written() {
        let (_dir, store) = store().await;
        let mut snap = snapshot("s1");
        snap.settings.llm.api_key = Some("sk-live-secret".to_string());
        store.save("s1", snap).await.unwrap();

        let raw: String = sqlx::query_scalar("SELECT data FROM session_snapshots WHERE session_id = 's1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(!raw.contains("sk-live-secret"));
    }

    #[tokio::test]
    async fn test_list_newest_first_and_delete() {
        let (_dir, store) = store().await;
        let mut older = snapshot("old");
        older.saved_at = Utc::now() - chrono::Duration::minutes(5);
        store.save("old", older).await.unwrap();
        store.save("new", snapshot("new")).await.unwrap();

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);

        assert!(store.delete("old").await.unwrap());
        assert!(!store.delete("old").await.unwrap());
        assert!(store.load("old").await.unwrap().is_none());
    }
}
