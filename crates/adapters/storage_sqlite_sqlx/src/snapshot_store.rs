//! `SQLite` implementation of [`SnapshotStore`].

use sqlx::SqlitePool;

use lumen_app::ports::SnapshotStore;
use lumen_domain::error::LumenError;
use lumen_domain::snapshot::Snapshot;
use lumen_domain::time::now;

use crate::error::StorageError;

const UPSERT: &str = r"
    INSERT INTO snapshots (key, value, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

const SELECT_BY_KEY: &str = "SELECT value FROM snapshots WHERE key = ?";

/// Stores the runtime snapshot as JSON, one row per installation.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
    key: String,
}

impl SqliteSnapshotStore {
    /// `installation_id` keys the row, so several installations can share a file.
    #[must_use]
    pub fn new(pool: SqlitePool, installation_id: impl Into<String>) -> Self {
        Self {
            pool,
            key: installation_id.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<(), LumenError> {
        let value = serde_json::to_string(&snapshot).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(&self.key)
            .bind(&value)
            .bind(now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, LumenError> {
        let row: Option<(String,)> = sqlx::query_as(SELECT_BY_KEY)
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let Some((value,)) = row else {
            return Ok(None);
        };
        let snapshot = serde_json::from_str(&value).map_err(StorageError::from)?;
        Ok(Some(snapshot))
    }
}
