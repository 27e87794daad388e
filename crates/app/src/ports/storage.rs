//! Storage port — opaque load/save of the runtime [`Snapshot`].
//!
//! Implementations are keyed by a stable per-installation identifier chosen
//! when they are constructed.

use std::future::Future;
use std::sync::{Arc, Mutex};

use lumen_domain::error::LumenError;
use lumen_domain::snapshot::Snapshot;

use crate::lock;

/// Persists the orchestrator snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot.
    fn save(&self, snapshot: Snapshot) -> impl Future<Output = Result<(), LumenError>> + Send;

    /// Load the stored snapshot, `None` when nothing was saved yet.
    fn load(&self) -> impl Future<Output = Result<Option<Snapshot>, LumenError>> + Send;
}

impl<T: SnapshotStore> SnapshotStore for Arc<T> {
    fn save(&self, snapshot: Snapshot) -> impl Future<Output = Result<(), LumenError>> + Send {
        (**self).save(snapshot)
    }

    fn load(&self) -> impl Future<Output = Result<Option<Snapshot>, LumenError>> + Send {
        (**self).load()
    }
}

/// Process-local store, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<Snapshot>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    /// A store pre-seeded with `snapshot`, as if saved by a previous run.
    #[must_use]
    pub fn with(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    /// Number of completed `save` calls.
    #[must_use]
    pub fn save_count(&self) -> usize {
        *lock(&self.saves)
    }

    #[must_use]
    pub fn current(&self) -> Option<Snapshot> {
        lock(&self.snapshot).clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: Snapshot) -> impl Future<Output = Result<(), LumenError>> + Send {
        *lock(&self.snapshot) = Some(snapshot);
        *lock(&self.saves) += 1;
        async { Ok(()) }
    }

    fn load(&self) -> impl Future<Output = Result<Option<Snapshot>, LumenError>> + Send {
        let snapshot = lock(&self.snapshot).clone();
        async { Ok(snapshot) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_return_none_before_first_save() {
        let store = MemorySnapshotStore::default();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn should_return_last_saved_snapshot() {
        let store = MemorySnapshotStore::default();
        store
            .save(Snapshot {
                sunset_boost_pct: 3,
                ..Snapshot::default()
            })
            .await
            .unwrap();
        store
            .save(Snapshot {
                sunset_boost_pct: 7,
                ..Snapshot::default()
            })
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().sunset_boost_pct, 7);
        assert_eq!(store.save_count(), 2);
    }
}
