//! Process-local catalog store.
//!
//! The whole catalog is one immutable [`CatalogData`] value behind an `Arc`. Readers
//! clone the `Arc` and work on a consistent view. Writers serialize on a mutex, stage
//! their changes on a private copy and swap it in on commit. With a snapshot path
//! configured, every commit is written to disk before it becomes visible.
mod bootstrap;
mod catalog;
mod data;
mod namespace;
mod purge;
mod secrets;
mod snapshot;
mod tabular;
mod warehouse;

use std::{path::PathBuf, sync::Arc};

pub use data::CatalogData;
pub use secrets::MemorySecretStore;
use snapshot::{SecretRecords, Snapshot};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    api::Result,
    service::{CatalogBackendError, Transaction},
};

/// Marker type implementing [`crate::service::CatalogStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryBackend;

#[derive(Debug)]
struct Shared {
    catalog: RwLock<Arc<CatalogData>>,
    secrets: RwLock<Arc<SecretRecords>>,
    write_lock: Arc<Mutex<()>>,
    snapshot_path: Option<PathBuf>,
}

/// Read state of the memory store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CatalogState {
    shared: Arc<Shared>,
}

impl CatalogState {
    /// A fresh, non-persistent catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(CatalogData::new(), SecretRecords::default(), None)
    }

    /// Load the snapshot at `path` if it exists. All later commits are written there.
    ///
    /// # Errors
    /// Fails if an existing snapshot cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> std::result::Result<Self, CatalogBackendError> {
        let path = path.into();
        let snapshot = Snapshot::load(&path).await?;
        match snapshot {
            Some(snapshot) => {
                tracing::info!(
                    path = %path.display(),
                    projects = snapshot.catalog.project_count(),
                    warehouses = snapshot.catalog.warehouse_count(),
                    "Loaded catalog snapshot"
                );
                Ok(Self::from_parts(snapshot.catalog, snapshot.secrets, Some(path)))
            }
            None => {
                tracing::info!(path = %path.display(), "No catalog snapshot found, starting empty");
                Ok(Self::from_parts(
                    CatalogData::new(),
                    SecretRecords::default(),
                    Some(path),
                ))
            }
        }
    }

    fn from_parts(
        catalog: CatalogData,
        secrets: SecretRecords,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog: RwLock::new(Arc::new(catalog)),
                secrets: RwLock::new(Arc::new(secrets)),
                write_lock: Arc::new(Mutex::new(())),
                snapshot_path,
            }),
        }
    }

    /// Consistent view of the catalog as of the last commit.
    pub(crate) async fn read(&self) -> Arc<CatalogData> {
        self.shared.catalog.read().await.clone()
    }

    pub(crate) async fn read_secrets(&self) -> Arc<SecretRecords> {
        self.shared.secrets.read().await.clone()
    }

    async fn lock_writes(&self) -> OwnedMutexGuard<()> {
        self.shared.write_lock.clone().lock_owned().await
    }

    /// Persist (if configured) and publish new secrets. Requires the write lock.
    async fn install_secrets(
        &self,
        _guard: &OwnedMutexGuard<()>,
        secrets: SecretRecords,
    ) -> std::result::Result<(), CatalogBackendError> {
        if let Some(path) = &self.shared.snapshot_path {
            let catalog = self.read().await;
            Snapshot::write(path, &catalog, &secrets).await?;
        }
        *self.shared.secrets.write().await = Arc::new(secrets);
        Ok(())
    }

    /// Persist (if configured) and publish a new catalog. Requires the write lock.
    async fn install_catalog(
        &self,
        _guard: &OwnedMutexGuard<()>,
        catalog: CatalogData,
    ) -> std::result::Result<(), CatalogBackendError> {
        if let Some(path) = &self.shared.snapshot_path {
            let secrets = self.read_secrets().await;
            Snapshot::write(path, &catalog, &secrets).await?;
        }
        *self.shared.catalog.write().await = Arc::new(catalog);
        Ok(())
    }
}

impl Default for CatalogState {
    fn default() -> Self {
        Self::new()
    }
}

/// Write transaction. Holds the single writer lock until it is committed or dropped.
#[derive(Debug)]
pub struct MemoryTransaction {
    state: CatalogState,
    staged: CatalogData,
    guard: OwnedMutexGuard<()>,
}

#[async_trait::async_trait]
impl Transaction<CatalogState> for MemoryTransaction {
    type Transaction<'a> = &'a mut CatalogData;

    async fn begin_write(db_state: CatalogState) -> Result<Self> {
        let guard = db_state.lock_writes().await;
        let staged = db_state.read().await.as_ref().clone();
        Ok(Self {
            state: db_state,
            staged,
            guard,
        })
    }

    async fn commit(self) -> Result<()> {
        let Self {
            state,
            staged,
            guard,
        } = self;
        state
            .install_catalog(&guard, staged)
            .await
            .map_err(|e| e.append_detail("Error committing catalog transaction").into())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }

    fn transaction(&mut self) -> Self::Transaction<'_> {
        &mut self.staged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{CatalogStore, ProjectId};

    #[tokio::test]
    async fn test_rollback_and_drop_discard_changes() {
        let state = CatalogState::new();

        let mut t = MemoryTransaction::begin_write(state.clone()).await.unwrap();
        MemoryBackend::create_project(&ProjectId::new_random(), "a".to_string(), t.transaction())
            .await
            .unwrap();
        t.rollback().await.unwrap();

        {
            let mut t = MemoryTransaction::begin_write(state.clone()).await.unwrap();
            MemoryBackend::create_project(
                &ProjectId::new_random(),
                "b".to_string(),
                t.transaction(),
            )
            .await
            .unwrap();
        }

        let projects = MemoryBackend::list_projects(None, state.clone()).await.unwrap();
        assert!(projects.is_empty());
    }

    #[tokio::test]
    async fn test_readers_see_commit_atomically() {
        let state = CatalogState::new();
        let before = state.read().await;

        let mut t = MemoryTransaction::begin_write(state.clone()).await.unwrap();
        let project_id = ProjectId::new_random();
        MemoryBackend::create_project(&project_id, "a".to_string(), t.transaction())
            .await
            .unwrap();
        assert_eq!(state.read().await.project_count(), 0);
        t.commit().await.unwrap();

        assert_eq!(before.project_count(), 0);
        assert_eq!(state.read().await.project_count(), 1);
    }

    #[tokio::test]
    async fn test_writers_are_serialized() {
        let state = CatalogState::new();
        let t = MemoryTransaction::begin_write(state.clone()).await.unwrap();
        let second = tokio::spawn({
            let state = state.clone();
            async move {
                let mut t = MemoryTransaction::begin_write(state).await.unwrap();
                MemoryBackend::create_project(
                    &ProjectId::new_random(),
                    "b".to_string(),
                    t.transaction(),
                )
                .await
                .unwrap();
                t.commit().await.unwrap();
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        drop(t);
        second.await.unwrap();
        assert_eq!(state.read().await.project_count(), 1);
    }
}
