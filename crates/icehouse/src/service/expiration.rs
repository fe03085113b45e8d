//! Background purge of soft-deleted warehouses, tables and views.
//!
//! Metadata is purged first, in one store transaction. Storage is cleaned up afterwards
//! on a best-effort basis: a failing object store never keeps an expired entity alive.
use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use icehouse_io::IcehouseStorage;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    CatalogStore, Location, PurgedTabular, ResolvedWarehouse, SecretStore, TabularId,
    Transaction, WarehouseId,
    authz::Authorizer,
    storage::{StorageCredential, StorageFactory},
};
use crate::api::Result;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub purged_warehouses: Vec<WarehouseId>,
    pub purged_tabulars: Vec<TabularId>,
    pub storage_failures: Vec<StorageCleanupFailure>,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.purged_warehouses.is_empty()
            && self.purged_tabulars.is_empty()
            && self.storage_failures.is_empty()
    }
}

/// Storage below `location` could not be removed. The metadata is gone regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCleanupFailure {
    pub warehouse_id: WarehouseId,
    pub location: String,
    pub error: String,
}

/// Purges expired entities, either on demand or periodically.
#[derive(Debug, Clone)]
pub struct ExpirationManager<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> {
    catalog_state: C::State,
    authorizer: A,
    secrets: S,
    storage: StorageFactory,
}

/// Handle of a running sweep loop.
#[derive(Debug)]
pub struct ExpirationHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl ExpirationHandle {
    /// Stop the loop and wait for a running sweep to finish.
    pub async fn stop(self) {
        self.cancellation_token.cancel();
        if let Err(e) = self.join_handle.await {
            tracing::error!(error = %e, "Expiration sweep task terminated abnormally");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

impl<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> ExpirationManager<C, A, S> {
    #[must_use]
    pub fn new(catalog_state: C::State, authorizer: A, secrets: S, storage: StorageFactory) -> Self {
        Self {
            catalog_state,
            authorizer,
            secrets,
            storage,
        }
    }

    /// Run [`Self::sweep_once`] every `interval` until the handle is stopped.
    /// Errors of a sweep are logged; the loop keeps going.
    #[must_use]
    pub fn start(self, interval: Duration) -> ExpirationHandle {
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();
        let join_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(interval_seconds = interval.as_secs(), "Starting expiration sweep");
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match self.sweep_once().await {
                    Ok(report) if !report.is_empty() => tracing::debug!(
                        warehouses = report.purged_warehouses.len(),
                        tabulars = report.purged_tabulars.len(),
                        storage_failures = report.storage_failures.len(),
                        "Expiration sweep finished"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e.error, "Expiration sweep failed"),
                }
            }
            tracing::info!("Expiration sweep stopped");
        });
        ExpirationHandle {
            cancellation_token,
            join_handle,
        }
    }

    /// Purge everything that is expired right now.
    ///
    /// # Errors
    /// Fails only if the metadata purge fails. Storage errors are part of the report.
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut t = C::Transaction::begin_write(self.catalog_state.clone()).await?;
        let purged = C::purge_expired(now, t.transaction())
            .await
            .map_err(|e| e.append_detail("Failed to purge expired entities"))?;
        if purged.is_empty() {
            t.rollback().await?;
            return Ok(SweepReport::default());
        }
        t.commit().await?;

        let mut report = SweepReport::default();

        for warehouse in purged.warehouses {
            self.authorizer
                .delete_warehouse(warehouse.warehouse_id)
                .await
                .inspect_err(|e| {
                    tracing::error!(
                        warehouse_id = %warehouse.warehouse_id,
                        error = %e.error,
                        "Failed to remove purged warehouse from authorizer"
                    );
                })
                .ok();
            report.storage_failures.extend(
                cleanup_warehouse_storage(&self.storage, &self.secrets, &warehouse).await,
            );
            report.purged_warehouses.push(warehouse.warehouse_id);
        }

        for (warehouse, PurgedTabular { tabular, remove_data }) in purged.tabulars {
            let result = match tabular.tabular_id {
                TabularId::Table(table_id) => {
                    self.authorizer
                        .delete_table(warehouse.warehouse_id, table_id)
                        .await
                }
                TabularId::View(view_id) => {
                    self.authorizer
                        .delete_view(warehouse.warehouse_id, view_id)
                        .await
                }
            };
            result
                .inspect_err(|e| {
                    tracing::error!(
                        tabular_id = %tabular.tabular_id,
                        error = %e.error,
                        "Failed to remove purged tabular from authorizer"
                    );
                })
                .ok();

            if remove_data {
                if let Err(failure) = cleanup_location(
                    &self.storage,
                    &self.secrets,
                    &warehouse,
                    Location::from_str(&tabular.location).map_err(|e| e.to_string()),
                )
                .await
                {
                    report.storage_failures.push(failure);
                }
            }
            report.purged_tabulars.push(tabular.tabular_id);
        }

        Ok(report)
    }
}

/// Remove everything below the base location of a purged warehouse and drop its
/// storage secret.
pub(crate) async fn cleanup_warehouse_storage<S: SecretStore>(
    storage: &StorageFactory,
    secrets: &S,
    warehouse: &ResolvedWarehouse,
) -> Option<StorageCleanupFailure> {
    let failure = cleanup_location(
        storage,
        secrets,
        warehouse,
        warehouse
            .storage_profile
            .base_location()
            .map_err(|e| e.to_string()),
    )
    .await
    .err();

    if let Some(secret_id) = warehouse.storage_secret_id {
        secrets
            .delete_secret(&secret_id)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    warehouse_id = %warehouse.warehouse_id,
                    %secret_id,
                    error = %e.error,
                    "Failed to delete storage secret of purged warehouse"
                );
            })
            .ok();
    }

    failure
}

/// Remove everything below `location` using the storage of `warehouse`.
pub(crate) async fn cleanup_location<S: SecretStore>(
    storage: &StorageFactory,
    secrets: &S,
    warehouse: &ResolvedWarehouse,
    location: std::result::Result<Location, String>,
) -> std::result::Result<(), StorageCleanupFailure> {
    let failure = |location: String, error: String| {
        tracing::error!(
            warehouse_id = %warehouse.warehouse_id,
            %location,
            %error,
            "Failed to remove data of purged entity"
        );
        StorageCleanupFailure {
            warehouse_id: warehouse.warehouse_id,
            location,
            error,
        }
    };

    let mut location = location.map_err(|e| failure(String::new(), e))?;
    location.with_trailing_slash();

    let credential = match warehouse.storage_secret_id {
        Some(secret_id) => Some(
            secrets
                .get_secret_by_id::<StorageCredential>(secret_id)
                .await
                .map_err(|e| failure(location.to_string(), e.error.to_string()))?
                .secret,
        ),
        None => None,
    };

    let backend = storage
        .storage(&warehouse.storage_profile, credential.as_ref())
        .await
        .map_err(|e| failure(location.to_string(), e.to_string()))?;

    let summary = backend
        .remove_all(&location)
        .await
        .map_err(|e| failure(location.to_string(), e.to_string()))?;

    tracing::info!(
        warehouse_id = %warehouse.warehouse_id,
        %location,
        deleted = summary.deleted,
        "Removed data of purged entity"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{
        implementations::{CatalogState, MemoryBackend, MemorySecretStore, MemoryTransaction},
        service::{
            DeleteProfile, ProjectId, WarehouseDeletion,
            authz::AllowAllAuthorizer,
            storage::{MemoryProfile, StorageProfile},
        },
    };

    type Manager = ExpirationManager<MemoryBackend, AllowAllAuthorizer, MemorySecretStore>;

    async fn soft_deleted_warehouse(
        state: &CatalogState,
        key_prefix: &str,
        now: DateTime<Utc>,
    ) -> ResolvedWarehouse {
        let mut t = MemoryTransaction::begin_write(state.clone()).await.unwrap();
        let project_id = ProjectId::new_random();
        MemoryBackend::create_project(&project_id, "p".to_string(), t.transaction())
            .await
            .unwrap();
        let warehouse = MemoryBackend::create_warehouse(
            format!("wh-{key_prefix}"),
            &project_id,
            StorageProfile::Memory(MemoryProfile {
                key_prefix: Some(key_prefix.to_string()),
            }),
            DeleteProfile::Soft {
                expiration_seconds: 2,
            },
            None,
            t.transaction(),
        )
        .await
        .unwrap();
        let deletion =
            MemoryBackend::delete_warehouse(warehouse.warehouse_id, false, now, t.transaction())
                .await
                .unwrap();
        assert!(matches!(deletion, WarehouseDeletion::SoftDeleted(_)));
        t.commit().await.unwrap();
        warehouse
    }

    fn manager(state: &CatalogState, storage: &StorageFactory) -> Manager {
        ExpirationManager::new(
            state.clone(),
            AllowAllAuthorizer::default(),
            MemorySecretStore::new(state.clone()),
            storage.clone(),
        )
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_warehouse_and_data() {
        let state = CatalogState::new();
        let storage = StorageFactory::default();
        let now = Utc::now();
        let warehouse = soft_deleted_warehouse(&state, "sweep", now).await;

        let file: Location = "memory://icehouse/sweep/ns/t/data/0.parquet".parse().unwrap();
        storage
            .memory()
            .write(&file, Bytes::from_static(b"x"))
            .await
            .unwrap();

        let manager = manager(&state, &storage);
        let report = manager
            .sweep_at(now + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert!(report.is_empty());
        assert!(
            MemoryBackend::get_warehouse(warehouse.warehouse_id, state.clone())
                .await
                .unwrap()
                .is_some()
        );

        let report = manager
            .sweep_at(now + chrono::Duration::seconds(2))
            .await
            .unwrap();
        assert_eq!(report.purged_warehouses, vec![warehouse.warehouse_id]);
        assert!(report.storage_failures.is_empty());
        assert!(
            MemoryBackend::get_warehouse(warehouse.warehouse_id, state.clone())
                .await
                .unwrap()
                .is_none()
        );
        assert!(storage.memory().read(&file).await.is_err());

        // Nothing left to do.
        let report = manager
            .sweep_at(now + chrono::Duration::seconds(3))
            .await
            .unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_storage_failure_does_not_block_purge() {
        let state = CatalogState::new();
        let storage = StorageFactory::default();
        let now = Utc::now();
        let warehouse = soft_deleted_warehouse(&state, "broken", now).await;

        let file: Location = "memory://icehouse/broken/f".parse().unwrap();
        storage
            .memory()
            .write(&file, Bytes::from_static(b"x"))
            .await
            .unwrap();
        storage.memory().set_fail_deletes(true);

        let report = manager(&state, &storage)
            .sweep_at(now + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(report.purged_warehouses, vec![warehouse.warehouse_id]);
        assert_eq!(report.storage_failures.len(), 1);
        assert_eq!(report.storage_failures[0].warehouse_id, warehouse.warehouse_id);
        assert!(
            MemoryBackend::get_warehouse(warehouse.warehouse_id, state.clone())
                .await
                .unwrap()
                .is_none()
        );
        assert!(logs_contain("Failed to remove data of purged entity"));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let state = CatalogState::new();
        let storage = StorageFactory::default();
        let handle = manager(&state, &storage).start(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        handle.stop().await;
    }
}
