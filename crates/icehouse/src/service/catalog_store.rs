use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use icehouse_ext::{NamespaceIdent, TableIdent};

use super::{NamespaceId, ProjectId, TableId, TabularId, ViewId, WarehouseId, storage::StorageProfile};
use crate::{SecretId, api::Result};

mod error;
pub use error::*;
mod namespace;
pub use namespace::*;
mod project;
pub use project::*;
mod purge;
pub use purge::*;
mod server;
pub use server::*;
mod table;
pub use table::*;
mod tabular;
pub use tabular::*;
mod view;
pub use view::*;
mod warehouse;
pub use warehouse::*;

macro_rules! define_version_newtype {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialOrd,
            Ord,
            PartialEq,
            Eq,
            derive_more::From,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            #[must_use]
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            #[must_use]
            pub fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::ops::Deref for $name {
            type Target = i64;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

pub(crate) use define_version_newtype;

/// Write transaction of a [`CatalogStore`].
///
/// Changes made through [`Transaction::transaction`] become visible to readers at
/// [`Transaction::commit`], all at once. Dropping the transaction without committing
/// discards them.
#[async_trait::async_trait]
pub trait Transaction<D>
where
    Self: Sized + Send + Sync,
{
    type Transaction<'a>: Send + Sync + 'a
    where
        Self: 'static;

    async fn begin_write(db_state: D) -> Result<Self>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;

    fn transaction(&mut self) -> Self::Transaction<'_>;
}

/// Durable mapping project -> warehouse -> namespace -> table / view.
///
/// Reads take the read state and never observe a partial commit. Writes take a
/// transaction handle. Functions do not call out to storage or identity providers.
#[async_trait::async_trait]
pub trait CatalogStore
where
    Self: std::fmt::Debug + Clone + Send + Sync + 'static,
{
    type Transaction: Transaction<Self::State>;
    type State: Clone + std::fmt::Debug + Send + Sync + 'static;

    // ---------------- Server Management ----------------
    async fn get_server_info(state: Self::State) -> Result<ServerInfo, CatalogBackendError>;

    /// Accept the terms of use.
    /// Returns `Ok(false)` if the catalog was bootstrapped already.
    async fn bootstrap<'a>(
        terms_accepted: bool,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<bool, CatalogBackendError>;

    // ---------------- Project Management ----------------
    async fn create_project<'a>(
        project_id: &ProjectId,
        project_name: String,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<GetProjectResponse, CreateProjectError>;

    async fn get_project(
        project_id: &ProjectId,
        state: Self::State,
    ) -> Result<Option<GetProjectResponse>, CatalogBackendError>;

    /// All projects, or only those in `project_ids`.
    async fn list_projects(
        project_ids: Option<HashSet<ProjectId>>,
        state: Self::State,
    ) -> Result<Vec<GetProjectResponse>, CatalogBackendError>;

    async fn rename_project<'a>(
        project_id: &ProjectId,
        new_name: &str,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), RenameProjectError>;

    /// Fails while the project has warehouses, soft-deleted ones included.
    async fn delete_project<'a>(
        project_id: &ProjectId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), DeleteProjectError>;

    // ---------------- Warehouse Management ----------------
    /// Names are unique among the active warehouses of a project.
    async fn create_warehouse<'a>(
        warehouse_name: String,
        project_id: &ProjectId,
        storage_profile: StorageProfile,
        delete_profile: DeleteProfile,
        storage_secret_id: Option<SecretId>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, CreateWarehouseError>;

    /// Get a warehouse in any status.
    async fn get_warehouse(
        warehouse_id: WarehouseId,
        state: Self::State,
    ) -> Result<Option<ResolvedWarehouse>, CatalogBackendError>;

    /// Get an active warehouse by name.
    async fn get_warehouse_by_name(
        warehouse_name: &str,
        project_id: &ProjectId,
        state: Self::State,
    ) -> Result<Option<ResolvedWarehouse>, CatalogBackendError>;

    /// Warehouses of a project. `None` lists only active warehouses.
    async fn list_warehouses(
        project_id: &ProjectId,
        status_filter: Option<Vec<WarehouseStatus>>,
        state: Self::State,
    ) -> Result<Vec<ResolvedWarehouse>, CatalogBackendError>;

    async fn rename_warehouse<'a>(
        warehouse_id: WarehouseId,
        new_name: &str,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, RenameWarehouseError>;

    async fn set_warehouse_delete_profile<'a>(
        warehouse_id: WarehouseId,
        delete_profile: DeleteProfile,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, UpdateWarehouseError>;

    /// Replace profile and secret of a warehouse. The caller removes the old secret.
    async fn update_warehouse_storage<'a>(
        warehouse_id: WarehouseId,
        storage_profile: StorageProfile,
        storage_secret_id: Option<SecretId>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, UpdateWarehouseError>;

    /// Soft-delete or purge a warehouse according to its delete profile.
    ///
    /// Without `force`, a warehouse containing namespaces or live tabulars is not
    /// deleted. With `force`, its content shares the fate of the warehouse.
    async fn delete_warehouse<'a>(
        warehouse_id: WarehouseId,
        force: bool,
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<WarehouseDeletion, DeleteWarehouseError>;

    /// Restore a soft-deleted warehouse before it expires.
    async fn restore_warehouse<'a>(
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, RestoreWarehouseError>;

    // ---------------- Namespace Management ----------------
    /// Direct children of `parent`, or the top level namespaces. Sorted by name.
    async fn list_namespaces(
        warehouse_id: WarehouseId,
        parent: Option<&NamespaceIdent>,
        state: Self::State,
    ) -> Result<Vec<NamespaceInfo>, ListNamespacesError>;

    async fn get_namespace(
        warehouse_id: WarehouseId,
        namespace: &NamespaceIdent,
        state: Self::State,
    ) -> Result<Option<NamespaceInfo>, CatalogBackendError>;

    async fn create_namespace<'a>(
        warehouse_id: WarehouseId,
        namespace_id: NamespaceId,
        namespace: NamespaceIdent,
        properties: HashMap<String, String>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<NamespaceInfo, CreateNamespaceError>;

    async fn drop_namespace<'a>(
        warehouse_id: WarehouseId,
        namespace_id: NamespaceId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<NamespaceInfo, DropNamespaceError>;

    /// `properties` replace the stored properties as a whole.
    async fn update_namespace_properties<'a>(
        warehouse_id: WarehouseId,
        namespace_id: NamespaceId,
        properties: HashMap<String, String>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<NamespaceInfo, UpdateNamespacePropertiesError>;

    // ---------------- Tabular Management ----------------
    /// Tables and views of a warehouse, optionally limited to one namespace and type.
    /// Sorted by name.
    async fn list_tabulars(
        warehouse_id: WarehouseId,
        namespace_id: Option<NamespaceId>,
        typ: Option<TabularType>,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Vec<TabularInfo>, CatalogBackendError>;

    async fn get_tabular_by_id(
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Option<TabularInfo>, CatalogBackendError>;

    /// Move a table or view. Identity and history are kept.
    async fn rename_tabular<'a>(
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
        destination: &TableIdent,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<TabularInfo, RenameTabularError>;

    /// Staged tables are always removed right away.
    async fn drop_tabular<'a>(
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
        mode: DropMode,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<DroppedTabular, DropTabularError>;

    /// Restore soft-deleted tabulars that have not expired.
    async fn undrop_tabulars<'a>(
        warehouse_id: WarehouseId,
        tabular_ids: &[TabularId],
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TabularInfo>, UndropTabularError>;

    // ---------------- Table Management ----------------
    /// Creating a table over a staged table of the same name replaces the staged one.
    async fn create_table<'a>(
        creation: TableCreation,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<TableInfo, CreateTableError>;

    /// A table that is not soft-deleted.
    async fn get_table(
        warehouse_id: WarehouseId,
        table: &TableIdent,
        include_staged: bool,
        state: Self::State,
    ) -> Result<Option<TableInfo>, CatalogBackendError>;

    async fn get_table_by_id(
        warehouse_id: WarehouseId,
        table_id: TableId,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Option<TableInfo>, CatalogBackendError>;

    /// Swap the metadata pointers of all tables or none of them.
    async fn commit_tables<'a>(
        warehouse_id: WarehouseId,
        commits: Vec<TableCommit>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TableInfo>, CommitTableError>;

    // ---------------- View Management ----------------
    async fn create_view<'a>(
        creation: ViewCreation,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ViewInfo, CreateViewError>;

    /// A view that is not soft-deleted.
    async fn get_view(
        warehouse_id: WarehouseId,
        view: &TableIdent,
        state: Self::State,
    ) -> Result<Option<ViewInfo>, CatalogBackendError>;

    async fn get_view_by_id(
        warehouse_id: WarehouseId,
        view_id: ViewId,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Option<ViewInfo>, CatalogBackendError>;

    async fn commit_view<'a>(
        warehouse_id: WarehouseId,
        commit: ViewCommit,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ViewInfo, CommitViewError>;

    // ---------------- Expiration ----------------
    /// Remove every warehouse and tabular whose soft-deletion expired at `now`.
    /// Purging is idempotent: expired entities are only returned once.
    async fn purge_expired<'a>(
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<PurgedEntities, CatalogBackendError>;
}
