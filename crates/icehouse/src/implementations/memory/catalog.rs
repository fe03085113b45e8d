use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use icehouse_ext::{NamespaceIdent, TableIdent};

use super::{
    CatalogState, MemoryBackend, MemoryTransaction,
    bootstrap::{bootstrap, get_server_info},
    namespace::{
        create_namespace, drop_namespace, get_namespace, list_namespaces,
        update_namespace_properties,
    },
    purge::purge_expired,
    tabular::{
        commit_tables, commit_view, create_table, create_view, drop_tabular, get_table,
        get_table_by_id, get_tabular_by_id, get_view, get_view_by_id, list_tabulars,
        rename_tabular, undrop_tabulars,
    },
    warehouse::{
        create_project, create_warehouse, delete_project, delete_warehouse, get_project,
        get_warehouse, get_warehouse_by_name, list_projects, list_warehouses, rename_project,
        rename_warehouse, restore_warehouse, set_warehouse_delete_profile,
        update_warehouse_storage,
    },
};
use crate::{
    ProjectId, SecretId, WarehouseId,
    api::Result,
    service::{
        CatalogBackendError, CatalogStore, CommitTableError, CommitViewError,
        CreateNamespaceError, CreateProjectError, CreateTableError, CreateViewError,
        CreateWarehouseError, DeleteProfile, DeleteProjectError, DeleteWarehouseError,
        DropMode, DropNamespaceError, DropTabularError, DroppedTabular, GetProjectResponse,
        ListNamespacesError, NamespaceId, NamespaceInfo, PurgedEntities, RenameProjectError,
        RenameTabularError, RenameWarehouseError, ResolvedWarehouse, RestoreWarehouseError,
        ServerInfo, TableCommit, TableCreation, TableId, TableInfo, TabularId, TabularInfo,
        TabularListFlags, TabularType, Transaction, UndropTabularError,
        UpdateNamespacePropertiesError, UpdateWarehouseError, ViewCommit, ViewCreation, ViewId,
        ViewInfo, WarehouseDeletion, WarehouseStatus, storage::StorageProfile,
    },
};

#[async_trait::async_trait]
impl CatalogStore for MemoryBackend {
    type Transaction = MemoryTransaction;
    type State = CatalogState;

    // ---------------- Server Management ----------------
    async fn get_server_info(state: Self::State) -> Result<ServerInfo, CatalogBackendError> {
        Ok(get_server_info(&*state.read().await))
    }

    async fn bootstrap<'a>(
        terms_accepted: bool,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<bool, CatalogBackendError> {
        Ok(bootstrap(terms_accepted, transaction))
    }

    // ---------------- Project Management ----------------
    #[tracing::instrument(skip(transaction))]
    async fn create_project<'a>(
        project_id: &ProjectId,
        project_name: String,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<GetProjectResponse, CreateProjectError> {
        create_project(project_id, project_name, transaction)
    }

    async fn get_project(
        project_id: &ProjectId,
        state: Self::State,
    ) -> Result<Option<GetProjectResponse>, CatalogBackendError> {
        Ok(get_project(project_id, &*state.read().await))
    }

    async fn list_projects(
        project_ids: Option<HashSet<ProjectId>>,
        state: Self::State,
    ) -> Result<Vec<GetProjectResponse>, CatalogBackendError> {
        Ok(list_projects(project_ids.as_ref(), &*state.read().await))
    }

    #[tracing::instrument(skip(transaction))]
    async fn rename_project<'a>(
        project_id: &ProjectId,
        new_name: &str,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), RenameProjectError> {
        rename_project(project_id, new_name, transaction)
    }

    #[tracing::instrument(skip(transaction))]
    async fn delete_project<'a>(
        project_id: &ProjectId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<(), DeleteProjectError> {
        delete_project(project_id, transaction)
    }

    // ---------------- Warehouse Management ----------------
    #[tracing::instrument(skip(storage_profile, transaction))]
    async fn create_warehouse<'a>(
        warehouse_name: String,
        project_id: &ProjectId,
        storage_profile: StorageProfile,
        delete_profile: DeleteProfile,
        storage_secret_id: Option<SecretId>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, CreateWarehouseError> {
        create_warehouse(
            warehouse_name,
            project_id,
            storage_profile,
            delete_profile,
            storage_secret_id,
            transaction,
        )
    }

    async fn get_warehouse(
        warehouse_id: WarehouseId,
        state: Self::State,
    ) -> Result<Option<ResolvedWarehouse>, CatalogBackendError> {
        Ok(get_warehouse(warehouse_id, &*state.read().await))
    }

    async fn get_warehouse_by_name(
        warehouse_name: &str,
        project_id: &ProjectId,
        state: Self::State,
    ) -> Result<Option<ResolvedWarehouse>, CatalogBackendError> {
        Ok(get_warehouse_by_name(
            warehouse_name,
            project_id,
            &*state.read().await,
        ))
    }

    async fn list_warehouses(
        project_id: &ProjectId,
        status_filter: Option<Vec<WarehouseStatus>>,
        state: Self::State,
    ) -> Result<Vec<ResolvedWarehouse>, CatalogBackendError> {
        Ok(list_warehouses(
            project_id,
            status_filter.as_deref(),
            &*state.read().await,
        ))
    }

    #[tracing::instrument(skip(transaction))]
    async fn rename_warehouse<'a>(
        warehouse_id: WarehouseId,
        new_name: &str,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, RenameWarehouseError> {
        rename_warehouse(warehouse_id, new_name, transaction)
    }

    #[tracing::instrument(skip(transaction))]
    async fn set_warehouse_delete_profile<'a>(
        warehouse_id: WarehouseId,
        delete_profile: DeleteProfile,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, UpdateWarehouseError> {
        set_warehouse_delete_profile(warehouse_id, delete_profile, transaction)
    }

    #[tracing::instrument(skip(storage_profile, transaction))]
    async fn update_warehouse_storage<'a>(
        warehouse_id: WarehouseId,
        storage_profile: StorageProfile,
        storage_secret_id: Option<SecretId>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, UpdateWarehouseError> {
        update_warehouse_storage(warehouse_id, storage_profile, storage_secret_id, transaction)
    }

    #[tracing::instrument(skip(transaction))]
    async fn delete_warehouse<'a>(
        warehouse_id: WarehouseId,
        force: bool,
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<WarehouseDeletion, DeleteWarehouseError> {
        delete_warehouse(warehouse_id, force, now, transaction)
    }

    #[tracing::instrument(skip(transaction))]
    async fn restore_warehouse<'a>(
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ResolvedWarehouse, RestoreWarehouseError> {
        restore_warehouse(warehouse_id, now, transaction)
    }

    // ---------------- Namespace Management ----------------
    async fn list_namespaces(
        warehouse_id: WarehouseId,
        parent: Option<&NamespaceIdent>,
        state: Self::State,
    ) -> Result<Vec<NamespaceInfo>, ListNamespacesError> {
        list_namespaces(warehouse_id, parent, &*state.read().await)
    }

    async fn get_namespace(
        warehouse_id: WarehouseId,
        namespace: &NamespaceIdent,
        state: Self::State,
    ) -> Result<Option<NamespaceInfo>, CatalogBackendError> {
        Ok(get_namespace(warehouse_id, namespace, &*state.read().await))
    }

    #[tracing::instrument(skip(properties, transaction))]
    async fn create_namespace<'a>(
        warehouse_id: WarehouseId,
        namespace_id: NamespaceId,
        namespace: NamespaceIdent,
        properties: HashMap<String, String>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<NamespaceInfo, CreateNamespaceError> {
        create_namespace(warehouse_id, namespace_id, namespace, properties, transaction)
    }

    #[tracing::instrument(skip(transaction))]
    async fn drop_namespace<'a>(
        warehouse_id: WarehouseId,
        namespace_id: NamespaceId,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<NamespaceInfo, DropNamespaceError> {
        drop_namespace(warehouse_id, namespace_id, transaction)
    }

    #[tracing::instrument(skip(properties, transaction))]
    async fn update_namespace_properties<'a>(
        warehouse_id: WarehouseId,
        namespace_id: NamespaceId,
        properties: HashMap<String, String>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<NamespaceInfo, UpdateNamespacePropertiesError> {
        update_namespace_properties(warehouse_id, namespace_id, properties, transaction)
    }

    // ---------------- Tabular Management ----------------
    async fn list_tabulars(
        warehouse_id: WarehouseId,
        namespace_id: Option<NamespaceId>,
        typ: Option<TabularType>,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Vec<TabularInfo>, CatalogBackendError> {
        Ok(list_tabulars(
            warehouse_id,
            namespace_id,
            typ,
            flags,
            &*state.read().await,
        ))
    }

    async fn get_tabular_by_id(
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Option<TabularInfo>, CatalogBackendError> {
        Ok(get_tabular_by_id(
            warehouse_id,
            tabular_id,
            flags,
            &*state.read().await,
        ))
    }

    #[tracing::instrument(skip(transaction))]
    async fn rename_tabular<'a>(
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
        destination: &TableIdent,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<TabularInfo, RenameTabularError> {
        rename_tabular(warehouse_id, tabular_id, destination, transaction)
    }

    #[tracing::instrument(skip(transaction))]
    async fn drop_tabular<'a>(
        warehouse_id: WarehouseId,
        tabular_id: TabularId,
        mode: DropMode,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<DroppedTabular, DropTabularError> {
        drop_tabular(warehouse_id, tabular_id, mode, transaction)
    }

    #[tracing::instrument(skip(transaction))]
    async fn undrop_tabulars<'a>(
        warehouse_id: WarehouseId,
        tabular_ids: &[TabularId],
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TabularInfo>, UndropTabularError> {
        undrop_tabulars(warehouse_id, tabular_ids, now, transaction)
    }

    // ---------------- Table Management ----------------
    #[tracing::instrument(skip_all, fields(table = %creation.table_ident.name, table_id = %creation.table_id))]
    async fn create_table<'a>(
        creation: TableCreation,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<TableInfo, CreateTableError> {
        create_table(creation, transaction)
    }

    async fn get_table(
        warehouse_id: WarehouseId,
        table: &TableIdent,
        include_staged: bool,
        state: Self::State,
    ) -> Result<Option<TableInfo>, CatalogBackendError> {
        Ok(get_table(
            warehouse_id,
            table,
            include_staged,
            &*state.read().await,
        ))
    }

    async fn get_table_by_id(
        warehouse_id: WarehouseId,
        table_id: TableId,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Option<TableInfo>, CatalogBackendError> {
        Ok(get_table_by_id(
            warehouse_id,
            table_id,
            flags,
            &*state.read().await,
        ))
    }

    #[tracing::instrument(skip_all, fields(%warehouse_id, tables = commits.len()))]
    async fn commit_tables<'a>(
        warehouse_id: WarehouseId,
        commits: Vec<TableCommit>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<Vec<TableInfo>, CommitTableError> {
        commit_tables(warehouse_id, commits, transaction)
    }

    // ---------------- View Management ----------------
    #[tracing::instrument(skip_all, fields(view = %creation.view_ident.name, view_id = %creation.view_id))]
    async fn create_view<'a>(
        creation: ViewCreation,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ViewInfo, CreateViewError> {
        create_view(creation, transaction)
    }

    async fn get_view(
        warehouse_id: WarehouseId,
        view: &TableIdent,
        state: Self::State,
    ) -> Result<Option<ViewInfo>, CatalogBackendError> {
        Ok(get_view(warehouse_id, view, &*state.read().await))
    }

    async fn get_view_by_id(
        warehouse_id: WarehouseId,
        view_id: ViewId,
        flags: TabularListFlags,
        state: Self::State,
    ) -> Result<Option<ViewInfo>, CatalogBackendError> {
        Ok(get_view_by_id(
            warehouse_id,
            view_id,
            flags,
            &*state.read().await,
        ))
    }

    #[tracing::instrument(skip_all, fields(%warehouse_id, view_id = %commit.view_id))]
    async fn commit_view<'a>(
        warehouse_id: WarehouseId,
        commit: ViewCommit,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<ViewInfo, CommitViewError> {
        commit_view(warehouse_id, commit, transaction)
    }

    // ---------------- Expiration ----------------
    #[tracing::instrument(skip(transaction))]
    async fn purge_expired<'a>(
        now: DateTime<Utc>,
        transaction: <Self::Transaction as Transaction<Self::State>>::Transaction<'a>,
    ) -> Result<PurgedEntities, CatalogBackendError> {
        Ok(purge_expired(now, transaction))
    }
}
