use axum::Router;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, VariantArray};
use strum_macros::EnumString;

use super::{
    CatalogStore, NamespaceId, NamespaceInfo, ProjectId, ResolvedWarehouse, SecretStore, State,
    TableId, TabularId, TabularInfo, ViewId, WarehouseId,
};
use crate::{
    api::{ApiContext, Result},
    request_metadata::RequestMetadata,
    service::ServerId,
};

mod error;
pub mod implementations;
pub use error::*;
mod warehouse;
pub use implementations::allow_all::AllowAllAuthorizer;
pub use warehouse::*;
mod namespace;
pub use namespace::*;
mod table;
pub use table::*;
mod view;
pub use view::*;
mod project;
pub use project::*;
mod server;
pub use server::*;

#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    strum_macros::Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
    VariantArray,
)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CatalogServerAction {
    /// Can create projects on this server.
    CanCreateProject,
    /// Can list every project, not only the ones with grants.
    CanListAllProjects,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    strum_macros::Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
    VariantArray,
)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CatalogProjectAction {
    CanCreateWarehouse,
    CanDelete,
    CanRename,
    CanGetMetadata,
    CanListWarehouses,
    CanIncludeInList,
}

#[derive(
    Debug,
    Hash,
    Clone,
    Copy,
    Eq,
    PartialEq,
    strum_macros::Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
    VariantArray,
)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CatalogWarehouseAction {
    CanCreateNamespace,
    CanDelete,
    CanUpdateStorage,
    CanUpdateStorageCredential,
    CanGetMetadata,
    CanGetConfig,
    CanListNamespaces,
    CanUse,
    CanIncludeInList,
    CanRename,
    CanListDeletedTabulars,
    CanModifySoftDeletion,
    CanRestore,
}

#[derive(
    Debug,
    Hash,
    Clone,
    Copy,
    Eq,
    PartialEq,
    strum_macros::Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
    VariantArray,
)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CatalogNamespaceAction {
    CanCreateTable,
    CanCreateView,
    CanCreateNamespace,
    CanDelete,
    CanUpdateProperties,
    CanGetMetadata,
    CanListTables,
    CanListViews,
    CanListNamespaces,
    CanIncludeInList,
}

#[derive(
    Debug,
    Hash,
    Clone,
    Copy,
    Eq,
    PartialEq,
    strum_macros::Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
    VariantArray,
)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CatalogTableAction {
    CanDrop,
    CanWriteData,
    CanReadData,
    CanGetMetadata,
    CanCommit,
    CanRename,
    CanIncludeInList,
    CanUndrop,
}

#[derive(
    Debug,
    Hash,
    Clone,
    Copy,
    Eq,
    PartialEq,
    strum_macros::Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
    VariantArray,
)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CatalogViewAction {
    CanDrop,
    CanGetMetadata,
    CanCommit,
    CanIncludeInList,
    CanRename,
    CanUndrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceParent {
    Warehouse(WarehouseId),
    Namespace(NamespaceId),
}

#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq)]
pub struct MustUse<T>(T);

impl<T> From<T> for MustUse<T> {
    fn from(v: T) -> Self {
        Self(v)
    }
}

impl<T> MustUse<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[async_trait::async_trait]
/// Interface to provide Authorization functions to the catalog.
///
/// # Single vs batch checks
///
/// Methods `is_allowed_x_action_impl` check a single tuple. Listing endpoints check many
/// tuples at once through `are_allowed_x_actions_impl`. The default implementations
/// run the single checks concurrently, implementations with a batch API should override them.
///
/// # Hooks
///
/// `create_*` and `delete_*` are called after the catalog store committed the change, so
/// implementations can maintain the resource hierarchy they check against.
pub trait Authorizer
where
    Self: Send + Sync + 'static + Clone + std::fmt::Debug,
{
    fn implementation_name() -> &'static str;

    /// Stable for the lifetime of the process.
    fn server_id(&self) -> ServerId;

    /// Routes below `/management/v1/permissions`.
    fn new_router<C: CatalogStore, S: SecretStore>(&self) -> Router<ApiContext<State<Self, C, S>>>;

    /// Check if this server can be bootstrapped by the provided user.
    async fn can_bootstrap(&self, metadata: &RequestMetadata) -> Result<()>;

    /// Perform bootstrapping, including granting the provided user the highest level of access.
    async fn bootstrap(&self, metadata: &RequestMetadata, is_operator: bool) -> Result<()>;

    async fn is_allowed_server_action_impl(
        &self,
        metadata: &RequestMetadata,
        action: CatalogServerAction,
    ) -> Result<bool, AuthorizationBackendUnavailable>;

    async fn is_allowed_project_action_impl(
        &self,
        metadata: &RequestMetadata,
        project_id: &ProjectId,
        action: CatalogProjectAction,
    ) -> Result<bool, AuthorizationBackendUnavailable>;

    async fn are_allowed_project_actions_impl(
        &self,
        metadata: &RequestMetadata,
        projects_with_actions: &[(&ProjectId, CatalogProjectAction)],
    ) -> Result<Vec<bool>, AuthorizationBackendUnavailable> {
        let futures: Vec<_> = projects_with_actions
            .iter()
            .map(|(project, a)| self.is_allowed_project_action_impl(metadata, project, *a))
            .collect();
        try_join_all(futures).await
    }

    async fn is_allowed_warehouse_action_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        action: CatalogWarehouseAction,
    ) -> Result<bool, AuthorizationBackendUnavailable>;

    async fn are_allowed_warehouse_actions_impl(
        &self,
        metadata: &RequestMetadata,
        warehouses_with_actions: &[(&ResolvedWarehouse, CatalogWarehouseAction)],
    ) -> Result<Vec<bool>, AuthorizationBackendUnavailable> {
        let futures: Vec<_> = warehouses_with_actions
            .iter()
            .map(|(warehouse, a)| self.is_allowed_warehouse_action_impl(metadata, warehouse, *a))
            .collect();
        try_join_all(futures).await
    }

    async fn is_allowed_namespace_action_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        namespace: &NamespaceInfo,
        action: CatalogNamespaceAction,
    ) -> Result<bool, AuthorizationBackendUnavailable>;

    async fn are_allowed_namespace_actions_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        namespaces_with_actions: &[(&NamespaceInfo, CatalogNamespaceAction)],
    ) -> Result<Vec<bool>, AuthorizationBackendUnavailable> {
        let futures: Vec<_> = namespaces_with_actions
            .iter()
            .map(|(namespace, a)| {
                self.is_allowed_namespace_action_impl(metadata, warehouse, namespace, *a)
            })
            .collect();
        try_join_all(futures).await
    }

    async fn is_allowed_table_action_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        table: &TabularInfo,
        action: CatalogTableAction,
    ) -> Result<bool, AuthorizationBackendUnavailable>;

    async fn are_allowed_table_actions_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        tables_with_actions: &[(&TabularInfo, CatalogTableAction)],
    ) -> Result<Vec<bool>, AuthorizationBackendUnavailable> {
        let futures: Vec<_> = tables_with_actions
            .iter()
            .map(|(table, a)| self.is_allowed_table_action_impl(metadata, warehouse, table, *a))
            .collect();
        try_join_all(futures).await
    }

    async fn is_allowed_view_action_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        view: &TabularInfo,
        action: CatalogViewAction,
    ) -> Result<bool, AuthorizationBackendUnavailable>;

    async fn are_allowed_view_actions_impl(
        &self,
        metadata: &RequestMetadata,
        warehouse: &ResolvedWarehouse,
        views_with_actions: &[(&TabularInfo, CatalogViewAction)],
    ) -> Result<Vec<bool>, AuthorizationBackendUnavailable> {
        let futures: Vec<_> = views_with_actions
            .iter()
            .map(|(view, a)| self.is_allowed_view_action_impl(metadata, warehouse, view, *a))
            .collect();
        try_join_all(futures).await
    }

    async fn create_project(&self, metadata: &RequestMetadata, project_id: &ProjectId)
    -> Result<()>;

    async fn delete_project(&self, project_id: &ProjectId) -> Result<()>;

    async fn create_warehouse(
        &self,
        metadata: &RequestMetadata,
        warehouse_id: WarehouseId,
        parent_project_id: &ProjectId,
    ) -> Result<()>;

    /// Also called by the expiration sweep, without a request.
    async fn delete_warehouse(&self, warehouse_id: WarehouseId) -> Result<()>;

    async fn create_namespace(
        &self,
        metadata: &RequestMetadata,
        namespace_id: NamespaceId,
        parent: NamespaceParent,
    ) -> Result<()>;

    async fn delete_namespace(&self, namespace_id: NamespaceId) -> Result<()>;

    async fn create_table(
        &self,
        metadata: &RequestMetadata,
        warehouse_id: WarehouseId,
        table_id: TableId,
        parent: NamespaceId,
    ) -> Result<()>;

    async fn delete_table(&self, warehouse_id: WarehouseId, table_id: TableId) -> Result<()>;

    async fn create_view(
        &self,
        metadata: &RequestMetadata,
        warehouse_id: WarehouseId,
        view_id: ViewId,
        parent: NamespaceId,
    ) -> Result<()>;

    async fn delete_view(&self, warehouse_id: WarehouseId, view_id: ViewId) -> Result<()>;

    /// A table or view was renamed into another namespace.
    async fn move_tabular(
        &self,
        _warehouse_id: WarehouseId,
        _tabular_id: TabularId,
        _new_parent: NamespaceId,
    ) -> Result<()> {
        Ok(())
    }
}
