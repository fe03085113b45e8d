use async_trait::async_trait;
use axum::{Router, response::IntoResponse, routing::any};
use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};

use crate::{
    api::{ApiContext, Result},
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, NamespaceId, NamespaceInfo, ProjectId, ResolvedWarehouse, SecretStore,
        ServerId, State, TableId, TabularInfo, ViewId, WarehouseId,
        authz::{
            AuthorizationBackendUnavailable, Authorizer, CatalogNamespaceAction,
            CatalogProjectAction, CatalogServerAction, CatalogTableAction, CatalogViewAction,
            CatalogWarehouseAction, NamespaceParent,
        },
    },
};

/// Every check passes. Keeps no state, so the hooks are no-ops.
#[derive(Clone, Debug)]
pub struct AllowAllAuthorizer {
    pub server_id: ServerId,
}

#[cfg(test)]
impl std::default::Default for AllowAllAuthorizer {
    fn default() -> Self {
        Self {
            server_id: ServerId::new_random(),
        }
    }
}

async fn permissions_not_supported() -> impl IntoResponse {
    IcebergErrorResponse::from(ErrorModel::not_implemented(
        "Permission management is not supported by the `allow-all` authorizer",
        "PermissionsNotSupported",
        None,
    ))
}

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    fn implementation_name() -> &'static str {
        "allow-all"
    }

    fn server_id(&self) -> ServerId {
        self.server_id
    }

    fn new_router<C: CatalogStore, S: SecretStore>(&self) -> Router<ApiContext<State<Self, C, S>>> {
        Router::new()
            .route("/permissions", any(permissions_not_supported))
            .route("/permissions/{*rest}", any(permissions_not_supported))
    }

    async fn can_bootstrap(&self, _metadata: &RequestMetadata) -> Result<()> {
        Ok(())
    }

    async fn bootstrap(&self, _metadata: &RequestMetadata, _is_operator: bool) -> Result<()> {
        Ok(())
    }

    async fn is_allowed_server_action_impl(
        &self,
        _metadata: &RequestMetadata,
        _action: CatalogServerAction,
    ) -> Result<bool, AuthorizationBackendUnavailable> {
        Ok(true)
    }

    async fn is_allowed_project_action_impl(
        &self,
        _metadata: &RequestMetadata,
        _project_id: &ProjectId,
        _action: CatalogProjectAction,
    ) -> Result<bool, AuthorizationBackendUnavailable> {
        Ok(true)
    }

    async fn is_allowed_warehouse_action_impl(
        &self,
        _metadata: &RequestMetadata,
        _warehouse: &ResolvedWarehouse,
        _action: CatalogWarehouseAction,
    ) -> Result<bool, AuthorizationBackendUnavailable> {
        Ok(true)
    }

    async fn is_allowed_namespace_action_impl(
        &self,
        _metadata: &RequestMetadata,
        _warehouse: &ResolvedWarehouse,
        _namespace: &NamespaceInfo,
        _action: CatalogNamespaceAction,
    ) -> Result<bool, AuthorizationBackendUnavailable> {
        Ok(true)
    }

    async fn is_allowed_table_action_impl(
        &self,
        _metadata: &RequestMetadata,
        _warehouse: &ResolvedWarehouse,
        _table: &TabularInfo,
        _action: CatalogTableAction,
    ) -> Result<bool, AuthorizationBackendUnavailable> {
        Ok(true)
    }

    async fn is_allowed_view_action_impl(
        &self,
        _metadata: &RequestMetadata,
        _warehouse: &ResolvedWarehouse,
        _view: &TabularInfo,
        _action: CatalogViewAction,
    ) -> Result<bool, AuthorizationBackendUnavailable> {
        Ok(true)
    }

    async fn create_project(
        &self,
        _metadata: &RequestMetadata,
        _project_id: &ProjectId,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_project(&self, _project_id: &ProjectId) -> Result<()> {
        Ok(())
    }

    async fn create_warehouse(
        &self,
        _metadata: &RequestMetadata,
        _warehouse_id: WarehouseId,
        _parent_project_id: &ProjectId,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_warehouse(&self, _warehouse_id: WarehouseId) -> Result<()> {
        Ok(())
    }

    async fn create_namespace(
        &self,
        _metadata: &RequestMetadata,
        _namespace_id: NamespaceId,
        _parent: NamespaceParent,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_namespace(&self, _namespace_id: NamespaceId) -> Result<()> {
        Ok(())
    }

    async fn create_table(
        &self,
        _metadata: &RequestMetadata,
        _warehouse_id: WarehouseId,
        _table_id: TableId,
        _parent: NamespaceId,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_table(&self, _warehouse_id: WarehouseId, _table_id: TableId) -> Result<()> {
        Ok(())
    }

    async fn create_view(
        &self,
        _metadata: &RequestMetadata,
        _warehouse_id: WarehouseId,
        _view_id: ViewId,
        _parent: NamespaceId,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_view(&self, _warehouse_id: WarehouseId, _view_id: ViewId) -> Result<()> {
        Ok(())
    }
}
