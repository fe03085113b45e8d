pub mod v1 {
    pub mod project;
    pub mod server;
    pub mod warehouse;

    #[cfg(feature = "open-api")]
    pub mod openapi;

    use std::marker::PhantomData;

    use axum::{
        Extension, Json, Router,
        extract::{Path, Query, State as AxumState},
        routing::{get, post},
    };
    use http::StatusCode;
    #[cfg(feature = "open-api")]
    use icehouse_ext::catalog::rest::IcebergErrorResponse;
    #[cfg(feature = "open-api")]
    pub use openapi::api_doc;
    use project::{
        CreateProjectRequest, CreateProjectResponse, GetProjectResponse, ListProjectsResponse,
        RenameProjectRequest, Service as _,
    };
    use serde::Deserialize;
    use server::{BootstrapRequest, ServerInfo, Service as _};
    use typed_builder::TypedBuilder;
    use warehouse::{
        CreateWarehouseRequest, CreateWarehouseResponse, GetWarehouseResponse,
        ListDeletedTabularsResponse, ListWarehousesRequest, ListWarehousesResponse,
        RenameWarehouseRequest, Service as _, UndropTabularsRequest,
        UpdateWarehouseCredentialRequest, UpdateWarehouseDeleteProfileRequest,
    };

    use crate::{
        ProjectId,
        api::{
            ApiContext, Result, endpoints::ManagementV1Endpoint,
            iceberg::types::PaginationQuery,
        },
        request_metadata::RequestMetadata,
        service::{CatalogStore, SecretStore, State, authz::Authorizer},
    };

    #[derive(Clone, Debug)]
    pub struct ApiServer<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> {
        auth_handler: PhantomData<A>,
        config_server: PhantomData<C>,
        secret_store: PhantomData<S>,
    }

    /// Server Info
    ///
    /// Returns basic information about the server configuration and status.
    #[cfg_attr(feature = "open-api", utoipa::path(
        get,
        tag = "server",
        path = ManagementV1Endpoint::ServerInfo.path(),
        responses(
            (status = 200, description = "Server info", body = ServerInfo),
            (status = "4XX", body = IcebergErrorResponse),
            (status = 500, description = "Unauthorized", body = IcebergErrorResponse)
        )
    ))]
    async fn get_server_info<C: CatalogStore, A: Authorizer, S: SecretStore>(
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<(StatusCode, Json<ServerInfo>)> {
        ApiServer::<C, A, S>::server_info(api_context, metadata)
            .await
            .map(|info| (StatusCode::OK, Json(info)))
    }

    /// Bootstrap
    ///
    /// Accepts the terms of use and makes the caller the initial administrator.
    /// Repeated calls succeed without changing anything.
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "server",
        path = ManagementV1Endpoint::Bootstrap.path(),
        request_body = BootstrapRequest,
        responses(
            (status = 204, description = "Server bootstrapped successfully"),
            (status = "4XX", body = IcebergErrorResponse),
            (status = 500, description = "InternalError", body = IcebergErrorResponse)
        )
    ))]
    async fn bootstrap<C: CatalogStore, A: Authorizer, S: SecretStore>(
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<BootstrapRequest>,
    ) -> Result<StatusCode> {
        ApiServer::<C, A, S>::bootstrap(api_context, metadata, request).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// Create Project
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "project",
        path = ManagementV1Endpoint::CreateProject.path(),
        request_body = CreateProjectRequest,
        responses(
            (status = 201, description = "Project created successfully", body = CreateProjectResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn create_project<C: CatalogStore, A: Authorizer, S: SecretStore>(
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<CreateProjectRequest>,
    ) -> Result<(StatusCode, Json<CreateProjectResponse>)> {
        ApiServer::<C, A, S>::create_project(request, api_context, metadata)
            .await
            .map(|r| (StatusCode::CREATED, Json(r)))
    }

    /// Get Project
    #[cfg_attr(feature = "open-api", utoipa::path(
        get,
        tag = "project",
        path = ManagementV1Endpoint::GetProject.path(),
        params(("project_id" = String,)),
        responses(
            (status = 200, description = "Project details", body = GetProjectResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn get_project<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(project_id): Path<ProjectId>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<(StatusCode, Json<GetProjectResponse>)> {
        ApiServer::<C, A, S>::get_project(project_id, api_context, metadata)
            .await
            .map(|r| (StatusCode::OK, Json(r)))
    }

    /// List Projects
    ///
    /// Lists the projects the caller is allowed to see.
    #[cfg_attr(feature = "open-api", utoipa::path(
        get,
        tag = "project",
        path = ManagementV1Endpoint::ListProjects.path(),
        responses(
            (status = 200, description = "List of projects", body = ListProjectsResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn list_projects<C: CatalogStore, A: Authorizer, S: SecretStore>(
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<Json<ListProjectsResponse>> {
        ApiServer::<C, A, S>::list_projects(api_context, metadata)
            .await
            .map(Json)
    }

    /// Rename Project
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "project",
        path = ManagementV1Endpoint::RenameProject.path(),
        params(("project_id" = String,)),
        request_body = RenameProjectRequest,
        responses(
            (status = 200, description = "Project renamed successfully"),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn rename_project<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(project_id): Path<ProjectId>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<RenameProjectRequest>,
    ) -> Result<StatusCode> {
        ApiServer::<C, A, S>::rename_project(project_id, request, api_context, metadata).await?;
        Ok(StatusCode::OK)
    }

    /// Delete Project
    ///
    /// Fails while the project still has warehouses, soft-deleted ones included.
    #[cfg_attr(feature = "open-api", utoipa::path(
        delete,
        tag = "project",
        path = ManagementV1Endpoint::DeleteProject.path(),
        params(("project_id" = String,)),
        responses(
            (status = 204, description = "Project deleted successfully"),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn delete_project<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(project_id): Path<ProjectId>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<StatusCode> {
        ApiServer::<C, A, S>::delete_project(project_id, api_context, metadata).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// Create Warehouse
    ///
    /// Creates a new warehouse in the specified project with the provided
    /// storage profile and credential.
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "warehouse",
        path = ManagementV1Endpoint::CreateWarehouse.path(),
        request_body = CreateWarehouseRequest,
        responses(
            (status = 201, description = "Warehouse created successfully", body = CreateWarehouseResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn create_warehouse<C: CatalogStore, A: Authorizer, S: SecretStore>(
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<CreateWarehouseRequest>,
    ) -> Result<(StatusCode, Json<CreateWarehouseResponse>)> {
        ApiServer::<C, A, S>::create_warehouse(request, api_context, metadata)
            .await
            .map(|r| (StatusCode::CREATED, Json(r)))
    }

    /// List Warehouses
    ///
    /// By default only active warehouses are returned. Use `warehouse-status` to
    /// include soft-deleted ones.
    #[cfg_attr(feature = "open-api", utoipa::path(
        get,
        tag = "warehouse",
        path = ManagementV1Endpoint::ListWarehouses.path(),
        params(ListWarehousesRequest),
        responses(
            (status = 200, description = "List of warehouses", body = ListWarehousesResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn list_warehouses<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Query(request): Query<ListWarehousesRequest>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<Json<ListWarehousesResponse>> {
        ApiServer::<C, A, S>::list_warehouses(request, api_context, metadata)
            .await
            .map(Json)
    }

    /// Get Warehouse
    #[cfg_attr(feature = "open-api", utoipa::path(
        get,
        tag = "warehouse",
        path = ManagementV1Endpoint::GetWarehouse.path(),
        params(("warehouse_id" = uuid::Uuid,)),
        responses(
            (status = 200, description = "Warehouse details", body = GetWarehouseResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn get_warehouse<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<Json<GetWarehouseResponse>> {
        ApiServer::<C, A, S>::get_warehouse(warehouse_id.into(), api_context, metadata)
            .await
            .map(Json)
    }

    #[derive(Debug, Deserialize, TypedBuilder)]
    #[cfg_attr(feature = "open-api", derive(utoipa::IntoParams))]
    pub struct DeleteWarehouseQuery {
        /// Delete the warehouse together with its namespaces, tables and views.
        #[serde(default)]
        #[builder(setter(strip_bool))]
        pub force: bool,
    }

    /// Delete Warehouse
    ///
    /// Soft-deletes or purges the warehouse according to its delete profile.
    /// Use `force` to delete a warehouse that is not empty.
    #[cfg_attr(feature = "open-api", utoipa::path(
        delete,
        tag = "warehouse",
        path = ManagementV1Endpoint::DeleteWarehouse.path(),
        params(("warehouse_id" = uuid::Uuid,), DeleteWarehouseQuery),
        responses(
            (status = 204, description = "Warehouse deleted successfully"),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn delete_warehouse<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        Query(query): Query<DeleteWarehouseQuery>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<StatusCode> {
        ApiServer::<C, A, S>::delete_warehouse(warehouse_id.into(), query, api_context, metadata)
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// Rename Warehouse
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "warehouse",
        path = ManagementV1Endpoint::RenameWarehouse.path(),
        params(("warehouse_id" = uuid::Uuid,)),
        request_body = RenameWarehouseRequest,
        responses(
            (status = 200, description = "Warehouse renamed successfully", body = GetWarehouseResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn rename_warehouse<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<RenameWarehouseRequest>,
    ) -> Result<Json<GetWarehouseResponse>> {
        ApiServer::<C, A, S>::rename_warehouse(warehouse_id.into(), request, api_context, metadata)
            .await
            .map(Json)
    }

    /// Update Storage Credential
    ///
    /// Replaces the storage credential of a warehouse. The credential must match
    /// the storage profile.
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "warehouse",
        path = ManagementV1Endpoint::UpdateStorageCredential.path(),
        params(("warehouse_id" = uuid::Uuid,)),
        request_body = UpdateWarehouseCredentialRequest,
        responses(
            (status = 200, description = "Storage credential updated successfully", body = GetWarehouseResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn update_storage_credential<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<UpdateWarehouseCredentialRequest>,
    ) -> Result<Json<GetWarehouseResponse>> {
        ApiServer::<C, A, S>::update_storage_credential(
            warehouse_id.into(),
            request,
            api_context,
            metadata,
        )
        .await
        .map(Json)
    }

    /// Update Delete Profile
    ///
    /// Applies to tables, views and the warehouse itself when they are deleted later on.
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "warehouse",
        path = ManagementV1Endpoint::UpdateDeleteProfile.path(),
        params(("warehouse_id" = uuid::Uuid,)),
        request_body = UpdateWarehouseDeleteProfileRequest,
        responses(
            (status = 200, description = "Delete profile updated successfully", body = GetWarehouseResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn update_delete_profile<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<UpdateWarehouseDeleteProfileRequest>,
    ) -> Result<Json<GetWarehouseResponse>> {
        ApiServer::<C, A, S>::update_delete_profile(
            warehouse_id.into(),
            request,
            api_context,
            metadata,
        )
        .await
        .map(Json)
    }

    /// Restore Warehouse
    ///
    /// Restores a soft-deleted warehouse that has not expired yet.
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "warehouse",
        path = ManagementV1Endpoint::RestoreWarehouse.path(),
        params(("warehouse_id" = uuid::Uuid,)),
        responses(
            (status = 200, description = "Warehouse restored successfully", body = GetWarehouseResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn restore_warehouse<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<Json<GetWarehouseResponse>> {
        ApiServer::<C, A, S>::restore_warehouse(warehouse_id.into(), api_context, metadata)
            .await
            .map(Json)
    }

    /// List Soft-Deleted Tabulars
    ///
    /// Lists tables and views that were soft-deleted and can still be restored.
    #[cfg_attr(feature = "open-api", utoipa::path(
        get,
        tag = "warehouse",
        path = ManagementV1Endpoint::ListDeletedTabulars.path(),
        params(("warehouse_id" = uuid::Uuid,)),
        responses(
            (status = 200, description = "List of soft-deleted tabulars", body = ListDeletedTabularsResponse),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn list_deleted_tabulars<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        Query(query): Query<PaginationQuery>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
    ) -> Result<Json<ListDeletedTabularsResponse>> {
        ApiServer::<C, A, S>::list_soft_deleted_tabulars(
            warehouse_id.into(),
            query,
            api_context,
            metadata,
        )
        .await
        .map(Json)
    }

    /// Undrop Tabulars
    ///
    /// Restores soft-deleted tables and views before they expire.
    #[cfg_attr(feature = "open-api", utoipa::path(
        post,
        tag = "warehouse",
        path = ManagementV1Endpoint::UndropTabulars.path(),
        params(("warehouse_id" = uuid::Uuid,)),
        request_body = UndropTabularsRequest,
        responses(
            (status = 204, description = "Tabulars restored successfully"),
            (status = "4XX", body = IcebergErrorResponse),
        )
    ))]
    async fn undrop_tabulars<C: CatalogStore, A: Authorizer, S: SecretStore>(
        Path(warehouse_id): Path<uuid::Uuid>,
        AxumState(api_context): AxumState<ApiContext<State<A, C, S>>>,
        Extension(metadata): Extension<RequestMetadata>,
        Json(request): Json<UndropTabularsRequest>,
    ) -> Result<StatusCode> {
        ApiServer::<C, A, S>::undrop_tabulars(warehouse_id.into(), request, api_context, metadata)
            .await?;
        Ok(StatusCode::NO_CONTENT)
    }

    impl<C: CatalogStore, A: Authorizer, S: SecretStore> ApiServer<C, A, S> {
        /// Routes of `/management/v1`, including the permission routes of `authorizer`.
        pub fn new_v1_router(authorizer: &A) -> Router<ApiContext<State<A, C, S>>> {
            use ManagementV1Endpoint as E;

            Router::new()
                // Server
                .route(E::ServerInfo.path_in_management_v1(), get(get_server_info))
                .route(E::Bootstrap.path_in_management_v1(), post(bootstrap))
                // Projects
                .route(E::CreateProject.path_in_management_v1(), post(create_project))
                .route(E::ListProjects.path_in_management_v1(), get(list_projects))
                .route(
                    E::GetProject.path_in_management_v1(),
                    get(get_project).delete(delete_project),
                )
                .route(E::RenameProject.path_in_management_v1(), post(rename_project))
                // Warehouses
                .route(
                    E::CreateWarehouse.path_in_management_v1(),
                    post(create_warehouse).get(list_warehouses),
                )
                .route(
                    E::GetWarehouse.path_in_management_v1(),
                    get(get_warehouse).delete(delete_warehouse),
                )
                .route(
                    E::RenameWarehouse.path_in_management_v1(),
                    post(rename_warehouse),
                )
                .route(
                    E::UpdateStorageCredential.path_in_management_v1(),
                    post(update_storage_credential),
                )
                .route(
                    E::UpdateDeleteProfile.path_in_management_v1(),
                    post(update_delete_profile),
                )
                .route(
                    E::RestoreWarehouse.path_in_management_v1(),
                    post(restore_warehouse),
                )
                .route(
                    E::ListDeletedTabulars.path_in_management_v1(),
                    get(list_deleted_tabulars),
                )
                .route(
                    E::UndropTabulars.path_in_management_v1(),
                    post(undrop_tabulars),
                )
                .merge(authorizer.new_router::<C, S>())
        }
    }
}
