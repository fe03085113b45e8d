mod undrop;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use icehouse_ext::catalog::rest::ErrorModel;
use serde::{Deserialize, Serialize};
pub use undrop::UndropTabularsRequest;

use super::{ApiServer, DeleteWarehouseQuery};
use crate::{
    ProjectId, SecretId, WarehouseId,
    api::{
        ApiContext, Result,
        iceberg::types::{PaginationQuery, paginate},
    },
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, DeleteProfile, DeletionInfo, ResolvedWarehouse, SecretStore, State,
        TabularId, TabularInfo, TabularListFlags, TabularType, Transaction, WarehouseDeletion,
        WarehouseStatus,
        authz::{
            AuthZProjectOps, AuthZTableOps, AuthZViewOps, Authorizer, AuthzWarehouseOps,
            CatalogProjectAction, CatalogTableAction, CatalogViewAction, CatalogWarehouseAction,
        },
        expiration::cleanup_warehouse_storage,
        storage::{StorageCredential, StorageProfile},
    },
};

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct CreateWarehouseRequest {
    /// Name of the warehouse to create. Must be unique among the active
    /// warehouses of a project and may not contain "/".
    pub warehouse_name: String,
    /// Project ID in which to create the warehouse.
    /// If no default project is configured, this field is required.
    #[serde(default)]
    #[cfg_attr(feature = "open-api", schema(value_type = Option<String>))]
    pub project_id: Option<ProjectId>,
    /// Storage profile to use for the warehouse.
    pub storage_profile: StorageProfile,
    /// Optional storage credential to use for the warehouse.
    #[serde(default)]
    #[cfg_attr(feature = "open-api", schema(value_type = Option<Object>))]
    pub storage_credential: Option<StorageCredential>,
    /// Defaults to a soft delete profile of seven days.
    #[serde(default)]
    pub delete_profile: DeleteProfile,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct CreateWarehouseResponse {
    /// ID of the created warehouse.
    #[cfg_attr(feature = "open-api", schema(value_type = uuid::Uuid))]
    pub warehouse_id: WarehouseId,
}

#[derive(Debug, Deserialize, Default)]
#[cfg_attr(feature = "open-api", derive(utoipa::IntoParams))]
#[serde(rename_all = "kebab-case")]
pub struct ListWarehousesRequest {
    /// Comma separated list of statuses. Only active warehouses are returned
    /// if not specified.
    #[serde(default)]
    pub warehouse_status: Option<String>,
    /// Project of the warehouses. Uses the default project if not specified.
    #[serde(default)]
    #[cfg_attr(feature = "open-api", param(value_type = Option<String>))]
    pub project_id: Option<ProjectId>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct GetWarehouseResponse {
    #[cfg_attr(feature = "open-api", schema(value_type = uuid::Uuid))]
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    #[cfg_attr(feature = "open-api", schema(value_type = String))]
    pub project_id: ProjectId,
    pub storage_profile: StorageProfile,
    pub delete_profile: DeleteProfile,
    pub status: WarehouseStatus,
    /// Set while the warehouse is soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion: Option<DeletionInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct ListWarehousesResponse {
    pub warehouses: Vec<GetWarehouseResponse>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct RenameWarehouseRequest {
    /// New name for the warehouse.
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct UpdateWarehouseCredentialRequest {
    /// New storage credential. Omit to remove the credential.
    #[serde(default)]
    #[cfg_attr(feature = "open-api", schema(value_type = Option<Object>))]
    pub new_storage_credential: Option<StorageCredential>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct UpdateWarehouseDeleteProfileRequest {
    pub delete_profile: DeleteProfile,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct DeletedTabularResponse {
    /// Unique identifier of the tabular
    pub id: uuid::Uuid,
    /// Name of the tabular
    pub name: String,
    /// List of namespace parts the tabular belongs to
    pub namespace: Vec<String>,
    /// Type of the tabular
    pub typ: TabularType,
    /// Warehouse ID where the tabular is stored
    #[cfg_attr(feature = "open-api", schema(value_type = uuid::Uuid))]
    pub warehouse_id: WarehouseId,
    /// Date when the tabular was created
    pub created_at: DateTime<Utc>,
    /// Date when the tabular was deleted
    pub deleted_at: DateTime<Utc>,
    /// Date when the tabular will not be recoverable anymore
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct ListDeletedTabularsResponse {
    /// List of tabulars
    pub tabulars: Vec<DeletedTabularResponse>,
    /// Token to fetch the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl From<ResolvedWarehouse> for GetWarehouseResponse {
    fn from(warehouse: ResolvedWarehouse) -> Self {
        Self {
            warehouse_id: warehouse.warehouse_id,
            warehouse_name: warehouse.name,
            project_id: warehouse.project_id,
            storage_profile: warehouse.storage_profile,
            delete_profile: warehouse.delete_profile,
            status: warehouse.status,
            deletion: warehouse.deletion,
        }
    }
}

impl DeletedTabularResponse {
    fn from_info(info: TabularInfo) -> Option<Self> {
        let deletion = info.deletion?;
        Some(Self {
            id: info.tabular_id.uuid(),
            name: info.tabular_ident.name,
            namespace: info.tabular_ident.namespace.inner().to_vec(),
            typ: info.tabular_id.into(),
            warehouse_id: info.warehouse_id,
            created_at: info.created_at,
            deleted_at: deletion.deleted_at,
            expiration_date: deletion.expires_at,
        })
    }
}

impl<C: CatalogStore, A: Authorizer, S: SecretStore> Service<C, A, S> for ApiServer<C, A, S> {}

#[async_trait::async_trait]
pub trait Service<C: CatalogStore, A: Authorizer, S: SecretStore> {
    async fn create_warehouse(
        request: CreateWarehouseRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<CreateWarehouseResponse> {
        let CreateWarehouseRequest {
            warehouse_name,
            project_id,
            storage_profile,
            storage_credential,
            delete_profile,
        } = request;
        let project_id = require_project_id(project_id, &context)?;
        let state = context.v1_state;

        // ------------------- AUTHZ -------------------
        state
            .authz
            .require_project_action(
                &request_metadata,
                &project_id,
                CatalogProjectAction::CanCreateWarehouse,
            )
            .await?;

        // ------------------- VALIDATIONS -------------------
        validate_warehouse_name(&warehouse_name)?;
        validate_delete_profile(delete_profile)?;
        let (storage_profile, storage_credential) = storage_profile
            .validate_credential(storage_credential)?
            .into_parts();

        // ------------------- BUSINESS LOGIC -------------------
        let secret_id = match storage_credential {
            Some(credential) => Some(state.secrets.create_secret(credential).await?),
            None => None,
        };

        let mut t = C::Transaction::begin_write(state.catalog.clone()).await?;
        let created = C::create_warehouse(
            warehouse_name,
            &project_id,
            storage_profile,
            delete_profile,
            secret_id,
            t.transaction(),
        )
        .await;
        let warehouse = match created {
            Ok(warehouse) => warehouse,
            Err(e) => {
                t.rollback().await?;
                delete_secret_best_effort(&state.secrets, secret_id).await;
                return Err(e.into());
            }
        };
        if let Err(e) = t.commit().await {
            delete_secret_best_effort(&state.secrets, secret_id).await;
            return Err(e);
        }

        state
            .authz
            .create_warehouse(&request_metadata, warehouse.warehouse_id, &project_id)
            .await?;

        tracing::info!(
            warehouse_id = %warehouse.warehouse_id,
            %project_id,
            "Warehouse created"
        );
        Ok(CreateWarehouseResponse {
            warehouse_id: warehouse.warehouse_id,
        })
    }

    async fn list_warehouses(
        request: ListWarehousesRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<ListWarehousesResponse> {
        let project_id = require_project_id(request.project_id, &context)?;
        let status_filter = request
            .warehouse_status
            .as_deref()
            .map(parse_status_filter)
            .transpose()?;
        let state = context.v1_state;

        // ------------------- AUTHZ -------------------
        state
            .authz
            .require_project_action(
                &request_metadata,
                &project_id,
                CatalogProjectAction::CanListWarehouses,
            )
            .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let warehouses = C::list_warehouses(&project_id, status_filter, state.catalog).await?;
        let checks = warehouses
            .iter()
            .map(|w| (w, CatalogWarehouseAction::CanIncludeInList))
            .collect::<Vec<_>>();
        let allowed = state
            .authz
            .are_allowed_warehouse_actions_vec(&request_metadata, &checks)
            .await?
            .into_inner();
        let warehouses = warehouses
            .iter()
            .zip(allowed)
            .filter(|(_, allowed)| *allowed)
            .map(|(w, _)| GetWarehouseResponse::from(w.clone()))
            .collect();

        Ok(ListWarehousesResponse { warehouses })
    }

    async fn get_warehouse(
        warehouse_id: WarehouseId,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<GetWarehouseResponse> {
        let state = context.v1_state;
        let warehouse = C::get_warehouse(warehouse_id, state.catalog).await;
        let warehouse = state
            .authz
            .require_warehouse_action(
                &request_metadata,
                warehouse_id,
                warehouse,
                CatalogWarehouseAction::CanGetMetadata,
            )
            .await?;
        Ok(warehouse.into())
    }

    async fn delete_warehouse(
        warehouse_id: WarehouseId,
        query: DeleteWarehouseQuery,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let state = context.v1_state;

        // ------------------- AUTHZ -------------------
        let warehouse = C::get_warehouse(warehouse_id, state.catalog.clone())
            .await
            .map(|w| w.filter(ResolvedWarehouse::is_active));
        state
            .authz
            .require_warehouse_action(
                &request_metadata,
                warehouse_id,
                warehouse,
                CatalogWarehouseAction::CanDelete,
            )
            .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let mut t = C::Transaction::begin_write(state.catalog).await?;
        let deletion =
            C::delete_warehouse(warehouse_id, query.force, Utc::now(), t.transaction()).await?;
        t.commit().await?;

        match deletion {
            WarehouseDeletion::SoftDeleted(warehouse) => {
                tracing::info!(
                    %warehouse_id,
                    expires_at = ?warehouse.deletion.map(|d| d.expires_at),
                    "Warehouse soft-deleted"
                );
            }
            WarehouseDeletion::Purged(warehouse) => {
                state.authz.delete_warehouse(warehouse_id).await?;
                // Also deletes the warehouse secret. Failures are logged by the cleanup.
                let failure =
                    cleanup_warehouse_storage(&state.storage, &state.secrets, &warehouse).await;
                tracing::info!(
                    %warehouse_id,
                    storage_cleaned = failure.is_none(),
                    "Warehouse purged"
                );
            }
        }
        Ok(())
    }

    async fn rename_warehouse(
        warehouse_id: WarehouseId,
        request: RenameWarehouseRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<GetWarehouseResponse> {
        let state = context.v1_state;
        require_active_warehouse_action::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanRename,
        )
        .await?;
        validate_warehouse_name(&request.new_name)?;

        let mut t = C::Transaction::begin_write(state.catalog).await?;
        let warehouse = C::rename_warehouse(warehouse_id, &request.new_name, t.transaction()).await?;
        t.commit().await?;
        Ok(warehouse.into())
    }

    async fn update_storage_credential(
        warehouse_id: WarehouseId,
        request: UpdateWarehouseCredentialRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<GetWarehouseResponse> {
        let state = context.v1_state;

        // ------------------- AUTHZ -------------------
        let warehouse = require_active_warehouse_action::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanUpdateStorageCredential,
        )
        .await?;

        // ------------------- VALIDATIONS -------------------
        let (storage_profile, storage_credential) = warehouse
            .storage_profile
            .clone()
            .validate_credential(request.new_storage_credential)?
            .into_parts();

        // ------------------- BUSINESS LOGIC -------------------
        let new_secret_id = match storage_credential {
            Some(credential) => Some(state.secrets.create_secret(credential).await?),
            None => None,
        };

        let mut t = C::Transaction::begin_write(state.catalog.clone()).await?;
        let updated = C::update_warehouse_storage(
            warehouse_id,
            storage_profile,
            new_secret_id,
            t.transaction(),
        )
        .await;
        let updated = match updated {
            Ok(updated) => updated,
            Err(e) => {
                t.rollback().await?;
                delete_secret_best_effort(&state.secrets, new_secret_id).await;
                return Err(e.into());
            }
        };
        if let Err(e) = t.commit().await {
            delete_secret_best_effort(&state.secrets, new_secret_id).await;
            return Err(e);
        }

        delete_secret_best_effort(&state.secrets, warehouse.storage_secret_id).await;
        tracing::info!(%warehouse_id, "Storage credential of warehouse updated");
        Ok(updated.into())
    }

    async fn update_delete_profile(
        warehouse_id: WarehouseId,
        request: UpdateWarehouseDeleteProfileRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<GetWarehouseResponse> {
        let state = context.v1_state;
        require_active_warehouse_action::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanModifySoftDeletion,
        )
        .await?;
        validate_delete_profile(request.delete_profile)?;

        let mut t = C::Transaction::begin_write(state.catalog).await?;
        let warehouse =
            C::set_warehouse_delete_profile(warehouse_id, request.delete_profile, t.transaction())
                .await?;
        t.commit().await?;
        Ok(warehouse.into())
    }

    async fn restore_warehouse(
        warehouse_id: WarehouseId,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<GetWarehouseResponse> {
        let state = context.v1_state;
        let warehouse = C::get_warehouse(warehouse_id, state.catalog.clone()).await;
        state
            .authz
            .require_warehouse_action(
                &request_metadata,
                warehouse_id,
                warehouse,
                CatalogWarehouseAction::CanRestore,
            )
            .await?;

        let mut t = C::Transaction::begin_write(state.catalog).await?;
        let warehouse = C::restore_warehouse(warehouse_id, Utc::now(), t.transaction()).await?;
        t.commit().await?;

        tracing::info!(%warehouse_id, "Warehouse restored");
        Ok(warehouse.into())
    }

    async fn list_soft_deleted_tabulars(
        warehouse_id: WarehouseId,
        query: PaginationQuery,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<ListDeletedTabularsResponse> {
        let state = context.v1_state;

        // ------------------- AUTHZ -------------------
        let warehouse = require_active_warehouse_action::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanListDeletedTabulars,
        )
        .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let deleted = C::list_tabulars(
            warehouse_id,
            None,
            None,
            TabularListFlags::only_deleted(),
            state.catalog,
        )
        .await?;

        let (tables, views): (Vec<_>, Vec<_>) = deleted
            .into_iter()
            .partition(|t| matches!(t.tabular_id, TabularId::Table(_)));
        let table_checks = tables
            .iter()
            .map(|t| (t, CatalogTableAction::CanIncludeInList))
            .collect::<Vec<_>>();
        let view_checks = views
            .iter()
            .map(|v| (v, CatalogViewAction::CanIncludeInList))
            .collect::<Vec<_>>();
        let tables_allowed = state
            .authz
            .are_allowed_table_actions_vec(&request_metadata, &warehouse, &table_checks)
            .await?
            .into_inner();
        let views_allowed = state
            .authz
            .are_allowed_view_actions_vec(&request_metadata, &warehouse, &view_checks)
            .await?
            .into_inner();

        let visible = tables
            .into_iter()
            .zip(tables_allowed)
            .chain(views.into_iter().zip(views_allowed))
            .filter(|(_, allowed)| *allowed)
            .filter_map(|(info, _)| DeletedTabularResponse::from_info(info))
            .collect::<Vec<_>>();
        let (tabulars, next_page_token) = paginate(visible, |t| t.id.to_string(), &query)?;

        Ok(ListDeletedTabularsResponse {
            tabulars,
            next_page_token,
        })
    }

    async fn undrop_tabulars(
        warehouse_id: WarehouseId,
        request: UndropTabularsRequest,
        context: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let state = context.v1_state;

        // ------------------- AUTHZ -------------------
        let warehouse = require_active_warehouse_action::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        undrop::require_undrop_permissions::<A, C>(
            &warehouse,
            &request,
            &state.authz,
            state.catalog.clone(),
            &request_metadata,
        )
        .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let mut t = C::Transaction::begin_write(state.catalog).await?;
        let restored = C::undrop_tabulars(warehouse_id, &request.targets, Utc::now(), t.transaction())
            .await?;
        t.commit().await?;

        tracing::info!(
            %warehouse_id,
            restored = restored.len(),
            "Tabulars restored"
        );
        Ok(())
    }
}

/// Resolve an active warehouse. Soft-deleted warehouses can only be read,
/// restored or listed.
async fn require_active_warehouse_action<C: CatalogStore, A: Authorizer>(
    authorizer: &A,
    request_metadata: &RequestMetadata,
    warehouse_id: WarehouseId,
    catalog_state: C::State,
    action: CatalogWarehouseAction,
) -> Result<ResolvedWarehouse> {
    let warehouse = C::get_warehouse(warehouse_id, catalog_state)
        .await
        .map(|w| w.filter(ResolvedWarehouse::is_active));
    Ok(authorizer
        .require_warehouse_action(request_metadata, warehouse_id, warehouse, action)
        .await?)
}

fn require_project_id<A: Authorizer, C: CatalogStore, S: SecretStore>(
    project_id: Option<ProjectId>,
    context: &ApiContext<State<A, C, S>>,
) -> Result<ProjectId> {
    project_id
        .or_else(|| context.v1_state.config.default_project_id.clone())
        .ok_or_else(|| {
            ErrorModel::bad_request(
                "No project-id specified and no default project configured",
                "ProjectIdMissing",
                None,
            )
            .into()
        })
}

async fn delete_secret_best_effort<S: SecretStore>(secrets: &S, secret_id: Option<SecretId>) {
    let Some(secret_id) = secret_id else {
        return;
    };
    if let Err(e) = secrets.delete_secret(&secret_id).await {
        tracing::warn!(%secret_id, error = %e.error, "Failed to delete storage secret");
    }
}

fn parse_status_filter(statuses: &str) -> Result<Vec<WarehouseStatus>> {
    statuses
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            WarehouseStatus::from_str(s).map_err(|e| {
                ErrorModel::bad_request(
                    format!("Invalid warehouse status `{s}`"),
                    "InvalidWarehouseStatus",
                    Some(Box::new(e)),
                )
                .into()
            })
        })
        .collect()
}

fn validate_warehouse_name(warehouse_name: &str) -> Result<()> {
    if warehouse_name.is_empty() {
        return Err(ErrorModel::bad_request(
            "Warehouse name cannot be empty",
            "EmptyWarehouseName",
            None,
        )
        .into());
    }

    if warehouse_name.len() > 128 {
        return Err(ErrorModel::bad_request(
            "Warehouse must be shorter than 128 chars",
            "WarehouseNameTooLong",
            None,
        )
        .into());
    }

    if warehouse_name.contains('/') {
        return Err(ErrorModel::bad_request(
            "Warehouse name cannot contain '/'",
            "InvalidWarehouseName",
            None,
        )
        .into());
    }
    Ok(())
}

fn validate_delete_profile(delete_profile: DeleteProfile) -> Result<()> {
    if let DeleteProfile::Soft {
        expiration_seconds: 0,
    } = delete_profile
    {
        return Err(ErrorModel::bad_request(
            "Soft delete profiles need a positive expiration",
            "InvalidDeleteProfile",
            None,
        )
        .into());
    }
    Ok(())
}
