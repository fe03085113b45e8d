use icehouse_ext::{TableIdent, spec::ViewMetadata};
use icehouse_io::{IcehouseStorage as _, Location, StorageBackend};

use super::{
    CatalogServer,
    io::{next_metadata_location, warehouse_storage, write_metadata_file},
    namespace::authorized_namespace,
    now_ms, require_active_warehouse, require_warehouse_id,
    tabular::{
        determine_tabular_location, drop_mode, finish_drop, validate_rename,
        validate_tabular_name,
    },
};
use crate::{
    WarehouseId,
    api::{
        ApiContext, CommitViewRequest, CreateViewRequest, ErrorModel, ListTablesResponse,
        LoadViewResult, RenameTableRequest, Result,
        iceberg::{
            types::{DropParams, PaginationQuery, Prefix, paginate},
            v1::{NamespaceParameters, ViewParameters, views::ViewService},
        },
    },
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, ResolvedWarehouse, SecretStore, State, TabularListFlags, TabularType,
        Transaction, ViewCommit, ViewCreation, ViewId, ViewInfo,
        authz::{
            AuthZViewOps, Authorizer, CatalogNamespaceAction, CatalogViewAction,
            CatalogWarehouseAction,
        },
    },
};

#[async_trait::async_trait]
impl<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> ViewService<State<A, C, S>>
    for CatalogServer<C, A, S>
{
    async fn list_views(
        parameters: NamespaceParameters,
        query: PaginationQuery,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<ListTablesResponse> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let authorizer = state.v1_state.authz;
        let catalog = state.v1_state.catalog;
        let warehouse = require_active_warehouse::<C, A>(
            &authorizer,
            &request_metadata,
            warehouse_id,
            catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let namespace = authorized_namespace::<C, A>(
            &authorizer,
            &request_metadata,
            &warehouse,
            &parameters.namespace,
            catalog.clone(),
            CatalogNamespaceAction::CanListViews,
        )
        .await?;

        let views = C::list_tabulars(
            warehouse_id,
            Some(namespace.namespace_id),
            Some(TabularType::View),
            TabularListFlags::active(),
            catalog,
        )
        .await?;
        let checks = views
            .iter()
            .map(|v| (v, CatalogViewAction::CanIncludeInList))
            .collect::<Vec<_>>();
        let masks = authorizer
            .are_allowed_view_actions_vec(&request_metadata, &warehouse, &checks)
            .await?
            .into_inner();
        let visible = views
            .into_iter()
            .zip(masks)
            .filter_map(|(v, allowed)| allowed.then_some(v.tabular_ident))
            .collect::<Vec<_>>();

        let (identifiers, next_page_token) = paginate(visible, |v| v.name.clone(), &query)?;
        Ok(ListTablesResponse {
            next_page_token,
            identifiers,
        })
    }

    async fn create_view(
        parameters: NamespaceParameters,
        request: CreateViewRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadViewResult> {
        // ------------------- VALIDATIONS -------------------
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let CreateViewRequest {
            name,
            location,
            schema,
            view_version,
            properties,
        } = request;
        validate_tabular_name(&name)?;
        let view_ident = TableIdent::new(parameters.namespace.clone(), name);

        // ------------------- AUTHZ -------------------
        let state = state.v1_state;
        let warehouse = require_active_warehouse::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let namespace = authorized_namespace::<C, A>(
            &state.authz,
            &request_metadata,
            &warehouse,
            &parameters.namespace,
            state.catalog.clone(),
            CatalogNamespaceAction::CanCreateView,
        )
        .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let view_id = ViewId::new_random();
        let view_location = determine_tabular_location(
            &warehouse.storage_profile,
            location.as_deref(),
            &namespace,
            view_id.into(),
        )?;
        let mut metadata = ViewMetadata::new_view(
            &schema,
            &view_version,
            view_location.clone(),
            properties,
            now_ms(),
        )?;
        metadata.view_uuid = *view_id;

        let storage = warehouse_storage(&state.storage, &state.secrets, &warehouse).await?;
        let metadata_location = next_metadata_location(&view_location, None)?;
        write_metadata_file(&storage, &metadata_location, &metadata).await?;

        let creation = ViewCreation {
            warehouse_id,
            namespace_id: namespace.namespace_id,
            view_id,
            view_ident: view_ident.clone(),
            metadata,
            metadata_location: metadata_location.to_string(),
        };
        let mut t = C::Transaction::begin_write(state.catalog.clone()).await?;
        let created = match C::create_view(creation, t.transaction()).await {
            Ok(created) => created,
            Err(e) => {
                t.rollback().await?;
                discard_metadata_file(&storage, &metadata_location).await;
                return Err(e.into());
            }
        };
        t.commit().await?;

        state
            .authz
            .create_view(
                &request_metadata,
                warehouse_id,
                view_id,
                namespace.namespace_id,
            )
            .await?;
        tracing::info!(%warehouse_id, %view_id, view = %view_ident, "Created view");

        Ok(load_view_result(&warehouse, created))
    }

    async fn load_view(
        parameters: ViewParameters,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadViewResult> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        let (warehouse, view) = authorized_view::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.view,
            state.catalog,
            CatalogViewAction::CanGetMetadata,
        )
        .await?;
        Ok(load_view_result(&warehouse, view))
    }

    async fn commit_view(
        parameters: ViewParameters,
        request: CommitViewRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadViewResult> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let CommitViewRequest {
            identifier,
            requirements,
            updates,
        } = request;
        if let Some(identifier) = identifier.filter(|i| i != &parameters.view) {
            return Err(ErrorModel::bad_request(
                format!(
                    "Identifier `{identifier}` in the body does not match the view `{}` of the path",
                    parameters.view
                ),
                "ViewIdentifierMismatch",
                None,
            )
            .into());
        }

        let state = state.v1_state;
        let (warehouse, view) = authorized_view::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.view,
            state.catalog.clone(),
            CatalogViewAction::CanCommit,
        )
        .await?;

        for requirement in &requirements {
            requirement.check(&view.metadata)?;
        }
        let mut new_metadata = view.metadata.clone();
        new_metadata.apply_updates(&updates, now_ms())?;
        if new_metadata.location != view.metadata.location {
            warehouse
                .storage_profile
                .require_location_within(&new_metadata.location)?;
        }
        if new_metadata == view.metadata {
            tracing::debug!(%warehouse_id, view_id = %view.view_id, "View commit changes nothing");
            return Ok(load_view_result(&warehouse, view));
        }

        let new_metadata_location =
            next_metadata_location(&view.tabular.location, Some(view.metadata_location()))?;
        let storage = warehouse_storage(&state.storage, &state.secrets, &warehouse).await?;
        write_metadata_file(&storage, &new_metadata_location, &new_metadata).await?;

        let commit = ViewCommit {
            view_id: view.view_id,
            previous_metadata_location: view.metadata_location().to_string(),
            new_metadata,
            new_metadata_location: new_metadata_location.to_string(),
        };
        let mut t = C::Transaction::begin_write(state.catalog).await?;
        let committed = match C::commit_view(warehouse_id, commit, t.transaction()).await {
            Ok(committed) => committed,
            Err(e) => {
                t.rollback().await?;
                discard_metadata_file(&storage, &new_metadata_location).await;
                return Err(e.into());
            }
        };
        t.commit().await?;
        tracing::debug!(%warehouse_id, view_id = %committed.view_id, "Committed view");

        Ok(load_view_result(&warehouse, committed))
    }

    async fn drop_view(
        parameters: ViewParameters,
        drop_params: DropParams,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        let (warehouse, view) = authorized_view::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.view,
            state.catalog.clone(),
            CatalogViewAction::CanDrop,
        )
        .await?;

        let mode = drop_mode(warehouse.delete_profile, drop_params.purge_requested);
        let mut t = C::Transaction::begin_write(state.catalog.clone()).await?;
        let dropped =
            C::drop_tabular(warehouse_id, view.view_id.into(), mode, t.transaction()).await?;
        t.commit().await?;
        tracing::info!(
            %warehouse_id,
            view_id = %view.view_id,
            purged = dropped.purged,
            "Dropped view"
        );

        finish_drop(
            &state.authz,
            &state.storage,
            &state.secrets,
            &warehouse,
            &dropped,
            drop_params.purge_requested,
        )
        .await
    }

    async fn view_exists(
        parameters: ViewParameters,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        authorized_view::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.view,
            state.catalog,
            CatalogViewAction::CanGetMetadata,
        )
        .await
        .map(|_| ())
    }

    async fn rename_view(
        prefix: Option<Prefix>,
        request: RenameTableRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let warehouse_id = require_warehouse_id(prefix.as_ref())?;
        let RenameTableRequest {
            source,
            destination,
        } = request;
        validate_rename(&source, &destination)?;

        let state = state.v1_state;
        let (warehouse, view) = authorized_view::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &source,
            state.catalog.clone(),
            CatalogViewAction::CanRename,
        )
        .await?;
        let new_parent = if destination.namespace == source.namespace {
            None
        } else {
            Some(
                authorized_namespace::<C, A>(
                    &state.authz,
                    &request_metadata,
                    &warehouse,
                    &destination.namespace,
                    state.catalog.clone(),
                    CatalogNamespaceAction::CanCreateView,
                )
                .await?,
            )
        };

        let mut t = C::Transaction::begin_write(state.catalog).await?;
        C::rename_tabular(
            warehouse_id,
            view.view_id.into(),
            &destination,
            t.transaction(),
        )
        .await?;
        t.commit().await?;
        if let Some(namespace) = new_parent {
            state
                .authz
                .move_tabular(warehouse_id, view.view_id.into(), namespace.namespace_id)
                .await?;
        }
        tracing::info!(
            %warehouse_id,
            view_id = %view.view_id,
            %source,
            %destination,
            "Renamed view"
        );
        Ok(())
    }
}

async fn authorized_view<C: CatalogStore, A: Authorizer>(
    authorizer: &A,
    metadata: &RequestMetadata,
    warehouse_id: WarehouseId,
    view: &TableIdent,
    catalog_state: C::State,
    action: CatalogViewAction,
) -> Result<(ResolvedWarehouse, ViewInfo)> {
    let warehouse = require_active_warehouse::<C, A>(
        authorizer,
        metadata,
        warehouse_id,
        catalog_state.clone(),
        CatalogWarehouseAction::CanUse,
    )
    .await?;
    let info = C::get_view(warehouse_id, view, catalog_state).await;
    let info = authorizer
        .require_view_action(metadata, &warehouse, view, info, action)
        .await?;
    Ok((warehouse, info))
}

fn load_view_result(warehouse: &ResolvedWarehouse, view: ViewInfo) -> LoadViewResult {
    LoadViewResult {
        metadata_location: view.metadata_location().to_string(),
        metadata: view.metadata,
        config: warehouse.storage_profile.table_config(),
    }
}

async fn discard_metadata_file(storage: &StorageBackend, location: &Location) {
    if let Err(e) = storage.delete(location).await {
        tracing::warn!(%location, error = %e, "Failed to remove unused metadata file");
    }
}
