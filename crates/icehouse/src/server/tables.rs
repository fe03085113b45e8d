use std::collections::HashSet;

use icehouse_ext::{
    TableIdent,
    catalog::rest::{LoadCredentialsResponse, create_etag},
    spec::TableMetadata,
};
use icehouse_io::{IcehouseStorage as _, Location};

use super::{
    CatalogServer,
    access::storage_access,
    io::{next_metadata_location, warehouse_storage, write_metadata_file},
    namespace::authorized_namespace,
    now_ms, require_active_warehouse, require_warehouse_id,
    tabular::{
        determine_tabular_location, drop_mode, finish_drop, validate_rename,
        validate_tabular_name,
    },
};
use crate::{
    api::{
        ApiContext, CommitTableRequest, CommitTableResponse, CommitTransactionRequest,
        CreateTableRequest, ErrorModel, ListTablesResponse, LoadTableResult, RenameTableRequest,
        ReplaceTableRequest, Result,
        iceberg::{
            types::{DropParams, PaginationQuery, Prefix, paginate},
            v1::{
                DataAccess, DataAccessMode, NamespaceParameters, TableParameters,
                tables::{LoadTableResultOrNotModified, TablesService},
            },
        },
    },
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, ResolvedWarehouse, SecretStore, State, TableCommit, TableCreation,
        TableId, TableInfo, TabularListFlags, TabularType, Transaction,
        authz::{
            AuthZTableOps, Authorizer, CatalogNamespaceAction, CatalogTableAction,
            CatalogWarehouseAction,
        },
        credentials::AccessLevel,
    },
};

#[async_trait::async_trait]
impl<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> TablesService<State<A, C, S>>
    for CatalogServer<C, A, S>
{
    async fn list_tables(
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
            CatalogNamespaceAction::CanListTables,
        )
        .await?;

        let tables = C::list_tabulars(
            warehouse_id,
            Some(namespace.namespace_id),
            Some(TabularType::Table),
            TabularListFlags::active(),
            catalog,
        )
        .await?;
        let checks = tables
            .iter()
            .map(|t| (t, CatalogTableAction::CanIncludeInList))
            .collect::<Vec<_>>();
        let masks = authorizer
            .are_allowed_table_actions_vec(&request_metadata, &warehouse, &checks)
            .await?
            .into_inner();
        let visible = tables
            .into_iter()
            .zip(masks)
            .filter_map(|(t, allowed)| allowed.then_some(t.tabular_ident))
            .collect::<Vec<_>>();

        let (identifiers, next_page_token) = paginate(visible, |t| t.name.clone(), &query)?;
        Ok(ListTablesResponse {
            next_page_token,
            identifiers,
        })
    }

    async fn create_table(
        parameters: NamespaceParameters,
        request: CreateTableRequest,
        data_access: DataAccessMode,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadTableResult> {
        // ------------------- VALIDATIONS -------------------
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let CreateTableRequest {
            name,
            location,
            schema,
            partition_spec,
            write_order,
            stage_create,
            properties,
        } = request;
        validate_tabular_name(&name)?;
        let table_ident = TableIdent::new(parameters.namespace.clone(), name);
        let staged = stage_create.unwrap_or(false);

        // ------------------- AUTHZ -------------------
        let state = state.v1_state;
        let authorizer = &state.authz;
        let warehouse = require_active_warehouse::<C, A>(
            authorizer,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let namespace = authorized_namespace::<C, A>(
            authorizer,
            &request_metadata,
            &warehouse,
            &parameters.namespace,
            state.catalog.clone(),
            CatalogNamespaceAction::CanCreateTable,
        )
        .await?;

        // ------------------- BUSINESS LOGIC -------------------
        let table_id = TableId::new_random();
        let table_location = determine_tabular_location(
            &warehouse.storage_profile,
            location.as_deref(),
            &namespace,
            table_id.into(),
        )?;
        let mut metadata = TableMetadata::new_table(
            &schema,
            partition_spec.as_ref(),
            write_order.as_ref(),
            table_location.clone(),
            properties.unwrap_or_default(),
            now_ms(),
        )?;
        metadata.table_uuid = *table_id;

        let written = if staged {
            None
        } else {
            let storage = warehouse_storage(&state.storage, &state.secrets, &warehouse).await?;
            let metadata_location = next_metadata_location(&table_location, None)?;
            write_metadata_file(&storage, &metadata_location, &metadata).await?;
            Some((storage, metadata_location))
        };

        let creation = TableCreation {
            warehouse_id,
            namespace_id: namespace.namespace_id,
            table_id,
            table_ident: table_ident.clone(),
            metadata,
            metadata_location: written.as_ref().map(|(_, l)| l.to_string()),
        };
        let mut t = C::Transaction::begin_write(state.catalog.clone()).await?;
        let created = match C::create_table(creation, t.transaction()).await {
            Ok(created) => created,
            Err(e) => {
                t.rollback().await?;
                if let Some((storage, metadata_location)) = &written {
                    discard_metadata_file(storage, metadata_location).await;
                }
                return Err(e.into());
            }
        };
        t.commit().await?;

        authorizer
            .create_table(
                &request_metadata,
                warehouse_id,
                table_id,
                namespace.namespace_id,
            )
            .await?;
        tracing::info!(
            %warehouse_id,
            %table_id,
            table = %table_ident,
            staged,
            "Created table"
        );

        let access = storage_access(
            &state.vending,
            &state.secrets,
            &request_metadata,
            &warehouse,
            table_id.into(),
            &created.tabular.location,
            AccessLevel::ReadWrite,
            data_access,
        )
        .await?;
        Ok(LoadTableResult {
            metadata_location: created.tabular.metadata_location,
            metadata: created.metadata,
            config: access.config,
            storage_credentials: access.credentials,
        })
    }

    async fn load_table(
        parameters: TableParameters,
        data_access: DataAccessMode,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
        if_none_match: Vec<String>,
    ) -> Result<LoadTableResultOrNotModified> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        let (warehouse, table) = authorized_table::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.table,
            state.catalog.clone(),
            &[CatalogTableAction::CanGetMetadata],
        )
        .await?;

        if let Some(etag) = table.metadata_location().map(create_etag) {
            if etag.matches_any(&if_none_match) {
                return Ok(LoadTableResultOrNotModified::NotModifiedResponse(etag));
            }
        }

        let access_level = access_level(&state.authz, &request_metadata, &warehouse, &table).await?;
        let access = storage_access(
            &state.vending,
            &state.secrets,
            &request_metadata,
            &warehouse,
            table.table_id.into(),
            &table.tabular.location,
            access_level,
            data_access,
        )
        .await?;
        Ok(LoadTableResultOrNotModified::LoadTableResult(
            LoadTableResult {
                metadata_location: table.tabular.metadata_location,
                metadata: table.metadata,
                config: access.config,
                storage_credentials: access.credentials,
            },
        ))
    }

    async fn load_table_credentials(
        parameters: TableParameters,
        data_access: DataAccess,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadCredentialsResponse> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        let (warehouse, table) = authorized_table::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.table,
            state.catalog.clone(),
            &[CatalogTableAction::CanReadData],
        )
        .await?;

        let access_level = access_level(&state.authz, &request_metadata, &warehouse, &table).await?;
        let access = storage_access(
            &state.vending,
            &state.secrets,
            &request_metadata,
            &warehouse,
            table.table_id.into(),
            &table.tabular.location,
            access_level,
            DataAccessMode::ServerDelegated(DataAccess {
                vended_credentials: true,
                remote_signing: data_access.remote_signing,
            }),
        )
        .await?;
        Ok(LoadCredentialsResponse {
            storage_credentials: access.credentials.unwrap_or_default(),
        })
    }

    async fn commit_table(
        parameters: TableParameters,
        request: CommitTableRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<CommitTableResponse> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        if let Some(identifier) = &request.identifier {
            if identifier != &parameters.table {
                return Err(ErrorModel::bad_request(
                    format!(
                        "Identifier `{identifier}` in the body does not match the table `{}` of the path",
                        parameters.table
                    ),
                    "TableIdentifierMismatch",
                    None,
                )
                .into());
            }
        }
        let mut responses = commit_tables::<C, A, S>(
            warehouse_id,
            vec![(parameters.table, request)],
            state.v1_state,
            &request_metadata,
        )
        .await?;
        responses.pop().ok_or_else(|| {
            ErrorModel::internal(
                "Commit returned no table",
                "CommitResultMissing",
                None,
            )
            .into()
        })
    }

    async fn replace_table(
        parameters: TableParameters,
        request: ReplaceTableRequest,
        data_access: DataAccessMode,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadTableResult> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        let (warehouse, table) = authorized_table::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.table,
            state.catalog.clone(),
            &[CatalogTableAction::CanCommit],
        )
        .await?;

        let ReplaceTableRequest {
            schema,
            partition_spec,
            write_order,
            properties,
        } = request;
        let mut new_metadata = table.metadata.replace_definition(
            &schema,
            partition_spec.as_ref(),
            write_order.as_ref(),
            properties.unwrap_or_default(),
            now_ms(),
        )?;
        if let Some(previous) = table.metadata_location() {
            new_metadata.push_metadata_log(previous, table.metadata.last_updated_ms);
        }
        let new_metadata_location =
            next_metadata_location(&table.tabular.location, table.metadata_location())?;
        let storage = warehouse_storage(&state.storage, &state.secrets, &warehouse).await?;
        write_metadata_file(&storage, &new_metadata_location, &new_metadata).await?;

        let commit = TableCommit {
            table_id: table.table_id,
            previous_metadata_location: table.tabular.metadata_location.clone(),
            new_metadata,
            new_metadata_location: new_metadata_location.to_string(),
        };
        let mut t = C::Transaction::begin_write(state.catalog.clone()).await?;
        let committed = match C::commit_tables(warehouse_id, vec![commit], t.transaction()).await {
            Ok(committed) => committed,
            Err(e) => {
                t.rollback().await?;
                discard_metadata_file(&storage, &new_metadata_location).await;
                return Err(e.into());
            }
        };
        t.commit().await?;
        let replaced = committed.into_iter().next().ok_or_else(|| {
            ErrorModel::internal("Commit returned no table", "CommitResultMissing", None)
        })?;
        tracing::info!(%warehouse_id, table_id = %replaced.table_id, "Replaced table definition");

        let access = storage_access(
            &state.vending,
            &state.secrets,
            &request_metadata,
            &warehouse,
            replaced.table_id.into(),
            &replaced.tabular.location,
            AccessLevel::ReadWrite,
            data_access,
        )
        .await?;
        Ok(LoadTableResult {
            metadata_location: replaced.tabular.metadata_location,
            metadata: replaced.metadata,
            config: access.config,
            storage_credentials: access.credentials,
        })
    }

    async fn drop_table(
        parameters: TableParameters,
        drop_params: DropParams,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        let warehouse = require_active_warehouse::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let table = C::get_table(warehouse_id, &parameters.table, true, state.catalog.clone())
            .await;
        let table = state
            .authz
            .require_table_action(
                &request_metadata,
                &warehouse,
                &parameters.table,
                table,
                CatalogTableAction::CanDrop,
            )
            .await?;

        let mode = drop_mode(warehouse.delete_profile, drop_params.purge_requested);
        let mut t = C::Transaction::begin_write(state.catalog.clone()).await?;
        let dropped =
            C::drop_tabular(warehouse_id, table.table_id.into(), mode, t.transaction()).await?;
        t.commit().await?;
        tracing::info!(
            %warehouse_id,
            table_id = %table.table_id,
            purged = dropped.purged,
            "Dropped table"
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

    async fn table_exists(
        parameters: TableParameters,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let warehouse_id = require_warehouse_id(parameters.prefix.as_ref())?;
        let state = state.v1_state;
        authorized_table::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &parameters.table,
            state.catalog,
            &[CatalogTableAction::CanGetMetadata],
        )
        .await
        .map(|_| ())
    }

    async fn rename_table(
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
        let (warehouse, table) = authorized_table::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            &source,
            state.catalog.clone(),
            &[CatalogTableAction::CanRename],
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
                    CatalogNamespaceAction::CanCreateTable,
                )
                .await?,
            )
        };

        let mut t = C::Transaction::begin_write(state.catalog).await?;
        C::rename_tabular(
            warehouse_id,
            table.table_id.into(),
            &destination,
            t.transaction(),
        )
        .await?;
        t.commit().await?;
        if let Some(namespace) = new_parent {
            state
                .authz
                .move_tabular(warehouse_id, table.table_id.into(), namespace.namespace_id)
                .await?;
        }
        tracing::info!(
            %warehouse_id,
            table_id = %table.table_id,
            %source,
            %destination,
            "Renamed table"
        );
        Ok(())
    }

    async fn commit_transaction(
        prefix: Option<Prefix>,
        request: CommitTransactionRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<()> {
        let warehouse_id = require_warehouse_id(prefix.as_ref())?;
        let changes = request
            .table_changes
            .into_iter()
            .map(|change| match change.identifier.clone() {
                Some(identifier) => Ok((identifier, change)),
                None => Err(ErrorModel::bad_request(
                    "Every change of a transaction must name its table",
                    "TableIdentifierRequired",
                    None,
                )),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        commit_tables::<C, A, S>(warehouse_id, changes, state.v1_state, &request_metadata)
            .await
            .map(|_| ())
    }
}

/// Resolve an active warehouse and a live table in it, and check `actions` on the table.
/// Staged tables are not visible.
async fn authorized_table<C: CatalogStore, A: Authorizer>(
    authorizer: &A,
    metadata: &RequestMetadata,
    warehouse_id: crate::WarehouseId,
    table: &TableIdent,
    catalog_state: C::State,
    actions: &[CatalogTableAction],
) -> Result<(ResolvedWarehouse, TableInfo)> {
    let warehouse = require_active_warehouse::<C, A>(
        authorizer,
        metadata,
        warehouse_id,
        catalog_state.clone(),
        CatalogWarehouseAction::CanUse,
    )
    .await?;
    let info = C::get_table(warehouse_id, table, false, catalog_state).await;
    let info = authorizer
        .require_table_actions(metadata, &warehouse, table, info, actions)
        .await?;
    Ok((warehouse, info))
}

/// Read-write access for callers allowed to write data, read-only otherwise.
async fn access_level<A: Authorizer>(
    authorizer: &A,
    metadata: &RequestMetadata,
    warehouse: &ResolvedWarehouse,
    table: &TableInfo,
) -> Result<AccessLevel> {
    let can_write = authorizer
        .is_allowed_table_action(
            metadata,
            warehouse,
            &table.tabular,
            CatalogTableAction::CanWriteData,
        )
        .await?
        .into_inner();
    Ok(if can_write {
        AccessLevel::ReadWrite
    } else {
        AccessLevel::Read
    })
}

async fn discard_metadata_file(storage: &icehouse_io::StorageBackend, location: &Location) {
    if let Err(e) = storage.delete(location).await {
        tracing::warn!(%location, error = %e, "Failed to remove unused metadata file");
    }
}

/// Check requirements, apply updates and swap the metadata pointers of all tables at
/// once. Metadata files are written before the store transaction starts, so a lost race
/// surfaces as a commit conflict.
async fn commit_tables<C: CatalogStore, A: Authorizer + Clone, S: SecretStore>(
    warehouse_id: crate::WarehouseId,
    changes: Vec<(TableIdent, CommitTableRequest)>,
    state: State<A, C, S>,
    request_metadata: &RequestMetadata,
) -> Result<Vec<CommitTableResponse>> {
    let mut seen = HashSet::new();
    if let Some((duplicate, _)) = changes.iter().find(|(ident, _)| !seen.insert(ident.clone())) {
        return Err(ErrorModel::bad_request(
            format!("Table `{duplicate}` is changed more than once in the same commit"),
            "DuplicateTableInCommit",
            None,
        )
        .into());
    }

    let warehouse = require_active_warehouse::<C, A>(
        &state.authz,
        request_metadata,
        warehouse_id,
        state.catalog.clone(),
        CatalogWarehouseAction::CanUse,
    )
    .await?;

    let now = now_ms();
    let mut commits = Vec::with_capacity(changes.len());
    let mut locations = Vec::with_capacity(changes.len());
    for (ident, change) in changes {
        let table = C::get_table(warehouse_id, &ident, true, state.catalog.clone()).await;
        let table = state
            .authz
            .require_table_action(
                request_metadata,
                &warehouse,
                &ident,
                table,
                CatalogTableAction::CanCommit,
            )
            .await?;

        let current = (!table.tabular.is_staged()).then_some(&table.metadata);
        for requirement in &change.requirements {
            requirement.check(current)?;
        }
        let mut new_metadata = table.metadata.clone();
        new_metadata.apply_updates(&change.updates, now)?;
        if new_metadata.location != table.metadata.location {
            warehouse
                .storage_profile
                .require_location_within(&new_metadata.location)?;
        }
        if let Some(previous) = table.metadata_location() {
            new_metadata.push_metadata_log(previous, table.metadata.last_updated_ms);
        }
        let new_metadata_location =
            next_metadata_location(&table.tabular.location, table.metadata_location())?;
        commits.push(TableCommit {
            table_id: table.table_id,
            previous_metadata_location: table.tabular.metadata_location.clone(),
            new_metadata,
            new_metadata_location: new_metadata_location.to_string(),
        });
        locations.push(new_metadata_location);
    }

    let storage = warehouse_storage(&state.storage, &state.secrets, &warehouse).await?;
    for (commit, location) in commits.iter().zip(&locations) {
        write_metadata_file(&storage, location, &commit.new_metadata).await?;
    }

    let mut t = C::Transaction::begin_write(state.catalog).await?;
    let committed = match C::commit_tables(warehouse_id, commits, t.transaction()).await {
        Ok(committed) => committed,
        Err(e) => {
            t.rollback().await?;
            for location in &locations {
                discard_metadata_file(&storage, location).await;
            }
            return Err(e.into());
        }
    };
    t.commit().await?;

    Ok(committed
        .into_iter()
        .map(|table| {
            tracing::debug!(%warehouse_id, table_id = %table.table_id, "Committed table");
            CommitTableResponse {
                metadata_location: table.tabular.metadata_location.unwrap_or_default(),
                metadata: table.metadata,
            }
        })
        .collect())
}
