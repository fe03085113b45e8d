use chrono::{Duration, Utc};
use icehouse_ext::TableIdent;
use pretty_assertions::assert_eq;

use super::{
    SetupTestCatalog, TestContext, create_ns, create_table, create_view, load_table, ns,
    random_request_metadata, table_params,
};
use crate::{
    api::{
        iceberg::{
            types::{DropParams, PaginationQuery},
            v1::tables::TablesService as _,
        },
        management::v1::{
            ApiServer, DeleteWarehouseQuery,
            project::{CreateProjectRequest, RenameProjectRequest, Service as _},
            server::{BootstrapRequest, Service as _},
            warehouse::{
                ListWarehousesRequest, RenameWarehouseRequest, Service as _,
                UndropTabularsRequest, UpdateWarehouseDeleteProfileRequest,
            },
        },
    },
    implementations::{MemoryBackend, MemorySecretStore},
    server::CatalogServer,
    service::{
        DeleteProfile, TableId, TabularId, TabularType, WarehouseStatus,
        authz::AllowAllAuthorizer, expiration::ExpirationManager,
    },
};

type Expiration = ExpirationManager<MemoryBackend, AllowAllAuthorizer, MemorySecretStore>;

fn expiration(ctx: &TestContext<AllowAllAuthorizer>) -> Expiration {
    let state = &ctx.v1_state;
    ExpirationManager::new(
        state.catalog.clone(),
        state.authz.clone(),
        state.secrets.clone(),
        state.storage.clone(),
    )
}

async fn soft_deleting_setup() -> (TestContext<AllowAllAuthorizer>, super::TestWarehouse) {
    SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .delete_profile(DeleteProfile::Soft {
            expiration_seconds: 2,
        })
        .build()
        .setup()
        .await
}

#[tokio::test]
async fn test_soft_deleted_warehouse_is_purged_after_expiration() {
    let (ctx, warehouse) = soft_deleting_setup().await;
    let prefix = warehouse.prefix();
    create_ns(ctx.clone(), &prefix, ns(&["db"])).await.unwrap();
    create_table(ctx.clone(), &prefix, ns(&["db"]), "t", &["id"])
        .await
        .unwrap();
    assert!(ctx.v1_state.storage.memory().object_count().await > 0);

    // Not empty
    let err = ApiServer::delete_warehouse(
        warehouse.warehouse_id,
        DeleteWarehouseQuery::builder().build(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.error.code, 409);

    ApiServer::delete_warehouse(
        warehouse.warehouse_id,
        DeleteWarehouseQuery::builder().force().build(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();

    let deleted = ApiServer::list_warehouses(
        ListWarehousesRequest {
            warehouse_status: Some("deleted".to_string()),
            project_id: Some(warehouse.project_id.clone()),
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert_eq!(deleted.warehouses.len(), 1);
    let active = ApiServer::list_warehouses(
        ListWarehousesRequest {
            warehouse_status: None,
            project_id: Some(warehouse.project_id.clone()),
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert!(active.warehouses.is_empty());

    let fetched = ApiServer::get_warehouse(warehouse.warehouse_id, ctx.clone(), random_request_metadata())
        .await
        .unwrap();
    assert_eq!(fetched.status, WarehouseStatus::Deleted);
    let deletion = fetched.deletion.unwrap();
    assert_eq!((deletion.expires_at - deletion.deleted_at).num_seconds(), 2);

    // Catalog operations no longer see the warehouse.
    let err = create_ns(ctx.clone(), &prefix, ns(&["late"])).await.unwrap_err();
    assert_eq!(err.error.code, 404);

    let manager = expiration(&ctx);
    let report = manager.sweep_once().await.unwrap();
    assert!(report.purged_warehouses.is_empty());

    let report = manager
        .sweep_at(Utc::now() + Duration::seconds(3))
        .await
        .unwrap();
    assert_eq!(report.purged_warehouses, vec![warehouse.warehouse_id]);
    assert!(report.storage_failures.is_empty());

    let err = ApiServer::get_warehouse(warehouse.warehouse_id, ctx.clone(), random_request_metadata())
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 404);
    assert_eq!(ctx.v1_state.storage.memory().object_count().await, 0);
}

#[tokio::test]
async fn test_hard_deleted_warehouse_is_purged_immediately() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    create_ns(ctx.clone(), &prefix, ns(&["db"])).await.unwrap();
    create_table(ctx.clone(), &prefix, ns(&["db"]), "t", &["id"])
        .await
        .unwrap();
    assert!(ctx.v1_state.storage.memory().object_count().await > 0);

    ApiServer::delete_warehouse(
        warehouse.warehouse_id,
        DeleteWarehouseQuery::builder().force().build(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();

    let err = ApiServer::get_warehouse(warehouse.warehouse_id, ctx.clone(), random_request_metadata())
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 404);
    assert_eq!(ctx.v1_state.storage.memory().object_count().await, 0);

    // Nothing is left for the sweep.
    let report = expiration(&ctx)
        .sweep_at(Utc::now() + Duration::days(1))
        .await
        .unwrap();
    assert!(report.purged_warehouses.is_empty());
}

#[tokio::test]
async fn test_restore_soft_deleted_warehouse() {
    let (ctx, warehouse) = soft_deleting_setup().await;
    let prefix = warehouse.prefix();
    create_ns(ctx.clone(), &prefix, ns(&["kept"])).await.unwrap();

    ApiServer::delete_warehouse(
        warehouse.warehouse_id,
        DeleteWarehouseQuery::builder().force().build(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    let restored =
        ApiServer::restore_warehouse(warehouse.warehouse_id, ctx.clone(), random_request_metadata())
            .await
            .unwrap();
    assert_eq!(restored.status, WarehouseStatus::Active);
    assert!(restored.deletion.is_none());

    // Namespaces survive the round trip.
    let err = create_ns(ctx.clone(), &prefix, ns(&["kept"])).await.unwrap_err();
    assert_eq!(err.error.code, 409);

    let report = expiration(&ctx)
        .sweep_at(Utc::now() + Duration::seconds(3))
        .await
        .unwrap();
    assert!(report.purged_warehouses.is_empty());
}

#[tokio::test]
async fn test_soft_dropped_table_can_be_undropped() {
    let (ctx, warehouse) = soft_deleting_setup().await;
    let prefix = warehouse.prefix();
    let ident = TableIdent::new(ns(&["db"]), "events");
    create_ns(ctx.clone(), &prefix, ns(&["db"])).await.unwrap();
    let created = create_table(ctx.clone(), &prefix, ns(&["db"]), "events", &["id"])
        .await
        .unwrap();
    create_view(ctx.clone(), &prefix, ns(&["db"]), "live", "SELECT 1")
        .await
        .unwrap();

    CatalogServer::drop_table(
        table_params(&prefix, ident.clone()),
        DropParams::default(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    let err = load_table(ctx.clone(), &prefix, ident.clone())
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 404);

    let deleted = ApiServer::list_soft_deleted_tabulars(
        warehouse.warehouse_id,
        PaginationQuery::default(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert_eq!(deleted.tabulars.len(), 1);
    let entry = &deleted.tabulars[0];
    assert_eq!(entry.id, created.metadata.table_uuid);
    assert_eq!(entry.name, "events");
    assert_eq!(entry.namespace, vec!["db".to_string()]);
    assert!(matches!(entry.typ, TabularType::Table));

    ApiServer::undrop_tabulars(
        warehouse.warehouse_id,
        UndropTabularsRequest {
            targets: vec![TabularId::Table(TableId::from(entry.id))],
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();

    let loaded = load_table(ctx.clone(), &prefix, ident).await.unwrap();
    assert_eq!(loaded.metadata.table_uuid, created.metadata.table_uuid);
    let deleted = ApiServer::list_soft_deleted_tabulars(
        warehouse.warehouse_id,
        PaginationQuery::default(),
        ctx,
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert!(deleted.tabulars.is_empty());
}

#[tokio::test]
async fn test_expired_soft_dropped_table_is_purged() {
    let (ctx, warehouse) = soft_deleting_setup().await;
    let prefix = warehouse.prefix();
    let ident = TableIdent::new(ns(&["db"]), "short_lived");
    create_ns(ctx.clone(), &prefix, ns(&["db"])).await.unwrap();
    let created = create_table(ctx.clone(), &prefix, ns(&["db"]), "short_lived", &["id"])
        .await
        .unwrap();
    CatalogServer::drop_table(
        table_params(&prefix, ident),
        DropParams {
            purge_requested: true,
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();

    let report = expiration(&ctx)
        .sweep_at(Utc::now() + Duration::seconds(3))
        .await
        .unwrap();
    assert_eq!(
        report.purged_tabulars,
        vec![TabularId::Table(TableId::from(created.metadata.table_uuid))]
    );
    assert_eq!(ctx.v1_state.storage.memory().object_count().await, 0);

    // The name is free again.
    create_table(ctx, &prefix, ns(&["db"]), "short_lived", &["id"])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_zero_second_soft_profile_is_rejected() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let err = ApiServer::update_delete_profile(
        warehouse.warehouse_id,
        UpdateWarehouseDeleteProfileRequest {
            delete_profile: DeleteProfile::Soft {
                expiration_seconds: 0,
            },
        },
        ctx,
        random_request_metadata(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.error.code, 400);
}

#[tokio::test]
async fn test_rename_warehouse() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let renamed = ApiServer::rename_warehouse(
        warehouse.warehouse_id,
        RenameWarehouseRequest {
            new_name: format!("{}-renamed", warehouse.warehouse_name),
        },
        ctx,
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert_eq!(
        renamed.warehouse_name,
        format!("{}-renamed", warehouse.warehouse_name)
    );
    assert_eq!(renamed.warehouse_id, warehouse.warehouse_id);
}

#[tokio::test]
async fn test_project_lifecycle() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;

    // Bootstrapping twice is a no-op.
    ApiServer::bootstrap(
        ctx.clone(),
        random_request_metadata(),
        BootstrapRequest::builder()
            .accept_terms_of_use()
            .is_operator()
            .build(),
    )
    .await
    .unwrap();
    let info = ApiServer::server_info(ctx.clone(), random_request_metadata())
        .await
        .unwrap();
    assert!(info.bootstrapped);
    assert_eq!(info.authz_backend, "allow-all");

    ApiServer::rename_project(
        warehouse.project_id.clone(),
        RenameProjectRequest {
            new_name: "analytics".to_string(),
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    let project = ApiServer::get_project(
        warehouse.project_id.clone(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert_eq!(project.project_name, "analytics");
    assert!(project.updated_at.is_some());

    // Still holds a warehouse
    let err = ApiServer::delete_project(
        warehouse.project_id.clone(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.error.code, 409);

    let empty = ApiServer::create_project(
        CreateProjectRequest {
            project_name: "empty".to_string(),
            project_id: None,
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap()
    .project_id;
    assert_eq!(
        ApiServer::list_projects(ctx.clone(), random_request_metadata())
            .await
            .unwrap()
            .projects
            .len(),
        2
    );
    ApiServer::delete_project(empty.clone(), ctx.clone(), random_request_metadata())
        .await
        .unwrap();
    let err = ApiServer::get_project(empty, ctx, random_request_metadata())
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 404);
}
