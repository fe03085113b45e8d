use icehouse_ext::{
    TableIdent,
    catalog::rest::{CommitViewRequest, LoadViewResult, RenameTableRequest},
    spec::{LAST_ADDED, ViewRequirement, ViewUpdate, ViewVersion},
};
use pretty_assertions::assert_eq;

use super::{
    SetupTestCatalog, TestContext, create_ns, create_view, load_view, ns,
    random_request_metadata, schema_with_fields, sql_version, view_params,
};
use crate::{
    api::iceberg::{
        types::{DropParams, Prefix},
        v1::views::ViewService as _,
    },
    server::CatalogServer,
    service::authz::AllowAllAuthorizer,
};

/// The commit an engine sends for `CREATE OR REPLACE VIEW ... AS <sql>`.
fn create_or_replace(current: &LoadViewResult, sql: &str) -> CommitViewRequest {
    CommitViewRequest {
        identifier: None,
        requirements: vec![ViewRequirement::AssertViewUuid {
            uuid: current.metadata.view_uuid,
        }],
        updates: vec![
            ViewUpdate::AddSchema {
                schema: schema_with_fields(&["id"]),
                last_column_id: Some(1),
            },
            ViewUpdate::AddViewVersion {
                view_version: ViewVersion {
                    schema_id: LAST_ADDED,
                    timestamp_ms: 0,
                    ..sql_version(sql)
                },
            },
            ViewUpdate::SetCurrentViewVersion {
                view_version_id: LAST_ADDED,
            },
        ],
    }
}

async fn replace(
    ctx: TestContext<AllowAllAuthorizer>,
    prefix: &str,
    view: TableIdent,
    sql: &str,
) -> LoadViewResult {
    let current = load_view(ctx.clone(), prefix, view.clone()).await.unwrap();
    CatalogServer::commit_view(
        view_params(prefix, view),
        create_or_replace(&current, sql),
        ctx,
        random_request_metadata(),
    )
    .await
    .unwrap()
}

async fn setup() -> (TestContext<AllowAllAuthorizer>, String) {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    create_ns(ctx.clone(), &prefix, ns(&["reports"])).await.unwrap();
    (ctx, prefix)
}

#[tokio::test]
async fn test_identical_create_or_replace_keeps_version_count() {
    let (ctx, prefix) = setup().await;
    let view = TableIdent::new(ns(&["reports"]), "daily");
    let created = create_view(ctx.clone(), &prefix, ns(&["reports"]), "daily", "SELECT 1")
        .await
        .unwrap();
    assert_eq!(created.metadata.versions.len(), 1);

    let first = replace(ctx.clone(), &prefix, view.clone(), "SELECT 2").await;
    assert_eq!(first.metadata.versions.len(), 2);
    assert_eq!(first.metadata.current_version_id, 2);

    let second = replace(ctx.clone(), &prefix, view.clone(), "SELECT 2").await;
    assert_eq!(second.metadata.versions.len(), 2);
    assert_eq!(second.metadata.current_version_id, 2);
    assert_eq!(second.metadata_location, first.metadata_location);

    // Going back to an earlier definition reuses its version.
    let back = replace(ctx, &prefix, view, "SELECT 1").await;
    assert_eq!(back.metadata.versions.len(), 2);
    assert_eq!(back.metadata.current_version_id, 1);
}

#[tokio::test]
async fn test_view_names_share_the_tabular_namespace() {
    let (ctx, prefix) = setup().await;
    create_view(ctx.clone(), &prefix, ns(&["reports"]), "shared", "SELECT 1")
        .await
        .unwrap();
    let err = super::create_table(ctx, &prefix, ns(&["reports"]), "shared", &["id"])
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 409);
}

#[tokio::test]
async fn test_rename_view_keeps_uuid() {
    let (ctx, prefix) = setup().await;
    let source = TableIdent::new(ns(&["reports"]), "old_name");
    let destination = TableIdent::new(ns(&["reports"]), "new_name");
    let created = create_view(ctx.clone(), &prefix, ns(&["reports"]), "old_name", "SELECT 1")
        .await
        .unwrap();

    CatalogServer::rename_view(
        Some(Prefix(prefix.clone())),
        RenameTableRequest {
            source: source.clone(),
            destination: destination.clone(),
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();

    let renamed = load_view(ctx.clone(), &prefix, destination).await.unwrap();
    assert_eq!(renamed.metadata.view_uuid, created.metadata.view_uuid);
    let err = load_view(ctx, &prefix, source).await.unwrap_err();
    assert_eq!(err.error.code, 404);
}

#[tokio::test]
async fn test_drop_view() {
    let (ctx, prefix) = setup().await;
    let view = TableIdent::new(ns(&["reports"]), "gone");
    create_view(ctx.clone(), &prefix, ns(&["reports"]), "gone", "SELECT 1")
        .await
        .unwrap();
    CatalogServer::drop_view(
        view_params(&prefix, view.clone()),
        DropParams::default(),
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    let err = CatalogServer::view_exists(view_params(&prefix, view), ctx, random_request_metadata())
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 404);
}

#[tokio::test]
async fn test_view_location_stays_inside_warehouse() {
    let (ctx, prefix) = setup().await;
    let view = TableIdent::new(ns(&["reports"]), "anchored");
    let created = create_view(ctx.clone(), &prefix, ns(&["reports"]), "anchored", "SELECT 1")
        .await
        .unwrap();

    let err = CatalogServer::commit_view(
        view_params(&prefix, view.clone()),
        CommitViewRequest {
            identifier: None,
            requirements: vec![],
            updates: vec![ViewUpdate::SetLocation {
                location: "memory://icehouse/other-warehouse".to_string(),
            }],
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.error.code, 400);
    assert_eq!(err.error.r#type, "LocationOutsideWarehouse");

    let target = format!("{}-relocated", created.metadata.location);
    let moved = CatalogServer::commit_view(
        view_params(&prefix, view.clone()),
        CommitViewRequest {
            identifier: None,
            requirements: vec![],
            updates: vec![ViewUpdate::SetLocation {
                location: target.clone(),
            }],
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert_eq!(moved.metadata.location, target);
    assert_eq!(load_view(ctx, &prefix, view).await.unwrap().metadata.location, target);
}
