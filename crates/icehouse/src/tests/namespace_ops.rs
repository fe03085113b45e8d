use icehouse_ext::{
    NamespaceIdent,
    catalog::rest::{ListNamespacesQuery, UpdateNamespacePropertiesRequest},
};
use pretty_assertions::assert_eq;

use super::{SetupTestCatalog, TestContext, create_ns, create_table, ns, random_request_metadata};
use crate::{
    api::iceberg::{
        types::Prefix,
        v1::{NamespaceParameters, namespace::NamespaceService as _},
    },
    server::CatalogServer,
    service::authz::{AllowAllAuthorizer, tests::HidingAuthorizer},
};

async fn list<A: crate::service::authz::Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    parent: Option<&NamespaceIdent>,
) -> Vec<NamespaceIdent> {
    CatalogServer::list_namespaces(
        Some(Prefix(prefix.to_string())),
        ListNamespacesQuery {
            parent: parent.map(NamespaceIdent::to_url_string),
            page_token: None,
            page_size: None,
        },
        ctx,
        random_request_metadata(),
    )
    .await
    .unwrap()
    .namespaces
}

async fn drop_ns<A: crate::service::authz::Authorizer + Clone>(
    ctx: TestContext<A>,
    prefix: &str,
    namespace: NamespaceIdent,
) -> crate::api::Result<()> {
    CatalogServer::drop_namespace(
        NamespaceParameters {
            prefix: Some(Prefix(prefix.to_string())),
            namespace,
        },
        ctx,
        random_request_metadata(),
    )
    .await
}

#[tokio::test]
async fn test_namespace_listed_until_dropped() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();

    let sales = ns(&["sales"]);
    let eu = ns(&["sales", "eu"]);
    create_ns(ctx.clone(), &prefix, sales.clone()).await.unwrap();
    create_ns(ctx.clone(), &prefix, eu.clone()).await.unwrap();

    assert_eq!(list(ctx.clone(), &prefix, None).await, vec![sales.clone()]);
    assert_eq!(list(ctx.clone(), &prefix, Some(&sales)).await, vec![eu.clone()]);

    // Has a child namespace
    let err = drop_ns(ctx.clone(), &prefix, sales.clone()).await.unwrap_err();
    assert_eq!(err.error.code, 409);

    drop_ns(ctx.clone(), &prefix, eu.clone()).await.unwrap();
    assert!(list(ctx.clone(), &prefix, Some(&sales)).await.is_empty());
    drop_ns(ctx.clone(), &prefix, sales).await.unwrap();
    assert!(list(ctx, &prefix, None).await.is_empty());
}

#[tokio::test]
async fn test_drop_namespace_with_table_conflicts() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    let namespace = ns(&["with_table"]);
    create_ns(ctx.clone(), &prefix, namespace.clone()).await.unwrap();
    create_table(ctx.clone(), &prefix, namespace.clone(), "t", &["id"])
        .await
        .unwrap();

    let err = drop_ns(ctx.clone(), &prefix, namespace.clone()).await.unwrap_err();
    assert_eq!(err.error.code, 409);
    assert_eq!(list(ctx, &prefix, None).await, vec![namespace]);
}

#[tokio::test]
async fn test_create_if_not_exists_twice_yields_one_namespace() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    let namespace = ns(&["once"]);

    create_ns(ctx.clone(), &prefix, namespace.clone()).await.unwrap();
    // Clients implement IF NOT EXISTS by ignoring the conflict.
    let err = create_ns(ctx.clone(), &prefix, namespace.clone())
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 409);

    assert_eq!(list(ctx, &prefix, None).await, vec![namespace]);
}

#[tokio::test]
async fn test_create_namespace_requires_parent() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let err = create_ns(ctx, &warehouse.prefix(), ns(&["missing", "child"]))
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 404);
}

#[tokio::test]
async fn test_namespace_gets_location_inside_warehouse() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let created = create_ns(ctx, &warehouse.prefix(), ns(&["located"]))
        .await
        .unwrap();
    let location = &created.properties.unwrap()["location"];
    assert!(location.starts_with("memory://"), "{location}");
}

#[tokio::test]
async fn test_update_namespace_properties_reports_missing() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    let namespace = ns(&["props"]);
    create_ns(ctx.clone(), &prefix, namespace.clone()).await.unwrap();

    let response = CatalogServer::update_namespace_properties(
        NamespaceParameters {
            prefix: Some(Prefix(prefix.clone())),
            namespace: namespace.clone(),
        },
        UpdateNamespacePropertiesRequest {
            removals: Some(vec!["absent".to_string()]),
            updates: Some(maplit::hashmap! {"owner".to_string() => "alice".to_string()}),
        },
        ctx.clone(),
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert_eq!(response.updated, vec!["owner".to_string()]);
    assert!(response.removed.is_empty());
    assert_eq!(response.missing, Some(vec!["absent".to_string()]));

    let loaded = CatalogServer::load_namespace_metadata(
        NamespaceParameters {
            prefix: Some(Prefix(prefix)),
            namespace,
        },
        ctx,
        random_request_metadata(),
    )
    .await
    .unwrap();
    assert_eq!(loaded.properties.unwrap()["owner"], "alice");
}

#[tokio::test]
async fn test_hidden_warehouse_is_not_found() {
    let authz = HidingAuthorizer::new();
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(authz.clone())
        .build()
        .setup()
        .await;
    authz.hide(&format!("warehouse:{}", warehouse.warehouse_id));
    let err = create_ns(ctx, &warehouse.prefix(), ns(&["hidden"]))
        .await
        .unwrap_err();
    assert_eq!(err.error.code, 404);
}

#[tokio::test]
async fn test_blocked_action_is_forbidden() {
    let authz = HidingAuthorizer::new();
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(authz.clone())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    let namespace = ns(&["guarded"]);
    create_ns(ctx.clone(), &prefix, namespace.clone()).await.unwrap();

    authz.block_action("namespace:can_delete");
    let err = drop_ns(ctx, &prefix, namespace).await.unwrap_err();
    assert_eq!(err.error.code, 403);
}
