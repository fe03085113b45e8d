use axum::{Router, body::Body};
use http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt as _;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::{SetupTestCatalog, TestWarehouse};
use crate::{
    api::router::{RouterArgs, new_full_router},
    implementations::{MemoryBackend, MemorySecretStore},
    service::{
        authn::IntrospectionAuthenticator,
        authz::AllowAllAuthorizer,
    },
};

async fn router() -> (Router, TestWarehouse) {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let router = new_full_router::<
        MemoryBackend,
        AllowAllAuthorizer,
        MemorySecretStore,
        IntrospectionAuthenticator,
    >(RouterArgs {
        authenticator: None,
        state: ctx,
        metrics_layer: None,
    });
    (router, warehouse)
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_headers(router, method, uri, body, &[]).await
}

async fn send_with_headers(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (router, _) = router().await;
    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_bootstrap_twice_is_no_content() {
    let (router, _) = router().await;
    for _ in 0..2 {
        let (status, _) = send(
            &router,
            Method::POST,
            "/management/v1/bootstrap",
            Some(json!({"accept-terms-of-use": true})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, info) = send(&router, Method::GET, "/management/v1/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["bootstrapped"], json!(true));
    assert_eq!(info["authz-backend"], json!("allow-all"));
}

#[tokio::test]
async fn test_permissions_are_not_implemented_without_relations_backend() {
    let (router, _) = router().await;
    let (status, _) = send(
        &router,
        Method::GET,
        "/management/v1/permissions/warehouse/abc",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_config_resolves_warehouse_prefix() {
    let (router, warehouse) = router().await;
    let uri = format!(
        "/catalog/v1/config?warehouse={}/{}",
        warehouse.project_id, warehouse.warehouse_name
    );
    let (status, config) = send(&router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        config["overrides"]["prefix"],
        json!(warehouse.warehouse_id.to_string())
    );

    let (status, error) = send(
        &router,
        Method::GET,
        &format!("/catalog/v1/config?warehouse={}/missing", warehouse.project_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"]["code"], json!(404));
}

#[tokio::test]
async fn test_namespace_over_http() {
    let (router, warehouse) = router().await;
    let base = format!("/catalog/v1/{}/namespaces", warehouse.prefix());

    let (status, created) = send(
        &router,
        Method::POST,
        &base,
        Some(json!({"namespace": ["web"], "properties": {"owner": "ops"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["namespace"], json!(["web"]));

    let (status, listed) = send(&router, Method::GET, &base, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["namespaces"], json!([["web"]]));

    let (status, _) = send(&router, Method::HEAD, &format!("{base}/web"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, error) = send(&router, Method::GET, &format!("{base}/absent"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"]["code"], json!(404));

    let (status, _) = send(&router, Method::DELETE, &format!("{base}/web"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&router, Method::HEAD, &format!("{base}/web"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_load_table_embeds_credentials_only_when_requested() {
    let (router, warehouse) = router().await;
    let base = format!("/catalog/v1/{}/namespaces", warehouse.prefix());
    let (status, _) = send(&router, Method::POST, &base, Some(json!({"namespace": ["lake"]}))).await;
    assert_eq!(status, StatusCode::OK);

    let tables = format!("{base}/lake/tables");
    let (status, created) = send(
        &router,
        Method::POST,
        &tables,
        Some(json!({
            "name": "events",
            "schema": {
                "type": "struct",
                "fields": [{"id": 1, "name": "id", "required": false, "type": "string"}]
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{created}");
    assert!(created.get("storage-credentials").is_none(), "{created}");

    let (status, loaded) = send(&router, Method::GET, &format!("{tables}/events"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(loaded.get("storage-credentials").is_none(), "{loaded}");

    let (status, loaded) = send_with_headers(
        &router,
        Method::GET,
        &format!("{tables}/events"),
        None,
        &[("x-iceberg-access-delegation", "remote-signing")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(loaded.get("storage-credentials").is_none(), "{loaded}");

    let (status, loaded) = send_with_headers(
        &router,
        Method::GET,
        &format!("{tables}/events"),
        None,
        &[("x-iceberg-access-delegation", "vended-credentials")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let credentials = loaded["storage-credentials"].as_array().unwrap();
    assert_eq!(credentials.len(), 1);
    assert!(
        credentials[0]["prefix"]
            .as_str()
            .unwrap()
            .starts_with("memory://icehouse/"),
        "{loaded}"
    );
}
