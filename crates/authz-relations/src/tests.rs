//! The relations authorizer behind the full HTTP router.
use std::sync::Arc;

use http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt as _;
use icehouse::{
    ServiceConfig,
    api::{
        ApiContext,
        router::{RouterArgs, new_full_router},
    },
    axum::{Router, body::Body},
    implementations::{CatalogState, MemoryBackend, MemorySecretStore},
    service::{
        ServerId, State, UserId,
        authn::{Authenticator, AuthnError, Principal},
        credentials::CredentialVendingEngine,
        storage::StorageFactory,
    },
};
use icehouse_io::memory::InMemoryStorage;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{InMemoryTupleStore, RelationsAuthorizer, RelationsConfig};

/// Treats the bearer token as the user id.
#[derive(Debug, Clone)]
struct TokenIsUserAuthenticator;

#[async_trait::async_trait]
impl Authenticator for TokenIsUserAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthnError> {
        let user_id = UserId::try_new(token).map_err(|_| AuthnError::InvalidToken)?;
        Ok(Principal {
            user_id,
            expires_at: None,
        })
    }
}

fn router() -> Router {
    let catalog = CatalogState::new();
    let secrets = MemorySecretStore::new(catalog.clone());
    let config = Arc::new(ServiceConfig::default());
    let http = reqwest::Client::new();
    let authz = RelationsAuthorizer::new(
        Arc::new(InMemoryTupleStore::new()),
        ServerId::new_random(),
        &RelationsConfig::default(),
    );
    let state = ApiContext {
        v1_state: State {
            authz,
            catalog,
            secrets,
            vending: CredentialVendingEngine::new(http.clone(), config.vending.clone()),
            config,
            storage: StorageFactory::new(http, InMemoryStorage::new()),
        },
    };
    new_full_router::<MemoryBackend, RelationsAuthorizer, MemorySecretStore, TokenIsUserAuthenticator>(
        RouterArgs {
            authenticator: Some(TokenIsUserAuthenticator),
            state,
            metrics_layer: None,
        },
    )
}

async fn send(
    router: &Router,
    user: &str,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {user}"));
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

/// Bootstrap as `alice` and create a project with one warehouse.
async fn setup(router: &Router) -> (String, String) {
    let (status, _) = send(
        router,
        "alice",
        Method::POST,
        "/management/v1/bootstrap",
        Some(json!({"accept-terms-of-use": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, project) = send(
        router,
        "alice",
        Method::POST,
        "/management/v1/project",
        Some(json!({"project-name": "analytics"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{project}");
    let project_id = project["project-id"].as_str().unwrap().to_string();

    let (status, warehouse) = send(
        router,
        "alice",
        Method::POST,
        "/management/v1/warehouse",
        Some(json!({
            "warehouse-name": "lake",
            "project-id": project_id,
            "storage-profile": {"type": "memory", "key-prefix": format!("wh-{}", uuid::Uuid::now_v7())},
            "delete-profile": {"type": "hard"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{warehouse}");
    let warehouse_id = warehouse["warehouse-id"].as_str().unwrap().to_string();
    (project_id, warehouse_id)
}

#[tokio::test]
async fn test_info_reports_relations_backend() {
    let router = router();
    let (status, info) = send(&router, "alice", Method::GET, "/management/v1/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["authz-backend"], json!("relations"));
}

#[tokio::test]
async fn test_only_server_owner_creates_projects() {
    let router = router();
    setup(&router).await;
    let (status, _) = send(
        &router,
        "mallory",
        Method::POST,
        "/management/v1/project",
        Some(json!({"project-name": "sneaky"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_grant_makes_warehouse_visible_but_not_writable() {
    let router = router();
    let (_, warehouse_id) = setup(&router).await;
    let warehouse_uri = format!("/management/v1/warehouse/{warehouse_id}");

    let (status, _) = send(&router, "bob", Method::GET, &warehouse_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        "alice",
        Method::POST,
        &format!("/management/v1/permissions/warehouse/{warehouse_id}/assignments"),
        Some(json!({"writes": [{"subject": {"type": "user", "id": "bob"}, "role": "describe"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, warehouse) = send(&router, "bob", Method::GET, &warehouse_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(warehouse["warehouse-name"], json!("lake"));

    let (status, access) = send(
        &router,
        "bob",
        Method::GET,
        &format!("/management/v1/permissions/warehouse/{warehouse_id}/access"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(access["role"], json!("describe"));

    let (status, _) = send(
        &router,
        "bob",
        Method::POST,
        &format!("/catalog/v1/{warehouse_id}/namespaces"),
        Some(json!({"namespace": ["bobs"]})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &router,
        "bob",
        Method::GET,
        &format!("/management/v1/permissions/warehouse/{warehouse_id}/assignments"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_namespace_creator_owns_namespace() {
    let router = router();
    let (_, warehouse_id) = setup(&router).await;
    let (status, _) = send(
        &router,
        "alice",
        Method::POST,
        &format!("/management/v1/permissions/warehouse/{warehouse_id}/assignments"),
        Some(json!({"writes": [{"subject": {"type": "user", "id": "carol"}, "role": "modify"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &router,
        "carol",
        Method::POST,
        &format!("/catalog/v1/{warehouse_id}/namespaces"),
        Some(json!({"namespace": ["carols"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, namespaces) = send(
        &router,
        "carol",
        Method::GET,
        &format!("/catalog/v1/{warehouse_id}/namespaces"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(namespaces["namespaces"], json!([["carols"]]));

    // alice sees everything below the warehouse she owns.
    let (status, _) = send(
        &router,
        "alice",
        Method::HEAD,
        &format!("/catalog/v1/{warehouse_id}/namespaces/carols"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_server_keeps_an_owner() {
    let router = router();
    setup(&router).await;

    let (status, assignments) = send(
        &router,
        "alice",
        Method::GET,
        "/management/v1/permissions/server/assignments",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        assignments["assignments"],
        json!([{"subject": {"type": "user", "id": "alice"}, "role": "ownership"}])
    );

    let (status, _) = send(
        &router,
        "alice",
        Method::POST,
        "/management/v1/permissions/server/assignments",
        Some(json!({"deletes": [{"subject": {"type": "user", "id": "alice"}, "role": "ownership"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Handing over ownership in the same request is fine.
    let (status, _) = send(
        &router,
        "alice",
        Method::POST,
        "/management/v1/permissions/server/assignments",
        Some(json!({
            "writes": [{"subject": {"type": "user", "id": "erin"}, "role": "ownership"}],
            "deletes": [{"subject": {"type": "user", "id": "alice"}, "role": "ownership"}],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &router,
        "alice",
        Method::GET,
        "/management/v1/permissions/server/assignments",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_check_endpoint() {
    let router = router();
    let (project_id, _) = setup(&router).await;
    let (status, response) = send(
        &router,
        "alice",
        Method::POST,
        "/management/v1/permissions/check",
        Some(json!({
            "object": {"type": "project", "id": project_id},
            "role": "modify",
            "subject": {"type": "user", "id": "bob"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"allowed": false}));

    let (status, response) = send(
        &router,
        "alice",
        Method::POST,
        "/management/v1/permissions/check",
        Some(json!({"object": {"type": "project", "id": project_id}, "role": "ownership"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"allowed": true}));
}
