use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use icehouse_ext::catalog::rest::{CreateTableRequest, LoadTableResult};
use pretty_assertions::assert_eq;

use super::{SetupTestCatalog, TestContext, create_ns, ns, schema_with_fields};
use crate::{
    api::iceberg::{
        types::Prefix,
        v1::{DataAccess, DataAccessMode, NamespaceParameters, tables::TablesService as _},
    },
    config::VendingConfig,
    request_metadata::RequestMetadata,
    server::CatalogServer,
    service::{
        authz::AllowAllAuthorizer,
        credentials::{CredentialVendingEngine, MockAssumeRoleClient, StsCredentials},
        storage::{S3AccessKeyCredential, S3Credential, StorageCredential, StorageProfile},
    },
};

fn s3_profile() -> StorageProfile {
    serde_json::from_value(serde_json::json!({
        "type": "s3",
        "bucket": "tests",
        "key-prefix": "wh",
        "region": "eu-central-1",
        "sts-enabled": true,
        "sts-role-arn": "arn:aws:iam::1:role/vending",
    }))
    .unwrap()
}

fn s3_credential() -> StorageCredential {
    StorageCredential::S3(S3Credential::AccessKey(S3AccessKeyCredential {
        aws_access_key_id: "base-key".to_string(),
        aws_secret_access_key: "base-secret".to_string(),
        external_id: None,
    }))
}

fn vending_engine(mock: MockAssumeRoleClient) -> CredentialVendingEngine {
    CredentialVendingEngine::new(reqwest::Client::new(), VendingConfig::default())
        .with_assume_role_client(Arc::new(mock))
}

fn vended() -> DataAccessMode {
    DataAccessMode::ServerDelegated(DataAccess {
        vended_credentials: true,
        remote_signing: false,
    })
}

fn metadata_with_token_expiry(expires_at: DateTime<Utc>) -> RequestMetadata {
    let mut metadata = RequestMetadata::new_principal("alice");
    metadata.set_token_expiry(Some(expires_at));
    metadata
}

async fn stage_create(
    ctx: TestContext<AllowAllAuthorizer>,
    prefix: &str,
    name: &str,
    metadata: RequestMetadata,
) -> crate::api::Result<LoadTableResult> {
    CatalogServer::create_table(
        NamespaceParameters {
            prefix: Some(Prefix(prefix.to_string())),
            namespace: ns(&["raw"]),
        },
        CreateTableRequest {
            name: name.to_string(),
            location: None,
            schema: schema_with_fields(&["id"]),
            partition_spec: None,
            write_order: None,
            stage_create: Some(true),
            properties: None,
        },
        vended(),
        ctx,
        metadata,
    )
    .await
}

#[tokio::test]
async fn test_vended_s3_credential_is_confined_and_short_lived() {
    let token_expiry = Utc::now() + Duration::hours(2);

    let mut mock = MockAssumeRoleClient::new();
    mock.expect_assume_role()
        .times(1)
        .withf(|_, _, request| {
            request.role_arn.as_deref() == Some("arn:aws:iam::1:role/vending")
                && request
                    .policy
                    .as_deref()
                    .is_some_and(|p| p.contains("arn:aws:s3:::tests/wh/"))
                && (900..=3600).contains(&request.duration_seconds)
        })
        .returning(|_, _, request| {
            Ok(StsCredentials {
                access_key_id: "vended-key".to_string(),
                secret_access_key: "vended-secret".to_string(),
                session_token: "vended-token".to_string(),
                expiration: Utc::now() + Duration::seconds(i64::from(request.duration_seconds)),
            })
        });

    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .storage_profile(s3_profile())
        .storage_credential(Some(s3_credential()))
        .vending(Some(vending_engine(mock)))
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    create_ns(ctx.clone(), &prefix, ns(&["raw"])).await.unwrap();

    let created = stage_create(
        ctx,
        &prefix,
        "clicks",
        metadata_with_token_expiry(token_expiry),
    )
    .await
    .unwrap();

    let credentials = created.storage_credentials.unwrap();
    assert_eq!(credentials.len(), 1);
    let credential = &credentials[0];
    assert!(
        credential.prefix.starts_with("s3://tests/wh/"),
        "{}",
        credential.prefix
    );
    assert!(created.metadata.location.starts_with(&credential.prefix));
    assert_eq!(credential.config["s3.access-key-id"], "vended-key");
    assert_eq!(credential.config["s3.session-token"], "vended-token");

    let expires_at_ms: i64 = credential.config["s3.session-token-expires-at-ms"]
        .parse()
        .unwrap();
    let expires_at = DateTime::from_timestamp_millis(expires_at_ms).unwrap();
    assert!(expires_at <= Utc::now() + Duration::seconds(3600));
    assert!(expires_at < token_expiry);
}

#[tokio::test]
async fn test_vended_credential_never_outlives_the_session() {
    let token_expiry = Utc::now() + Duration::seconds(1200);

    let mut mock = MockAssumeRoleClient::new();
    mock.expect_assume_role()
        .times(1)
        .withf(|_, _, request| request.duration_seconds <= 1200)
        .returning(|_, _, _| {
            // The provider ignores the requested duration.
            Ok(StsCredentials {
                access_key_id: "k".to_string(),
                secret_access_key: "s".to_string(),
                session_token: "t".to_string(),
                expiration: Utc::now() + Duration::hours(12),
            })
        });

    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .storage_profile(s3_profile())
        .storage_credential(Some(s3_credential()))
        .vending(Some(vending_engine(mock)))
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    create_ns(ctx.clone(), &prefix, ns(&["raw"])).await.unwrap();

    let created = stage_create(
        ctx,
        &prefix,
        "capped",
        metadata_with_token_expiry(token_expiry),
    )
    .await
    .unwrap();
    let credential = &created.storage_credentials.unwrap()[0];
    let expires_at_ms: i64 = credential.config["s3.session-token-expires-at-ms"]
        .parse()
        .unwrap();
    assert!(expires_at_ms <= token_expiry.timestamp_millis());
}

#[tokio::test]
async fn test_memory_warehouse_vends_prefix_without_secrets() {
    let (ctx, warehouse) = SetupTestCatalog::builder()
        .authorizer(AllowAllAuthorizer::default())
        .build()
        .setup()
        .await;
    let prefix = warehouse.prefix();
    create_ns(ctx.clone(), &prefix, ns(&["raw"])).await.unwrap();

    let created = stage_create(
        ctx,
        &prefix,
        "local",
        RequestMetadata::new_unauthenticated(),
    )
    .await
    .unwrap();
    let credentials = created.storage_credentials.unwrap();
    assert_eq!(credentials.len(), 1);
    assert!(credentials[0].prefix.starts_with("memory://icehouse/"));
    assert!(credentials[0].config.is_empty());
}
