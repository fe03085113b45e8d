use std::{collections::HashMap, str::FromStr, time::SystemTime};

use aws_credential_types::provider::ProvideCredentials;
use aws_sigv4::{
    http_request::{
        PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest, SigningSettings,
        sign,
    },
    sign::v4,
};
use icehouse_ext::catalog::rest::{S3SignRequest, S3SignResponse};
use icehouse_io::{Location, s3::S3Auth};

use super::{CatalogServer, maybe_get_secret, require_active_warehouse, require_warehouse_id};
use crate::{
    api::{
        ApiContext, ErrorModel, Result, iceberg::types::Prefix, iceberg::v1::s3_signer::S3SignService,
    },
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, SecretStore, State, TableId, TabularListFlags,
        authz::{AuthZTableOps, Authorizer, CatalogTableAction, CatalogWarehouseAction},
        storage::{S3Profile, StorageCredential, StorageProfile},
    },
};

const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";
/// Headers a client may carry over from a previous signature.
const STRIPPED_HEADERS: [&str; 3] = ["authorization", "x-amz-date", "x-amz-security-token"];

#[async_trait::async_trait]
impl<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> S3SignService<State<A, C, S>>
    for CatalogServer<C, A, S>
{
    async fn sign(
        prefix: Prefix,
        tabular_id: uuid::Uuid,
        request: S3SignRequest,
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
    ) -> Result<S3SignResponse> {
        let warehouse_id = require_warehouse_id(Some(&prefix))?;
        let state = state.v1_state;

        // ------------------- AUTHZ -------------------
        let warehouse = require_active_warehouse::<C, A>(
            &state.authz,
            &request_metadata,
            warehouse_id,
            state.catalog.clone(),
            CatalogWarehouseAction::CanUse,
        )
        .await?;
        let table_id = TableId::from(tabular_id);
        let table = C::get_table_by_id(
            warehouse_id,
            table_id,
            TabularListFlags {
                include_staged: true,
                ..TabularListFlags::active()
            },
            state.catalog.clone(),
        )
        .await;
        let action = if is_read_method(&request.method) {
            CatalogTableAction::CanReadData
        } else {
            CatalogTableAction::CanWriteData
        };
        let table = state
            .authz
            .require_table_action(&request_metadata, &warehouse, table_id, table, action)
            .await?;

        // ------------------- VALIDATIONS -------------------
        let StorageProfile::S3(profile) = &warehouse.storage_profile else {
            return Err(ErrorModel::bad_request(
                "Remote signing is only available for S3 warehouses",
                "SignerNotSupported",
                None,
            )
            .into());
        };
        let request_location = request_location(profile, &request.uri)?;
        require_within_table(&request_location, &table.tabular.location)?;

        // ------------------- BUSINESS LOGIC -------------------
        let credential = match maybe_get_secret(warehouse.storage_secret_id, &state.secrets).await? {
            Some(StorageCredential::S3(credential)) => Some(S3Auth::from(&credential)),
            Some(_) => {
                return Err(ErrorModel::internal(
                    "Stored credential of the warehouse is not an S3 credential",
                    "CredentialMismatch",
                    None,
                )
                .into());
            }
            None => None,
        };
        let response = sign_request(profile, credential.as_ref(), request).await?;
        tracing::debug!(
            %warehouse_id,
            %table_id,
            location = %request_location,
            "Signed S3 request"
        );
        Ok(response)
    }
}

fn is_read_method(method: &str) -> bool {
    method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("HEAD")
}

/// The `s3://bucket/key` an S3 request URI addresses. Virtual-host style
/// (`https://<bucket>.<endpoint>/<key>`) and path style (`https://<endpoint>/<bucket>/<key>`)
/// are accepted. Requests on the bucket itself (e.g. list) carry the key in the `prefix`
/// query parameter.
fn request_location(profile: &S3Profile, uri: &url::Url) -> Result<Location> {
    let host = uri.host_str().unwrap_or_default();
    let path = uri.path().trim_start_matches('/');
    let key = if host.starts_with(&format!("{}.", profile.bucket)) {
        path.to_string()
    } else if let Some(key) = path
        .strip_prefix(profile.bucket.as_str())
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    {
        key.trim_start_matches('/').to_string()
    } else {
        return Err(ErrorModel::forbidden(
            format!("Request URI `{uri}` does not address bucket `{}`", profile.bucket),
            "SignRequestOutsideBucket",
            None,
        )
        .into());
    };
    let key = if key.is_empty() {
        uri.query_pairs()
            .find(|(k, _)| k == "prefix")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    } else {
        urlencoding::decode(&key)
            .map_err(|e| {
                ErrorModel::bad_request(
                    format!("Request URI `{uri}` is not valid UTF-8"),
                    "InvalidSignRequestUri",
                    Some(Box::new(e)),
                )
            })?
            .into_owned()
    };

    Location::from_str(&format!("s3://{}/{key}", profile.bucket)).map_err(|e| {
        ErrorModel::bad_request(
            format!("Request URI `{uri}` does not map to a storage location"),
            "InvalidSignRequestUri",
            Some(Box::new(e)),
        )
        .into()
    })
}

/// Requests may only touch objects below the table location. `s3a` and `s3n`
/// table locations are compared as `s3`.
fn require_within_table(request_location: &Location, table_location: &str) -> Result<()> {
    let normalized = match table_location.split_once("://") {
        Some(("s3a" | "s3n", rest)) => format!("s3://{rest}"),
        _ => table_location.to_string(),
    };
    let within = Location::from_str(&normalized)
        .is_ok_and(|table_location| request_location.is_sublocation_of(&table_location));
    if within {
        return Ok(());
    }
    Err(ErrorModel::forbidden(
        format!("Request location `{request_location}` is outside of the table location"),
        "SignRequestOutsideTable",
        None,
    )
    .into())
}

async fn sign_request(
    profile: &S3Profile,
    credential: Option<&S3Auth>,
    request: S3SignRequest,
) -> Result<S3SignResponse> {
    let sdk_config = profile.s3_settings().get_sdk_config(credential).await;
    let provider = sdk_config.credentials_provider().ok_or_else(|| {
        ErrorModel::internal(
            "No AWS credentials available for signing",
            "MissingSigningCredentials",
            None,
        )
    })?;
    let credentials = provider.provide_credentials().await.map_err(|e| {
        ErrorModel::internal(
            "Failed to resolve AWS credentials for signing",
            "SigningCredentialsUnavailable",
            Some(Box::new(e)),
        )
    })?;
    let identity = credentials.into();

    let mut settings = SigningSettings::default();
    settings.percent_encoding_mode = PercentEncodingMode::Single;
    settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
    let params: aws_sigv4::http_request::SigningParams<'_> = v4::SigningParams::builder()
        .identity(&identity)
        .region(&profile.region)
        .name("s3")
        .time(SystemTime::now())
        .settings(settings)
        .build()
        .map_err(|e| signing_error(Box::new(e)))?
        .into();

    let S3SignRequest {
        uri,
        method,
        mut headers,
        body,
        ..
    } = request;
    headers.retain(|name, _| {
        !STRIPPED_HEADERS
            .iter()
            .any(|stripped| name.eq_ignore_ascii_case(stripped))
    });

    let content_sha256 = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(CONTENT_SHA256_HEADER))
        .and_then(|(_, values)| values.first().cloned());
    let body = match (&content_sha256, &body) {
        (Some(sha), _) => SignableBody::Precomputed(sha.clone()),
        (None, Some(body)) => SignableBody::Bytes(body.as_bytes()),
        (None, None) => SignableBody::UnsignedPayload,
    };

    let flat_headers = headers
        .iter()
        .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())));
    let signable = SignableRequest::new(&method, uri.as_str(), flat_headers, body)
        .map_err(|e| signing_error(Box::new(e)))?;
    let (instructions, _signature) = sign(signable, &params)
        .map_err(|e| signing_error(Box::new(e)))?
        .into_parts();

    let mut signed_headers: HashMap<String, Vec<String>> = headers;
    for (name, value) in instructions.headers() {
        signed_headers.insert(name.to_string(), vec![value.to_string()]);
    }

    Ok(S3SignResponse {
        uri,
        headers: signed_headers,
    })
}

fn signing_error(source: Box<dyn std::error::Error + Send + Sync + 'static>) -> ErrorModel {
    ErrorModel::internal("Failed to sign S3 request", "S3SigningFailed", Some(source))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn profile() -> S3Profile {
        serde_json::from_value(serde_json::json!({
            "bucket": "lake",
            "region": "eu-central-1",
        }))
        .unwrap()
    }

    fn location_of(uri: &str) -> Result<String> {
        request_location(&profile(), &url::Url::parse(uri).unwrap()).map(|l| l.to_string())
    }

    #[test]
    fn test_request_location_from_uri_styles() {
        assert_eq!(
            location_of("https://lake.s3.eu-central-1.amazonaws.com/wh/t1/data/0.parquet")
                .unwrap(),
            "s3://lake/wh/t1/data/0.parquet"
        );
        assert_eq!(
            location_of("http://minio:9000/lake/wh/t1/data/id%3D1/0.parquet").unwrap(),
            "s3://lake/wh/t1/data/id=1/0.parquet"
        );
        assert_eq!(
            location_of("http://minio:9000/lake?list-type=2&prefix=wh/t1/metadata").unwrap(),
            "s3://lake/wh/t1/metadata"
        );
        assert_eq!(
            location_of("http://minio:9000/other-bucket/wh/t1/x")
                .unwrap_err()
                .error
                .code,
            403
        );
        assert_eq!(
            location_of("http://minio:9000/lakehouse/wh/t1/x")
                .unwrap_err()
                .error
                .code,
            403
        );
    }

    #[test]
    fn test_request_must_stay_within_table() {
        let inside = Location::from_str("s3://lake/wh/t1/data/0.parquet").unwrap();
        assert!(require_within_table(&inside, "s3://lake/wh/t1").is_ok());
        assert!(require_within_table(&inside, "s3a://lake/wh/t1").is_ok());

        let sibling = Location::from_str("s3://lake/wh/t10/data/0.parquet").unwrap();
        assert_eq!(
            require_within_table(&sibling, "s3://lake/wh/t1")
                .unwrap_err()
                .error
                .code,
            403
        );
    }

    #[test]
    fn test_read_methods() {
        assert!(is_read_method("GET"));
        assert!(is_read_method("head"));
        assert!(!is_read_method("PUT"));
        assert!(!is_read_method("DELETE"));
    }
}
