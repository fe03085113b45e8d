//! Downscoped OAuth2 tokens for Google Cloud Storage.
//!
//! The warehouse service account first mints a short lived access token for itself
//! through the IAM credentials API, which is then exchanged at Google STS for a token
//! restricted by a credential access boundary.
use chrono::{DateTime, Utc};
use icehouse_io::{AccessToken, ErrorKind, IoError, error_from_reqwest, error_from_status};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::AccessLevel;

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Google endpoints used for vending. Overridable for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsEndpoints {
    pub iam_credentials: Url,
    pub sts: Url,
}

impl Default for GcsEndpoints {
    fn default() -> Self {
        Self {
            iam_credentials: Url::parse("https://iamcredentials.googleapis.com/")
                .unwrap_or_else(|_| unreachable!("static url is valid")),
            sts: Url::parse("https://sts.googleapis.com/v1/token")
                .unwrap_or_else(|_| unreachable!("static url is valid")),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: [&'a str; 1],
    lifetime: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct StsTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Mint an access token for `service_account` with a bounded lifetime.
///
/// # Errors
/// Fails if the IAM credentials API rejects the request.
pub(crate) async fn generate_access_token(
    http: &reqwest::Client,
    endpoints: &GcsEndpoints,
    bearer: &AccessToken,
    service_account: &str,
    lifetime_seconds: i64,
) -> Result<AccessToken, IoError> {
    let url = endpoints
        .iam_credentials
        .join(&format!(
            "v1/projects/-/serviceAccounts/{service_account}:generateAccessToken"
        ))
        .map_err(|e| {
            IoError::new(ErrorKind::ConfigInvalid, "Invalid IAM credentials endpoint")
                .with_source(e)
        })?;
    let response = http
        .post(url)
        .bearer_auth(&bearer.token)
        .json(&GenerateAccessTokenRequest {
            scope: [icehouse_io::gcs::CLOUD_PLATFORM_SCOPE],
            lifetime: format!("{lifetime_seconds}s"),
        })
        .send()
        .await
        .map_err(|e| error_from_reqwest(e, None))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(error_from_status(status, &body, None)
            .with_context("IAM credentials API refused to mint an access token"));
    }
    let token = response
        .json::<GenerateAccessTokenResponse>()
        .await
        .map_err(|e| {
            IoError::new(ErrorKind::Unexpected, "Invalid generateAccessToken response")
                .with_source(e)
        })?;
    Ok(AccessToken {
        token: token.access_token,
        expires_at: token.expire_time,
    })
}

/// Credential access boundary limiting a token to objects below `prefix`.
pub(crate) fn access_boundary(bucket: &str, prefix: &str, access: AccessLevel) -> serde_json::Value {
    let prefix = prefix.trim_matches('/');
    let role = match access {
        AccessLevel::Read => "inRole:roles/storage.objectViewer",
        AccessLevel::ReadWrite => "inRole:roles/storage.objectAdmin",
    };
    json!({
        "accessBoundary": {
            "accessBoundaryRules": [{
                "availablePermissions": [role],
                "availableResource": format!("//storage.googleapis.com/projects/_/buckets/{bucket}"),
                "availabilityCondition": {
                    "expression": format!(
                        "resource.name.startsWith('projects/_/buckets/{bucket}/objects/{prefix}') || api.getAttribute('storage.googleapis.com/objectListPrefix', '').startsWith('{prefix}')"
                    )
                }
            }]
        }
    })
}

/// Exchange `token` for one restricted by `boundary`. The downscoped token never
/// outlives the source token.
///
/// # Errors
/// Fails if Google STS rejects the exchange.
pub(crate) async fn downscope(
    http: &reqwest::Client,
    endpoints: &GcsEndpoints,
    token: &AccessToken,
    boundary: &serde_json::Value,
) -> Result<AccessToken, IoError> {
    let options = boundary.to_string();
    let response = http
        .post(endpoints.sts.clone())
        .form(&[
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
            ("subject_token", token.token.as_str()),
            ("options", options.as_str()),
        ])
        .send()
        .await
        .map_err(|e| error_from_reqwest(e, None))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(error_from_status(status, &body, None)
            .with_context("Google STS refused to downscope the token"));
    }
    let downscoped = response.json::<StsTokenResponse>().await.map_err(|e| {
        IoError::new(ErrorKind::Unexpected, "Invalid token exchange response").with_source(e)
    })?;
    let expires_at = downscoped
        .expires_in
        .map_or(token.expires_at, |seconds| {
            (Utc::now() + chrono::Duration::seconds(seconds)).min(token.expires_at)
        });
    Ok(AccessToken {
        token: downscoped.access_token,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_boundary_uses_viewer_role() {
        let boundary = access_boundary("tables", "/wh/ns/t/", AccessLevel::Read);
        let rule = &boundary["accessBoundary"]["accessBoundaryRules"][0];
        assert_eq!(
            rule["availablePermissions"],
            json!(["inRole:roles/storage.objectViewer"])
        );
        assert_eq!(
            rule["availableResource"],
            "//storage.googleapis.com/projects/_/buckets/tables"
        );
        let expression = rule["availabilityCondition"]["expression"].as_str().unwrap();
        assert!(expression.contains("projects/_/buckets/tables/objects/wh/ns/t'"));
        assert!(expression.contains(".startsWith('wh/ns/t')"));
    }

    #[test]
    fn test_read_write_boundary_uses_admin_role() {
        let boundary = access_boundary("tables", "wh", AccessLevel::ReadWrite);
        assert_eq!(
            boundary["accessBoundary"]["accessBoundaryRules"][0]["availablePermissions"],
            json!(["inRole:roles/storage.objectAdmin"])
        );
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = GcsEndpoints::default();
        let url = endpoints
            .iam_credentials
            .join("v1/projects/-/serviceAccounts/sa@p.iam.gserviceaccount.com:generateAccessToken")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/sa@p.iam.gserviceaccount.com:generateAccessToken"
        );
    }
}
