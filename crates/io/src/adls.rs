//! Azure Data Lake Storage Gen2 access through the DFS REST API, authenticated
//! with an Azure AD client-credentials token.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use url::Url;
use veil::Redact;

use crate::{
    AccessToken, DeleteSummary, ErrorKind, IcehouseStorage, IoError, Location,
    auth::{TokenCache, TokenResponse},
    error_from_reqwest, error_from_status,
};

pub const DEFAULT_HOST: &str = "dfs.core.windows.net";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
pub const STORAGE_API_VERSION: &str = "2023-11-03";

#[derive(Redact, Clone, PartialEq, Eq, Hash)]
pub struct AzureClientCredentials {
    pub client_id: String,
    #[redact(partial)]
    pub client_secret: String,
    pub tenant_id: String,
}

impl AzureClientCredentials {
    /// Obtain a token via the client-credentials grant.
    ///
    /// # Errors
    /// Fails if the authority cannot be reached or rejects the credential.
    pub async fn access_token(
        &self,
        http: &reqwest::Client,
        authority_host: &Url,
        scope: &str,
    ) -> Result<AccessToken, IoError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            authority_host.as_str().trim_end_matches('/'),
            self.tenant_id
        );
        let response = http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| error_from_reqwest(e, None))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_status(status, &body, None)
                .with_context("Azure AD rejected the client credentials"));
        }
        let token = response.json::<TokenResponse>().await.map_err(|e| {
            IoError::new(ErrorKind::Unexpected, "Invalid token response from Azure AD")
                .with_source(e)
        })?;
        Ok(AccessToken::new(token.access_token, token.expires_in))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct AdlsSettings {
    pub account_name: String,
    pub filesystem: String,
    #[builder(default = DEFAULT_HOST.to_string())]
    pub host: String,
    #[builder(default)]
    pub authority_host: Option<Url>,
    /// Overrides `https://<account>.<host>` for both DFS and Blob calls.
    #[builder(default)]
    pub endpoint: Option<Url>,
}

impl AdlsSettings {
    #[must_use]
    pub fn dfs_endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.as_str().trim_end_matches('/').to_string(),
            None => format!("https://{}.{}", self.account_name, self.host),
        }
    }

    #[must_use]
    pub fn blob_endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.as_str().trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.blob.{}",
                self.account_name,
                self.host.trim_start_matches("dfs.")
            ),
        }
    }

    /// # Errors
    /// Fails if the configured authority host is not a valid URL.
    pub fn authority_host(&self) -> Result<Url, IoError> {
        match &self.authority_host {
            Some(url) => Ok(url.clone()),
            None => Url::parse(DEFAULT_AUTHORITY_HOST)
                .map_err(|e| IoError::new(ErrorKind::ConfigInvalid, e.to_string())),
        }
    }

    /// Base location `abfss://<filesystem>@<account>.<host>/`.
    ///
    /// # Errors
    /// Fails if account or filesystem produce an invalid URL.
    pub fn base_location(&self) -> Result<Location, crate::InvalidLocationError> {
        format!("abfss://{}@{}.{}/", self.filesystem, self.account_name, self.host).parse()
    }
}

/// Key returned by the `Get User Delegation Key` operation. Used to sign SAS tokens.
#[derive(Redact, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDelegationKey {
    pub signed_oid: String,
    pub signed_tid: String,
    pub signed_start: String,
    pub signed_expiry: String,
    pub signed_service: String,
    pub signed_version: String,
    #[redact]
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct AdlsStorage {
    http: reqwest::Client,
    settings: AdlsSettings,
    credentials: AzureClientCredentials,
    token: TokenCache,
}

#[derive(Debug, Deserialize)]
struct ListPathsResponse {
    #[serde(default)]
    paths: Vec<PathEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathEntry {
    name: String,
    #[serde(default)]
    is_directory: Option<String>,
}

impl AdlsStorage {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        settings: AdlsSettings,
        credentials: AzureClientCredentials,
    ) -> Self {
        Self {
            http,
            settings,
            credentials,
            token: TokenCache::default(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AdlsSettings {
        &self.settings
    }

    async fn bearer(&self) -> Result<String, IoError> {
        let authority = self.settings.authority_host()?;
        let token = self
            .token
            .get_or_refresh(|| {
                self.credentials
                    .access_token(&self.http, &authority, STORAGE_SCOPE)
            })
            .await?;
        Ok(format!("Bearer {}", token.token))
    }

    fn path_url(&self, location: &Location) -> String {
        format!(
            "{}/{}/{}",
            self.settings.dfs_endpoint(),
            self.settings.filesystem,
            location.key()
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        location: &Location,
    ) -> Result<reqwest::Response, IoError> {
        let response = request
            .header("Authorization", self.bearer().await?)
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await
            .map_err(|e| error_from_reqwest(e, Some(location.as_str())))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_from_status(status, &body, Some(location.as_str())))
        }
    }

    /// Request a user delegation key valid between `start` and `expiry`.
    ///
    /// # Errors
    /// Fails if the Blob service rejects the request.
    pub async fn get_user_delegation_key(
        &self,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<UserDelegationKey, IoError> {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><KeyInfo><Start>{}</Start><Expiry>{}</Expiry></KeyInfo>",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
            expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let url = format!(
            "{}/?restype=service&comp=userdelegationkey",
            self.settings.blob_endpoint()
        );
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| error_from_reqwest(e, None))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(error_from_status(status, &text, None)
                .with_context("Failed to obtain user delegation key"));
        }
        quick_xml::de::from_str::<UserDelegationKey>(&text).map_err(|e| {
            IoError::new(ErrorKind::Unexpected, "Invalid user delegation key response")
                .with_source(e)
        })
    }
}

#[async_trait::async_trait]
impl IcehouseStorage for AdlsStorage {
    async fn write(&self, location: &Location, data: Bytes) -> Result<(), IoError> {
        let url = self.path_url(location);
        let len = data.len();
        self.send(
            self.http.put(format!("{url}?resource=file")).header("Content-Length", "0"),
            location,
        )
        .await?;
        if len > 0 {
            self.send(
                self.http
                    .patch(format!("{url}?action=append&position=0"))
                    .body(data),
                location,
            )
            .await?;
        }
        self.send(
            self.http
                .patch(format!("{url}?action=flush&position={len}"))
                .header("Content-Length", "0"),
            location,
        )
        .await?;
        Ok(())
    }

    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        let response = self
            .send(self.http.get(self.path_url(location)), location)
            .await?;
        response
            .bytes()
            .await
            .map_err(|e| error_from_reqwest(e, Some(location.as_str())))
    }

    async fn list(&self, prefix: &Location) -> Result<Vec<Location>, IoError> {
        let directory = prefix.key().trim_end_matches('/').to_string();
        let base = prefix.url().as_str().trim_end_matches(prefix.url().path());
        let mut continuation: Option<String> = None;
        let mut result = Vec::new();

        loop {
            let mut request = self
                .http
                .get(format!(
                    "{}/{}",
                    self.settings.dfs_endpoint(),
                    self.settings.filesystem
                ))
                .query(&[
                    ("resource", "filesystem"),
                    ("recursive", "true"),
                    ("directory", directory.as_str()),
                ]);
            if let Some(token) = &continuation {
                request = request.query(&[("continuation", token.as_str())]);
            }
            let response = match self.send(request, prefix).await {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(result),
                Err(e) => return Err(e),
            };
            continuation = response
                .headers()
                .get("x-ms-continuation")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(ToString::to_string);
            let page = response.json::<ListPathsResponse>().await.map_err(|e| {
                IoError::new(ErrorKind::Unexpected, "Invalid list paths response")
                    .with_location(prefix.as_str())
                    .with_source(e)
            })?;
            for entry in page.paths {
                if entry.is_directory.as_deref() == Some("true") {
                    continue;
                }
                let location = format!("{base}/{}", entry.name).parse().map_err(
                    |e: crate::InvalidLocationError| {
                        IoError::new(ErrorKind::Unexpected, e.to_string())
                    },
                )?;
                result.push(location);
            }
            if continuation.is_none() {
                return Ok(result);
            }
        }
    }

    async fn delete(&self, location: &Location) -> Result<(), IoError> {
        match self
            .send(self.http.delete(self.path_url(location)), location)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn remove_all(&self, prefix: &Location) -> Result<DeleteSummary, IoError> {
        let deleted = self.list(prefix).await?.len();
        tracing::debug!(prefix = prefix.as_str(), objects = deleted, "Deleting ADLS directory");
        let mut directory = prefix.clone();
        directory.without_trailing_slash();
        let url = format!("{}?recursive=true", self.path_url(&directory));
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self.http.delete(&url);
            if let Some(token) = &continuation {
                request = request.query(&[("continuation", token.as_str())]);
            }
            let response = match self.send(request, prefix).await {
                Ok(r) => r,
                Err(e) if e.kind() == ErrorKind::NotFound => break,
                Err(e) => return Err(e),
            };
            continuation = response
                .headers()
                .get("x-ms-continuation")
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(ToString::to_string);
            if continuation.is_none() {
                break;
            }
        }
        Ok(DeleteSummary { deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        let settings = AdlsSettings::builder()
            .account_name("acc".to_string())
            .filesystem("fs".to_string())
            .build();
        assert_eq!(settings.dfs_endpoint(), "https://acc.dfs.core.windows.net");
        assert_eq!(settings.blob_endpoint(), "https://acc.blob.core.windows.net");
        assert_eq!(
            settings.base_location().unwrap().as_str(),
            "abfss://fs@acc.dfs.core.windows.net/"
        );
    }

    #[test]
    fn test_parse_user_delegation_key() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<UserDelegationKey>
  <SignedOid>oid</SignedOid>
  <SignedTid>tid</SignedTid>
  <SignedStart>2026-01-01T00:00:00Z</SignedStart>
  <SignedExpiry>2026-01-01T01:00:00Z</SignedExpiry>
  <SignedService>b</SignedService>
  <SignedVersion>2023-11-03</SignedVersion>
  <Value>a2V5</Value>
</UserDelegationKey>"#;
        let key: UserDelegationKey = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(key.signed_oid, "oid");
        assert_eq!(key.value, "a2V5");
        assert!(!format!("{key:?}").contains("a2V5"));
    }
}
