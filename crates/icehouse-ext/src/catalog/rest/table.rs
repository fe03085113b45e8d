use std::collections::HashMap;

#[cfg(feature = "axum")]
use axum::{
    http::header::{self, HeaderMap, HeaderValue},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

#[cfg(feature = "axum")]
use super::impl_into_response;
use crate::{
    catalog::TableIdent,
    spec::{Schema, SortOrder, TableMetadata, TableRequirement, TableUpdate, UnboundPartitionSpec},
};

/// Credentials valid for all locations starting with `prefix`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct StorageCredential {
    pub prefix: String,
    pub config: HashMap<String, String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadCredentialsResponse {
    pub storage_credentials: Vec<StorageCredential>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadTableResult {
    /// `None` while the table is staged.
    pub metadata_location: Option<String>,
    pub metadata: TableMetadata,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_credentials: Option<Vec<StorageCredential>>,
}

impl LoadTableResult {
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.metadata_location.is_none()
    }

    #[must_use]
    pub fn etag(&self) -> Option<ETag> {
        self.metadata_location.as_deref().map(create_etag)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateTableRequest {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    pub schema: Schema,
    #[serde(default)]
    pub partition_spec: Option<UnboundPartitionSpec>,
    #[serde(default)]
    pub write_order: Option<SortOrder>,
    #[serde(default)]
    pub stage_create: Option<bool>,
    #[serde(default)]
    pub properties: Option<HashMap<String, String>>,
}

/// Body of `PUT .../tables/{table}`: install a new definition under the same identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReplaceTableRequest {
    pub schema: Schema,
    #[serde(default)]
    pub partition_spec: Option<UnboundPartitionSpec>,
    #[serde(default)]
    pub write_order: Option<SortOrder>,
    #[serde(default)]
    pub properties: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenameTableRequest {
    pub source: TableIdent,
    pub destination: TableIdent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListTablesResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_page_token: Option<String>,
    pub identifiers: Vec<TableIdent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTableRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub identifier: Option<TableIdent>,
    #[serde(default)]
    pub requirements: Vec<TableRequirement>,
    #[serde(default)]
    pub updates: Vec<TableUpdate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTableResponse {
    pub metadata_location: String,
    pub metadata: TableMetadata,
}

impl CommitTableResponse {
    #[must_use]
    pub fn etag(&self) -> ETag {
        create_etag(&self.metadata_location)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommitTransactionRequest {
    pub table_changes: Vec<CommitTableRequest>,
}

/// Quoted hash of a metadata location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an `If-None-Match` value matches this tag. `*` matches everything.
    #[must_use]
    pub fn matches_any(&self, if_none_match: &[String]) -> bool {
        if_none_match.iter().any(|v| v == "*" || *v == self.0)
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        ETag(value)
    }
}

#[must_use]
pub fn create_etag(metadata_location: &str) -> ETag {
    let hash = xxh3_64(metadata_location.as_bytes());
    format!("\"{hash:x}\"").into()
}

#[cfg(feature = "axum")]
fn with_etag(etag: Option<ETag>, body: impl IntoResponse) -> axum::response::Response {
    let mut headers = HeaderMap::new();
    if let Some(etag) = etag {
        match HeaderValue::from_str(etag.as_str()) {
            Ok(value) => {
                headers.insert(header::ETAG, value);
            }
            Err(e) => tracing::error!("Could not build ETag header from `{}`: {e}", etag.as_str()),
        }
    }
    (headers, body).into_response()
}

#[cfg(feature = "axum")]
impl IntoResponse for LoadTableResult {
    fn into_response(self) -> axum::response::Response {
        with_etag(self.etag(), axum::Json(self))
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for CommitTableResponse {
    fn into_response(self) -> axum::response::Response {
        with_etag(Some(self.etag()), axum::Json(self))
    }
}

#[cfg(feature = "axum")]
impl_into_response!(ListTablesResponse);
#[cfg(feature = "axum")]
impl_into_response!(LoadCredentialsResponse);

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "axum")]
    fn metadata() -> TableMetadata {
        use crate::spec::{NestedField, Type};

        TableMetadata::new_table(
            &Schema::new(0, vec![NestedField::new(1, "id", Type::primitive("long"), true)]),
            None,
            None,
            "memory://b/t",
            HashMap::new(),
            1,
        )
        .unwrap()
    }

    #[test]
    fn test_create_etag() {
        let ETag(etag) = create_etag("Hello World");
        assert_eq!(etag, "\"e34615aade2e6333\"");
        assert!(create_etag("a").matches_any(&["*".to_string()]));
        assert!(!create_etag("a").matches_any(&[create_etag("b").0]));
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateTableRequest = serde_json::from_value(serde_json::json!({
            "name": "t",
            "schema": {"type": "struct", "fields": []}
        }))
        .unwrap();
        assert_eq!(request.stage_create, None);
        assert!(request.partition_spec.is_none());
    }

    #[cfg(feature = "axum")]
    #[tokio::test]
    async fn test_load_table_result_response_carries_etag_unless_staged() {
        use http_body_util::BodyExt;

        let result = LoadTableResult {
            metadata_location: Some("memory://b/t/metadata/00000.json".to_string()),
            metadata: metadata(),
            config: HashMap::new(),
            storage_credentials: None,
        };
        let response = result.clone().into_response();
        let ETag(expected) = create_etag("memory://b/t/metadata/00000.json");
        assert_eq!(response.headers().get(header::ETAG).unwrap(), &expected);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: LoadTableResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, result);

        let staged = LoadTableResult {
            metadata_location: None,
            ..result
        };
        assert!(!staged.into_response().headers().contains_key(header::ETAG));
    }
}
