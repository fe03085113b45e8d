use async_trait::async_trait;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use icehouse_ext::{
    TableIdent,
    catalog::rest::{ETag, LoadCredentialsResponse},
};

use crate::{
    api::{
        ApiContext, CommitTableRequest, CommitTableResponse, CommitTransactionRequest,
        CreateTableRequest, ListTablesResponse, LoadTableResult, RenameTableRequest,
        ReplaceTableRequest, Result, ThreadSafe,
        iceberg::{
            types::{DropParams, PaginationQuery, Prefix},
            v1::namespace::{NamespaceIdentUrl, NamespaceParameters},
        },
    },
    request_metadata::RequestMetadata,
};

/// Normalize table name by replacing `+` with space.
/// This is needed because `+` in URLs is decoded to space by some clients.
pub(super) fn normalize_tabular_name(table: &str) -> String {
    table.replace('+', " ")
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadTableResultOrNotModified {
    LoadTableResult(LoadTableResult),
    NotModifiedResponse(ETag),
}

impl IntoResponse for LoadTableResultOrNotModified {
    fn into_response(self) -> axum::response::Response {
        match self {
            LoadTableResultOrNotModified::NotModifiedResponse(etag) => {
                let mut header = HeaderMap::new();

                let etag = etag.as_str();

                match etag.parse::<HeaderValue>() {
                    Ok(header_value) => {
                        header.insert(header::ETAG, header_value);
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to create valid ETAG header from String {etag}, error: {e}"
                        );
                    }
                }
                (StatusCode::NOT_MODIFIED, header).into_response()
            }
            LoadTableResultOrNotModified::LoadTableResult(load_table_result) => {
                load_table_result.into_response()
            }
        }
    }
}

#[async_trait]
pub trait TablesService<S: ThreadSafe>
where
    Self: Send + Sync + 'static,
{
    /// List all table identifiers underneath a given namespace
    async fn list_tables(
        parameters: NamespaceParameters,
        query: PaginationQuery,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<ListTablesResponse>;

    /// Create a table in the given namespace, or stage it if `stage-create` is set.
    async fn create_table(
        parameters: NamespaceParameters,
        request: CreateTableRequest,
        data_access: DataAccessMode,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadTableResult>;

    /// Load a table from the catalog
    async fn load_table(
        parameters: TableParameters,
        data_access: DataAccessMode,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
        if_none_match: Vec<String>,
    ) -> Result<LoadTableResultOrNotModified>;

    /// Vend fresh credentials for the location of a table
    async fn load_table_credentials(
        parameters: TableParameters,
        data_access: DataAccess,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadCredentialsResponse>;

    /// Commit updates to a table
    async fn commit_table(
        parameters: TableParameters,
        request: CommitTableRequest,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<CommitTableResponse>;

    /// Replace the definition of a table, keeping its identity and location
    async fn replace_table(
        parameters: TableParameters,
        request: ReplaceTableRequest,
        data_access: DataAccessMode,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<LoadTableResult>;

    /// Drop a table from the catalog
    async fn drop_table(
        parameters: TableParameters,
        drop_params: DropParams,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<()>;

    /// Check if a table exists
    async fn table_exists(
        parameters: TableParameters,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<()>;

    /// Rename a table
    async fn rename_table(
        prefix: Option<Prefix>,
        request: RenameTableRequest,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<()>;

    /// Commit updates to multiple tables in an atomic operation
    async fn commit_transaction(
        prefix: Option<Prefix>,
        request: CommitTransactionRequest,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<()>;
}

fn table_parameters(prefix: Prefix, namespace: NamespaceIdentUrl, table: &str) -> TableParameters {
    TableParameters {
        prefix: Some(prefix),
        table: TableIdent::new(namespace.into(), normalize_tabular_name(table)),
    }
}

#[allow(clippy::too_many_lines)]
pub fn router<I: TablesService<S>, S: ThreadSafe>() -> Router<ApiContext<S>> {
    Router::new()
        // /{prefix}/namespaces/{namespace}/tables
        .route(
            "/{prefix}/namespaces/{namespace}/tables",
            // List tables in the given namespace
            get(
                |Path((prefix, namespace)): Path<(Prefix, NamespaceIdentUrl)>,
                 Query(query): Query<PaginationQuery>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>| {
                    I::list_tables(
                        NamespaceParameters {
                            prefix: Some(prefix),
                            namespace: namespace.into(),
                        },
                        query,
                        api_context,
                        metadata,
                    )
                },
            )
            // Create a table in the given namespace
            .post(
                |Path((prefix, namespace)): Path<(Prefix, NamespaceIdentUrl)>,
                 State(api_context): State<ApiContext<S>>,
                 headers: HeaderMap,
                 Extension(metadata): Extension<RequestMetadata>,
                 Json(request): Json<CreateTableRequest>| {
                    I::create_table(
                        NamespaceParameters {
                            prefix: Some(prefix),
                            namespace: namespace.into(),
                        },
                        request,
                        parse_data_access(&headers),
                        api_context,
                        metadata,
                    )
                },
            ),
        )
        // /{prefix}/namespaces/{namespace}/tables/{table}
        .route(
            "/{prefix}/namespaces/{namespace}/tables/{table}",
            // Load a table from the catalog
            get(
                |Path((prefix, namespace, table)): Path<(Prefix, NamespaceIdentUrl, String)>,
                 State(api_context): State<ApiContext<S>>,
                 headers: HeaderMap,
                 Extension(metadata): Extension<RequestMetadata>| {
                    I::load_table(
                        table_parameters(prefix, namespace, &table),
                        parse_data_access(&headers),
                        api_context,
                        metadata,
                        parse_if_none_match(&headers),
                    )
                },
            )
            // Commit updates to a table
            .post(
                |Path((prefix, namespace, table)): Path<(Prefix, NamespaceIdentUrl, String)>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>,
                 Json(request): Json<CommitTableRequest>| {
                    I::commit_table(
                        table_parameters(prefix, namespace, &table),
                        request,
                        api_context,
                        metadata,
                    )
                },
            )
            // Replace the definition of a table
            .put(
                |Path((prefix, namespace, table)): Path<(Prefix, NamespaceIdentUrl, String)>,
                 State(api_context): State<ApiContext<S>>,
                 headers: HeaderMap,
                 Extension(metadata): Extension<RequestMetadata>,
                 Json(request): Json<ReplaceTableRequest>| {
                    I::replace_table(
                        table_parameters(prefix, namespace, &table),
                        request,
                        parse_data_access(&headers),
                        api_context,
                        metadata,
                    )
                },
            )
            // Drop a table from the catalog
            .delete(
                |Path((prefix, namespace, table)): Path<(Prefix, NamespaceIdentUrl, String)>,
                 Query(drop_params): Query<DropParams>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>| async move {
                    I::drop_table(
                        table_parameters(prefix, namespace, &table),
                        drop_params,
                        api_context,
                        metadata,
                    )
                    .await
                    .map(|()| StatusCode::NO_CONTENT.into_response())
                },
            )
            // Check if a table exists
            .head(
                |Path((prefix, namespace, table)): Path<(Prefix, NamespaceIdentUrl, String)>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>| async move {
                    I::table_exists(
                        table_parameters(prefix, namespace, &table),
                        api_context,
                        metadata,
                    )
                    .await
                    .map(|()| StatusCode::NO_CONTENT.into_response())
                },
            ),
        )
        // {prefix}/namespaces/{namespace}/tables/{table}/credentials
        .route(
            "/{prefix}/namespaces/{namespace}/tables/{table}/credentials",
            get(
                |Path((prefix, namespace, table)): Path<(Prefix, NamespaceIdentUrl, String)>,
                 State(api_context): State<ApiContext<S>>,
                 headers: HeaderMap,
                 Extension(metadata): Extension<RequestMetadata>| {
                    I::load_table_credentials(
                        table_parameters(prefix, namespace, &table),
                        parse_data_access(&headers).data_access(),
                        api_context,
                        metadata,
                    )
                },
            ),
        )
        // /{prefix}/tables/rename
        .route(
            "/{prefix}/tables/rename",
            // Rename a table in the given namespace
            post(
                |Path(prefix): Path<Prefix>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>,
                 Json(request): Json<RenameTableRequest>| {
                    async {
                        I::rename_table(Some(prefix), request, api_context, metadata)
                            .await
                            .map(|()| StatusCode::NO_CONTENT)
                    }
                },
            ),
        )
        // /{prefix}/transactions/commit
        .route(
            "/{prefix}/transactions/commit",
            // Commit updates to multiple tables in an atomic operation
            post(
                |Path(prefix): Path<Prefix>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>,
                 Json(request): Json<CommitTransactionRequest>| {
                    async {
                        I::commit_transaction(Some(prefix), request, api_context, metadata)
                            .await
                            .map(|()| StatusCode::NO_CONTENT)
                    }
                },
            ),
        )
}

// Deliberately not ser / de so that it can't be used in the router directly
#[derive(Debug, Clone, PartialEq)]
pub struct TableParameters {
    /// The prefix of the namespace
    pub prefix: Option<Prefix>,
    /// The table to load metadata for
    pub table: TableIdent,
}

pub const DATA_ACCESS_HEADER: &str = "x-iceberg-access-delegation";
pub const DATA_ACCESS_HEADER_NAME: HeaderName = HeaderName::from_static(DATA_ACCESS_HEADER);

#[derive(Debug, Hash, Clone, PartialEq, Eq, Copy)]
// Modeled as a string to enable multiple values to be specified.
pub struct DataAccess {
    pub vended_credentials: bool,
    pub remote_signing: bool,
}

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, derive_more::From)]
pub enum DataAccessMode {
    // Indicates that the client has credentials
    // and thus doesn't need any form of data access delegation.
    ClientManaged,
    ServerDelegated(DataAccess),
}

impl DataAccessMode {
    #[must_use]
    pub(crate) fn data_access(self) -> DataAccess {
        match self {
            DataAccessMode::ClientManaged => DataAccess::not_specified(),
            DataAccessMode::ServerDelegated(da) => da,
        }
    }
}

impl DataAccess {
    #[must_use]
    pub(crate) fn not_specified() -> Self {
        Self {
            vended_credentials: false,
            remote_signing: false,
        }
    }
}

/// Tags of all `If-None-Match` headers, weak markers removed and quoted, so they
/// compare equal to [`ETag::as_str`]. `*` is kept as is.
pub fn parse_if_none_match(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            if tag == "*" {
                tag.to_string()
            } else {
                format!("\"{tag}\"")
            }
        })
        .collect()
}

pub(crate) fn parse_data_access(headers: &HeaderMap) -> DataAccessMode {
    let header = headers
        .get_all(DATA_ACCESS_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .collect::<Vec<_>>();
    let vended_credentials = header.contains(&"vended-credentials");
    let remote_signing = header.contains(&"remote-signing");
    let client_managed = header.contains(&"client-managed");
    if !vended_credentials && !remote_signing && client_managed {
        return DataAccessMode::ClientManaged;
    }
    DataAccess {
        vended_credentials,
        remote_signing,
    }
    .into()
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_parse_data_access() {
        let headers = http::header::HeaderMap::new();
        let data_access = super::parse_data_access(&headers);
        assert_eq!(
            data_access,
            DataAccessMode::ServerDelegated(DataAccess::not_specified())
        );
    }

    #[test]
    fn test_parse_data_access_capitalization() {
        let mut headers = http::header::HeaderMap::new();
        headers.insert(
            http::header::HeaderName::from_str("X-Iceberg-Access-Delegation").unwrap(),
            http::header::HeaderValue::from_static("vended-credentials"),
        );
        let data_access = super::parse_data_access(&headers);
        assert_eq!(
            data_access,
            DataAccessMode::ServerDelegated(DataAccess {
                vended_credentials: true,
                remote_signing: false
            })
        );
    }

    #[test]
    fn test_parse_data_access_comma_separated() {
        let mut headers = http::header::HeaderMap::new();
        headers.insert(
            DATA_ACCESS_HEADER_NAME,
            http::header::HeaderValue::from_static("vended-credentials, remote-signing"),
        );
        assert_eq!(
            super::parse_data_access(&headers),
            DataAccessMode::ServerDelegated(DataAccess {
                vended_credentials: true,
                remote_signing: true
            })
        );
    }

    #[test]
    fn test_parse_data_access_client_managed() {
        let mut headers = http::header::HeaderMap::new();
        headers.insert(
            DATA_ACCESS_HEADER_NAME,
            http::header::HeaderValue::from_static("client-managed"),
        );
        let data_access = super::parse_data_access(&headers);
        assert_eq!(data_access, DataAccessMode::ClientManaged);
    }

    #[test]
    fn test_parse_if_none_match() {
        let mut headers = http::header::HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            http::header::HeaderValue::from_static("W/\"abc\", \"def\""),
        );
        assert_eq!(parse_if_none_match(&headers), vec!["\"abc\"", "\"def\""]);
        let etag = icehouse_ext::catalog::rest::create_etag("memory://icehouse/m1");
        headers.insert(header::IF_NONE_MATCH, etag.as_str().parse().unwrap());
        assert!(etag.matches_any(&parse_if_none_match(&headers)));
    }

    #[test]
    fn test_plus_is_space() {
        assert_eq!(normalize_tabular_name("my+table"), "my table");
    }
}
