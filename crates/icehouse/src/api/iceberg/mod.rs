use std::sync::LazyLock;

use strum::IntoEnumIterator as _;

pub mod types;

pub mod v1 {
    use axum::Router;

    use crate::api::ThreadSafe;

    pub mod config;
    pub mod namespace;
    #[cfg(feature = "s3-signer")]
    pub mod s3_signer;
    pub mod tables;
    pub mod views;

    pub use icehouse_ext::{NamespaceIdent, TableIdent};

    pub use self::{
        namespace::{NamespaceIdentUrl, NamespaceParameters},
        tables::{DataAccess, DataAccessMode, TableParameters},
        views::ViewParameters,
    };
    pub use crate::{
        api::{
            ApiContext, CatalogConfig, CommitTableRequest, CommitTableResponse,
            CommitTransactionRequest, CommitViewRequest, CreateNamespaceRequest,
            CreateNamespaceResponse, CreateTableRequest, CreateViewRequest, ErrorModel,
            GetNamespaceResponse, IcebergErrorResponse, ListNamespacesQuery,
            ListNamespacesResponse, ListTablesResponse, LoadCredentialsResponse, LoadTableResult,
            LoadViewResult, RenameTableRequest, ReplaceTableRequest, Result,
            UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
            iceberg::types::*,
        },
        request_metadata::RequestMetadata,
    };

    pub fn new_v1_full_router<
        #[cfg(feature = "s3-signer")] T: config::ConfigService<S>
            + namespace::NamespaceService<S>
            + tables::TablesService<S>
            + views::ViewService<S>
            + s3_signer::S3SignService<S>,
        #[cfg(not(feature = "s3-signer"))] T: config::ConfigService<S>
            + namespace::NamespaceService<S>
            + tables::TablesService<S>
            + views::ViewService<S>,
        S: ThreadSafe,
    >() -> Router<ApiContext<S>> {
        let router = Router::new()
            .merge(config::router::<T, S>())
            .merge(namespace::router::<T, S>())
            .merge(tables::router::<T, S>())
            .merge(views::router::<T, S>());

        #[cfg(feature = "s3-signer")]
        let router = router.merge(s3_signer::router::<T, S>());

        router
    }
}

static SUPPORTED_ENDPOINTS: LazyLock<Vec<String>> = LazyLock::new(|| {
    crate::api::endpoints::CatalogV1Endpoint::iter()
        .filter(|e| e.is_advertised())
        .map(crate::api::endpoints::CatalogV1Endpoint::as_http_route)
        .collect()
});

/// Routes advertised in the `endpoints` field of `/config`.
pub(crate) fn supported_endpoints() -> &'static [String] {
    &SUPPORTED_ENDPOINTS
}

#[cfg(test)]
mod test {
    #[test]
    fn test_supported_endpoints() {
        let endpoints = super::supported_endpoints();
        for route in [
            "GET /v1/{prefix}/namespaces",
            "HEAD /v1/{prefix}/namespaces/{namespace}",
            "PUT /v1/{prefix}/namespaces/{namespace}/tables/{table}",
            "POST /v1/{prefix}/transactions/commit",
            "POST /v1/{prefix}/views/rename",
        ] {
            assert!(endpoints.iter().any(|e| e == route), "{route}");
        }
        assert!(!endpoints.iter().any(|e| e.contains("/signer/")));
    }
}
