use async_trait::async_trait;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use http::StatusCode;
use icehouse_ext::NamespaceIdent;

use crate::{
    api::{
        ApiContext, CreateNamespaceRequest, CreateNamespaceResponse, GetNamespaceResponse,
        ListNamespacesQuery, ListNamespacesResponse, Result, ThreadSafe,
        UpdateNamespacePropertiesRequest, UpdateNamespacePropertiesResponse,
        iceberg::types::Prefix,
    },
    request_metadata::RequestMetadata,
};

/// Namespace path segment. Levels are separated by the unit separator (`%1F`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceIdentUrl(NamespaceIdent);

impl<'de> serde::Deserialize<'de> for NamespaceIdentUrl {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let segment = String::deserialize(deserializer)?;
        NamespaceIdent::from_url_segment(&segment)
            .map(NamespaceIdentUrl)
            .map_err(serde::de::Error::custom)
    }
}

impl From<NamespaceIdentUrl> for NamespaceIdent {
    fn from(value: NamespaceIdentUrl) -> Self {
        value.0
    }
}

#[async_trait]
pub trait NamespaceService<S: ThreadSafe>
where
    Self: Send + Sync + 'static,
{
    /// List direct children of `query.parent`, or top-level namespaces.
    async fn list_namespaces(
        prefix: Option<Prefix>,
        query: ListNamespacesQuery,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<ListNamespacesResponse>;

    async fn create_namespace(
        prefix: Option<Prefix>,
        request: CreateNamespaceRequest,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<CreateNamespaceResponse>;

    async fn load_namespace_metadata(
        parameters: NamespaceParameters,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<GetNamespaceResponse>;

    async fn namespace_exists(
        parameters: NamespaceParameters,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<()>;

    /// Fails with a conflict unless the namespace is empty.
    async fn drop_namespace(
        parameters: NamespaceParameters,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<()>;

    async fn update_namespace_properties(
        parameters: NamespaceParameters,
        request: UpdateNamespacePropertiesRequest,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<UpdateNamespacePropertiesResponse>;
}

pub fn router<I: NamespaceService<S>, S: ThreadSafe>() -> Router<ApiContext<S>> {
    Router::new()
        // /{prefix}/namespaces
        .route(
            "/{prefix}/namespaces",
            get(
                |Path(prefix): Path<Prefix>,
                 Query(query): Query<ListNamespacesQuery>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>| {
                    I::list_namespaces(Some(prefix), query, api_context, metadata)
                },
            )
            .post(
                |Path(prefix): Path<Prefix>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>,
                 Json(request): Json<CreateNamespaceRequest>| {
                    I::create_namespace(Some(prefix), request, api_context, metadata)
                },
            ),
        )
        // /{prefix}/namespaces/{namespace}
        .route(
            "/{prefix}/namespaces/{namespace}",
            get(
                |Path((prefix, namespace)): Path<(Prefix, NamespaceIdentUrl)>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>| {
                    I::load_namespace_metadata(
                        NamespaceParameters {
                            prefix: Some(prefix),
                            namespace: namespace.into(),
                        },
                        api_context,
                        metadata,
                    )
                },
            )
            .head(
                |Path((prefix, namespace)): Path<(Prefix, NamespaceIdentUrl)>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>| async move {
                    I::namespace_exists(
                        NamespaceParameters {
                            prefix: Some(prefix),
                            namespace: namespace.into(),
                        },
                        api_context,
                        metadata,
                    )
                    .await
                    .map(|()| StatusCode::NO_CONTENT.into_response())
                },
            )
            .delete(
                |Path((prefix, namespace)): Path<(Prefix, NamespaceIdentUrl)>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>| async move {
                    I::drop_namespace(
                        NamespaceParameters {
                            prefix: Some(prefix),
                            namespace: namespace.into(),
                        },
                        api_context,
                        metadata,
                    )
                    .await
                    .map(|()| StatusCode::NO_CONTENT.into_response())
                },
            ),
        )
        // /{prefix}/namespaces/{namespace}/properties
        .route(
            "/{prefix}/namespaces/{namespace}/properties",
            post(
                |Path((prefix, namespace)): Path<(Prefix, NamespaceIdentUrl)>,
                 State(api_context): State<ApiContext<S>>,
                 Extension(metadata): Extension<RequestMetadata>,
                 Json(request): Json<UpdateNamespacePropertiesRequest>| {
                    I::update_namespace_properties(
                        NamespaceParameters {
                            prefix: Some(prefix),
                            namespace: namespace.into(),
                        },
                        request,
                        api_context,
                        metadata,
                    )
                },
            ),
        )
}

// Deliberately not ser / de so that it can't be used in the router directly
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceParameters {
    /// The prefix of the namespace
    pub prefix: Option<Prefix>,
    /// The namespace to act on
    pub namespace: NamespaceIdent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_url_segment_is_split() {
        let ns: NamespaceIdentUrl = serde_json::from_str("\"sales\\u001feu\"").unwrap();
        assert_eq!(
            NamespaceIdent::from(ns).inner(),
            &["sales".to_string(), "eu".to_string()]
        );
        assert!(serde_json::from_str::<NamespaceIdentUrl>("\"sales\\u001f\"").is_err());
    }
}
