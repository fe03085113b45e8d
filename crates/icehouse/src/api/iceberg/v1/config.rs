use async_trait::async_trait;
use axum::{
    Extension, Router,
    extract::{Query, State},
    routing::get,
};
use icehouse_ext::catalog::rest::GetConfigQueryParams;

use crate::{
    api::{ApiContext, CatalogConfig, Result, ThreadSafe},
    request_metadata::RequestMetadata,
};

#[async_trait]
pub trait ConfigService<S: ThreadSafe>
where
    Self: Send + Sync + 'static,
{
    /// Resolve the warehouse of the client and hand out its prefix.
    async fn get_config(
        query: GetConfigQueryParams,
        api_context: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<CatalogConfig>;
}

pub fn router<I: ConfigService<S>, S: ThreadSafe>() -> Router<ApiContext<S>> {
    Router::new().route(
        "/config",
        get(
            |Query(query): Query<GetConfigQueryParams>,
             State(api_context): State<ApiContext<S>>,
             Extension(metadata): Extension<RequestMetadata>| {
                I::get_config(query, api_context, metadata)
            },
        ),
    )
}
