use async_trait::async_trait;
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::post,
};
use icehouse_ext::catalog::rest::{S3SignRequest, S3SignResponse};

use crate::{
    api::{ApiContext, Result, ThreadSafe, iceberg::types::Prefix},
    request_metadata::RequestMetadata,
};

#[async_trait]
pub trait S3SignService<S: ThreadSafe>
where
    Self: Send + Sync + 'static,
{
    /// Sign an S3 request on behalf of a client that loaded a table with remote signing.
    /// The signer URI handed out in the table config embeds the warehouse prefix
    /// and the id of the table, so the request location can be checked against it.
    async fn sign(
        prefix: Prefix,
        tabular_id: uuid::Uuid,
        request: S3SignRequest,
        state: ApiContext<S>,
        request_metadata: RequestMetadata,
    ) -> Result<S3SignResponse>;
}

pub fn router<I: S3SignService<S>, S: ThreadSafe>() -> Router<ApiContext<S>> {
    Router::new().route(
        "/signer/{prefix}/tabular-id/{tabular_id}/v1/aws/s3/sign",
        post(
            |Path((prefix, tabular_id)): Path<(Prefix, uuid::Uuid)>,
             State(api_context): State<ApiContext<S>>,
             Extension(metadata): Extension<RequestMetadata>,
             Json(request): Json<S3SignRequest>| {
                I::sign(prefix, tabular_id, request, api_context, metadata)
            },
        ),
    )
}
