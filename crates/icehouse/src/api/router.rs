use std::fmt::Debug;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State as AxumState},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::{either::Either, middleware::option_layer};
use axum_prometheus::PrometheusMetricLayer;
use http::{HeaderName, HeaderValue, Method, StatusCode, header};
use tower::ServiceBuilder;
use tower_http::{
    ServiceBuilderExt,
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::AllowOrigin,
    sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer,
    trace::{self, TraceLayer},
};

use crate::{
    CancellationToken,
    api::{
        ApiContext,
        iceberg::v1::{new_v1_full_router, tables::DATA_ACCESS_HEADER_NAME},
        management::v1::ApiServer,
    },
    request_metadata::{X_REQUEST_ID_HEADER, create_request_metadata_with_trace_id_fn},
    request_tracing::{MakeRequestUuid7, RestMakeSpan},
    server::CatalogServer,
    service::{
        CatalogStore, SecretStore, State,
        authn::{
            Authenticator,
            middleware::{AuthMiddlewareState, auth_middleware_fn},
        },
        authz::Authorizer,
    },
};

pub const X_USER_AGENT_HEADER_NAME: HeaderName = HeaderName::from_static("x-user-agent");

pub struct RouterArgs<C: CatalogStore, A: Authorizer + Clone, S: SecretStore, N: Authenticator> {
    /// Without an authenticator every request is anonymous.
    pub authenticator: Option<N>,
    pub state: ApiContext<State<A, C, S>>,
    pub metrics_layer: Option<PrometheusMetricLayer<'static>>,
}

impl<C: CatalogStore, A: Authorizer + Clone, S: SecretStore, N: Authenticator> Debug
    for RouterArgs<C, A, S, N>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterArgs")
            .field("authenticator", &self.authenticator)
            .field("state", &self.state)
            .field(
                "metrics_layer",
                &self.metrics_layer.as_ref().map(|_| "PrometheusMetricLayer"),
            )
            .finish()
    }
}

/// Router serving `/catalog/v1`, `/management/v1` and `/health`.
pub fn new_full_router<C: CatalogStore, A: Authorizer + Clone, S: SecretStore, N: Authenticator>(
    RouterArgs {
        authenticator,
        state,
        metrics_layer,
    }: RouterArgs<C, A, S, N>,
) -> Router {
    let config = state.v1_state.config.clone();
    let v1_routes = new_v1_full_router::<CatalogServer<C, A, S>, State<A, C, S>>();
    let management_routes = ApiServer::<C, A, S>::new_v1_router(&state.v1_state.authz);
    let maybe_cors_layer = get_cors_layer(config.allow_origin.as_deref());

    let maybe_auth_layer = option_layer(authenticator.map(|authenticator| {
        axum::middleware::from_fn_with_state(
            AuthMiddlewareState { authenticator },
            auth_middleware_fn::<N>,
        )
    }));

    let router = Router::new()
        .nest("/catalog/v1", v1_routes)
        .nest("/management/v1", management_routes)
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(maybe_auth_layer)
        // Added after the auth layer so that it is not authenticated
        .route("/health", get(health::<C, A, S>));

    let router = router
        .layer(axum::middleware::from_fn_with_state(
            config.base_uri.clone(),
            create_request_metadata_with_trace_id_fn,
        ))
        .layer(
            ServiceBuilder::new()
                .set_x_request_id(MakeRequestUuid7)
                .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION]))
                .layer(CompressionLayer::new())
                .layer(
                    TraceLayer::new_for_http()
                        .on_failure(())
                        .make_span_with(RestMakeSpan::new(tracing::Level::INFO))
                        .on_response(trace::DefaultOnResponse::new().level(tracing::Level::DEBUG)),
                )
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    config.max_request_time(),
                ))
                .layer(CatchPanicLayer::new())
                .layer(maybe_cors_layer)
                .propagate_x_request_id(),
        )
        .with_state(state);

    if let Some(metrics_layer) = metrics_layer {
        router.layer(metrics_layer)
    } else {
        router
    }
}

/// Healthy while the catalog store answers.
async fn health<C: CatalogStore, A: Authorizer + Clone, S: SecretStore>(
    AxumState(context): AxumState<ApiContext<State<A, C, S>>>,
) -> Response {
    match C::get_server_info(context.v1_state.catalog).await {
        Ok(_) => Json(serde_json::json!({"status": "ok"})).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"status": "unavailable"})),
            )
                .into_response()
        }
    }
}

fn get_cors_layer(
    cors_origins: Option<&[String]>,
) -> Either<
    (
        axum::middleware::ResponseAxumBodyLayer,
        tower_http::cors::CorsLayer,
    ),
    tower::layer::util::Identity,
> {
    let origins = cors_origins.map(|origins| {
        origins
            .iter()
            .filter_map(|origin| {
                HeaderValue::from_str(origin)
                    .inspect_err(|e| tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin"))
                    .ok()
            })
            .collect::<Vec<_>>()
    });
    let maybe_cors_layer = option_layer(origins.map(|origins| {
        let allowed_origin = if origins
            .iter()
            .any(|origin| origin == HeaderValue::from_static("*"))
        {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        };
        tower_http::cors::CorsLayer::new()
            .allow_origin(allowed_origin)
            .allow_headers(vec![
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::USER_AGENT,
                header::IF_NONE_MATCH,
                HeaderName::from_static(X_REQUEST_ID_HEADER),
                X_USER_AGENT_HEADER_NAME,
                DATA_ACCESS_HEADER_NAME,
            ])
            .expose_headers(vec![header::ETAG])
            .allow_methods(vec![
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
    }));
    match &maybe_cors_layer {
        Either::E1(cors_layer) => {
            tracing::debug!("CORS layer enabled: {cors_layer:?}");
        }
        Either::E2(_) => {
            tracing::info!("CORS layer not enabled for REST API");
        }
    }
    maybe_cors_layer
}

/// Serve `router` on `listener` until `cancellation_token` is cancelled.
///
/// # Errors
/// Fails if the listener fails.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    cancellation_token: CancellationToken,
) -> std::io::Result<()> {
    let cancellation_future = async move {
        cancellation_token.cancelled().await;
        tracing::info!("HTTP server shutdown requested (cancellation token)");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(cancellation_future)
        .await
}
