use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_prometheus::{PrometheusMetricLayer, metrics_exporter_prometheus::PrometheusHandle};
use icehouse::{
    CancellationToken, ServiceConfig,
    api::{
        ApiContext,
        router::{RouterArgs, new_full_router, serve},
    },
    axum::{Router, routing::get},
    implementations::{CatalogState, MemoryBackend, MemorySecretStore},
    service::{
        CatalogStore, SecretStore, State,
        authn::{Authenticator, IntrospectionAuthenticator},
        authz::Authorizer,
        credentials::CredentialVendingEngine,
        expiration::ExpirationManager,
        storage::StorageFactory,
    },
    tokio, tracing,
};
use icehouse_io::memory::InMemoryStorage;

use crate::authorizer::AuthorizerEnum;

pub(crate) async fn serve_default(config: ServiceConfig) -> anyhow::Result<()> {
    let catalog = match &config.snapshot_path {
        Some(path) => CatalogState::open(path.clone()).await?,
        None => {
            tracing::warn!("No snapshot path configured, the catalog is lost on shutdown");
            CatalogState::new()
        }
    };
    let secrets = MemorySecretStore::new(catalog.clone());
    let server_id = <MemoryBackend as CatalogStore>::get_server_info(catalog.clone())
        .await?
        .server_id();
    let authorizer = AuthorizerEnum::init(config.authz_backend, server_id).await?;

    match authorizer {
        AuthorizerEnum::AllowAll(authz) => {
            tracing::info!("Using AllowAll authorizer");
            serve_with_authn(config, catalog, secrets, authz).await
        }
        AuthorizerEnum::Relations(authz) => {
            tracing::info!("Using relations authorizer");
            serve_with_authn(config, catalog, secrets, *authz).await
        }
    }
}

async fn serve_with_authn<A: Authorizer + Clone>(
    config: ServiceConfig,
    catalog: CatalogState,
    secrets: MemorySecretStore,
    authz: A,
) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.vending.timeout))
        .build()?;

    match config.authn.clone() {
        None => {
            tracing::warn!("Authentication is disabled, every request is anonymous");
            serve_inner::<MemoryBackend, _, _, IntrospectionAuthenticator>(
                config, http, catalog, secrets, authz, None,
            )
            .await
        }
        Some(authn) => {
            tracing::info!(introspection_url = %authn.introspection_url, "Authentication enabled");
            let authenticator = IntrospectionAuthenticator::new(http.clone(), authn);
            serve_inner::<MemoryBackend, _, _, _>(
                config,
                http,
                catalog,
                secrets,
                authz,
                Some(authenticator),
            )
            .await
        }
    }
}

async fn serve_inner<C: CatalogStore, A: Authorizer + Clone, S: SecretStore, N: Authenticator>(
    config: ServiceConfig,
    http: reqwest::Client,
    catalog: C::State,
    secrets: S,
    authorizer: A,
    authenticator: Option<N>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let bind_addr = SocketAddr::from((config.bind_ip, config.listen_port));
    let storage = StorageFactory::new(http.clone(), InMemoryStorage::new());
    let cancellation_token = CancellationToken::new();

    let expiration = ExpirationManager::<C, A, S>::new(
        catalog.clone(),
        authorizer.clone(),
        secrets.clone(),
        storage.clone(),
    )
    .start(config.sweep_interval());

    let metrics_layer = if config.metrics.enabled {
        let (layer, handle) = PrometheusMetricLayer::pair();
        let metrics_addr = SocketAddr::from((config.bind_ip, config.metrics.port));
        tokio::spawn(serve_metrics(metrics_addr, handle, cancellation_token.clone()));
        Some(layer)
    } else {
        None
    };

    let router = new_full_router::<C, A, S, N>(RouterArgs {
        authenticator,
        state: ApiContext {
            v1_state: State {
                authz: authorizer,
                catalog,
                secrets,
                vending: CredentialVendingEngine::new(http, config.vending.clone()),
                config: config.clone(),
                storage,
            },
        },
        metrics_layer,
    });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "Icehouse is listening");

    tokio::spawn(cancel_on_signal(cancellation_token.clone()));
    let served = serve(listener, router, cancellation_token.clone()).await;
    cancellation_token.cancel();
    expiration.stop().await;
    served?;

    tracing::info!("Icehouse stopped");
    Ok(())
}

async fn serve_metrics(
    addr: SocketAddr,
    handle: PrometheusHandle,
    cancellation_token: CancellationToken,
) {
    let router = Router::new().route("/metrics", get(move || async move { handle.render() }));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind metrics listener");
            return;
        }
    };
    tracing::info!(%addr, "Serving metrics");
    if let Err(e) = serve(listener, router, cancellation_token).await {
        tracing::error!(error = %e, "Metrics server failed");
    }
}

async fn cancel_on_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
    cancellation_token.cancel();
}
