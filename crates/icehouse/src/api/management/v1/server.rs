use icehouse_ext::catalog::rest::ErrorModel;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    api::{ApiContext, Result, management::v1::ApiServer},
    request_metadata::RequestMetadata,
    service::{CatalogStore, SecretStore, ServerId, State, Transaction, authz::Authorizer},
};

#[derive(Debug, Deserialize, TypedBuilder)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct BootstrapRequest {
    /// Set to true if you accept the terms of use.
    #[builder(setter(strip_bool))]
    pub accept_terms_of_use: bool,
    /// If set to true, the calling principal is treated as an operator and obtains
    /// a corresponding role. If not specified, the principal is treated as a human.
    #[serde(default)]
    #[builder(setter(strip_bool))]
    pub is_operator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub struct ServerInfo {
    /// Version of the server.
    pub version: String,
    /// Whether the catalog has been bootstrapped.
    pub bootstrapped: bool,
    /// ID of the server.
    #[cfg_attr(feature = "open-api", schema(value_type = uuid::Uuid))]
    pub server_id: ServerId,
    /// Name of the authorization backend in use.
    pub authz_backend: String,
}

impl<C: CatalogStore, A: Authorizer, S: SecretStore> Service<C, A, S> for ApiServer<C, A, S> {}

#[async_trait::async_trait]
pub trait Service<C: CatalogStore, A: Authorizer, S: SecretStore> {
    async fn bootstrap(
        state: ApiContext<State<A, C, S>>,
        request_metadata: RequestMetadata,
        request: BootstrapRequest,
    ) -> Result<()> {
        let BootstrapRequest {
            accept_terms_of_use,
            is_operator,
        } = request;

        if !accept_terms_of_use {
            return Err(ErrorModel::bad_request(
                "You must accept the terms of use to bootstrap the catalog.",
                "TermsOfUseNotAccepted",
                None,
            )
            .into());
        }

        // ------------------- AUTHZ -------------------
        let authorizer = state.v1_state.authz;
        authorizer.can_bootstrap(&request_metadata).await?;

        // ------------------- BUSINESS LOGIC -------------------
        let server_info = C::get_server_info(state.v1_state.catalog.clone()).await?;
        if server_info.is_bootstrapped() {
            tracing::debug!("Catalog is bootstrapped already, skipping");
            return Ok(());
        }

        let mut t = C::Transaction::begin_write(state.v1_state.catalog.clone()).await?;
        let success = C::bootstrap(accept_terms_of_use, t.transaction()).await?;
        if !success {
            // Another request won the race.
            t.rollback().await?;
            return Ok(());
        }
        t.commit().await?;

        authorizer.bootstrap(&request_metadata, is_operator).await?;
        tracing::info!(
            actor = ?request_metadata.actor(),
            is_operator,
            "Catalog bootstrapped"
        );
        Ok(())
    }

    async fn server_info(
        state: ApiContext<State<A, C, S>>,
        _request_metadata: RequestMetadata,
    ) -> Result<ServerInfo> {
        let server_info = C::get_server_info(state.v1_state.catalog.clone()).await?;

        Ok(ServerInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            bootstrapped: server_info.is_bootstrapped(),
            server_id: server_info.server_id(),
            authz_backend: A::implementation_name().to_string(),
        })
    }
}
