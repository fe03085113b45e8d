use crate::{
    request_metadata::RequestMetadata,
    service::{
        ServerId,
        authz::{
            AuthorizationBackendUnavailable, Authorizer, CatalogServerAction, MustUse,
            define_action_forbidden, define_require_action_error,
        },
    },
};

// --------------------------- Errors ---------------------------
define_action_forbidden!(
    AuthZServerActionForbidden,
    "Server",
    "ServerActionForbidden",
    ServerId
);

define_require_action_error!(RequireServerActionError {
    AuthZServerActionForbidden
});

// --------------------------- Server Ops ---------------------------
#[async_trait::async_trait]
pub trait AuthZServerOps: Authorizer {
    async fn is_allowed_server_action(
        &self,
        metadata: &RequestMetadata,
        action: CatalogServerAction,
    ) -> Result<MustUse<bool>, AuthorizationBackendUnavailable> {
        self.is_allowed_server_action_impl(metadata, action)
            .await
            .map(MustUse::from)
    }

    async fn require_server_action(
        &self,
        metadata: &RequestMetadata,
        action: CatalogServerAction,
    ) -> Result<(), RequireServerActionError> {
        if self
            .is_allowed_server_action(metadata, action)
            .await?
            .into_inner()
        {
            Ok(())
        } else {
            Err(AuthZServerActionForbidden::new(
                self.server_id(),
                action,
                metadata.actor().clone(),
            )
            .into())
        }
    }
}

impl<T> AuthZServerOps for T where T: Authorizer {}
