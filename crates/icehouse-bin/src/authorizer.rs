use icehouse::{
    AuthZBackend,
    service::{ServerId, authz::AllowAllAuthorizer},
};
use icehouse_authz_relations::RelationsAuthorizer;

#[derive(Debug)]
pub(crate) enum AuthorizerEnum {
    AllowAll(AllowAllAuthorizer),
    Relations(Box<RelationsAuthorizer>),
}

impl AuthorizerEnum {
    pub(crate) async fn init(backend: AuthZBackend, server_id: ServerId) -> anyhow::Result<Self> {
        match backend {
            AuthZBackend::AllowAll => Ok(AuthorizerEnum::AllowAll(AllowAllAuthorizer { server_id })),
            AuthZBackend::Relations => Ok(AuthorizerEnum::Relations(Box::new(
                icehouse_authz_relations::new_authorizer_from_default_config(server_id).await?,
            ))),
        }
    }
}
