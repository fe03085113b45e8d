use std::sync::Arc;

pub mod authn;
pub mod authz;
mod catalog_store;
pub mod credentials;
pub mod expiration;
pub mod secrets;
pub mod storage;

pub use authn::{Actor, UserId};
pub use catalog_store::*;
pub use icehouse_io::Location;
pub use secrets::{SecretId, SecretStore};

use self::{authz::Authorizer, credentials::CredentialVendingEngine, storage::StorageFactory};
pub use crate::api::{ErrorModel, IcebergErrorResponse};
use crate::{api::ThreadSafe as ServiceState, config::ServiceConfig};

mod identifier;

pub use identifier::{
    NamespaceId, ServerId, TableId, ViewId, WarehouseId, project::ProjectId, tabular::TabularId,
};

// ---------------- State ----------------
/// Everything a request handler needs. Cheap to clone.
#[derive(Clone, Debug)]
pub struct State<A: Authorizer + Clone, C: CatalogStore, S: SecretStore> {
    pub authz: A,
    pub catalog: C::State,
    pub secrets: S,
    pub config: Arc<ServiceConfig>,
    pub vending: CredentialVendingEngine,
    pub storage: StorageFactory,
}

impl<A: Authorizer + Clone, C: CatalogStore, S: SecretStore> ServiceState for State<A, C, S> {}

impl<A: Authorizer + Clone, C: CatalogStore, S: SecretStore> State<A, C, S> {
    pub fn server_id(&self) -> ServerId {
        self.authz.server_id()
    }
}
