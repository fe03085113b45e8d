use std::sync::Arc;

use icehouse_io::memory::InMemoryStorage;
use uuid::Uuid;

use crate::{
    ProjectId, ServiceConfig, WarehouseId,
    api::{
        ApiContext,
        management::v1::{
            ApiServer,
            project::{CreateProjectRequest, Service as _},
            server::{BootstrapRequest, Service as _},
            warehouse::{CreateWarehouseRequest, Service as _},
        },
    },
    implementations::{CatalogState, MemoryBackend, MemorySecretStore},
    request_metadata::RequestMetadata,
    service::{
        DeleteProfile, State,
        authz::Authorizer,
        credentials::CredentialVendingEngine,
        storage::{MemoryProfile, StorageCredential, StorageProfile, StorageFactory},
    },
};

mod internal_helper;
mod namespace_ops;
#[cfg(feature = "router")]
mod router;
mod vended_credentials;
mod view_ops;
mod warehouse_ops;

pub(crate) use internal_helper::*;

pub(crate) type TestContext<A> = ApiContext<State<A, MemoryBackend, MemorySecretStore>>;

#[must_use]
pub(crate) fn memory_profile() -> StorageProfile {
    MemoryProfile {
        key_prefix: Some(format!("wh-{}", Uuid::now_v7())),
    }
    .into()
}

#[derive(Debug)]
pub(crate) struct TestWarehouse {
    pub(crate) project_id: ProjectId,
    pub(crate) warehouse_id: WarehouseId,
    pub(crate) warehouse_name: String,
}

impl TestWarehouse {
    pub(crate) fn prefix(&self) -> String {
        self.warehouse_id.to_string()
    }
}

#[derive(typed_builder::TypedBuilder, Debug)]
pub(crate) struct SetupTestCatalog<A: Authorizer> {
    authorizer: A,
    #[builder(default = memory_profile())]
    storage_profile: StorageProfile,
    #[builder(default)]
    storage_credential: Option<StorageCredential>,
    #[builder(default = DeleteProfile::Hard)]
    delete_profile: DeleteProfile,
    #[builder(default)]
    vending: Option<CredentialVendingEngine>,
}

impl<A: Authorizer + Clone> SetupTestCatalog<A> {
    pub(crate) async fn setup(self) -> (TestContext<A>, TestWarehouse) {
        let ctx = get_api_context(self.authorizer, self.vending);
        let metadata = random_request_metadata();
        ApiServer::bootstrap(
            ctx.clone(),
            metadata.clone(),
            BootstrapRequest::builder()
                .accept_terms_of_use()
                .is_operator()
                .build(),
        )
        .await
        .unwrap();

        let project_id = ApiServer::create_project(
            CreateProjectRequest {
                project_name: format!("project-{}", Uuid::now_v7()),
                project_id: None,
            },
            ctx.clone(),
            metadata.clone(),
        )
        .await
        .unwrap()
        .project_id;

        let warehouse_name = format!("warehouse-{}", Uuid::now_v7());
        let warehouse_id = ApiServer::create_warehouse(
            CreateWarehouseRequest {
                warehouse_name: warehouse_name.clone(),
                project_id: Some(project_id.clone()),
                storage_profile: self.storage_profile,
                storage_credential: self.storage_credential,
                delete_profile: self.delete_profile,
            },
            ctx.clone(),
            metadata,
        )
        .await
        .unwrap()
        .warehouse_id;

        (
            ctx,
            TestWarehouse {
                project_id,
                warehouse_id,
                warehouse_name,
            },
        )
    }
}

pub(crate) fn get_api_context<A: Authorizer + Clone>(
    authorizer: A,
    vending: Option<CredentialVendingEngine>,
) -> TestContext<A> {
    let catalog = CatalogState::new();
    let secrets = MemorySecretStore::new(catalog.clone());
    let config = Arc::new(ServiceConfig::default());
    let http = reqwest::Client::new();
    let vending = vending
        .unwrap_or_else(|| CredentialVendingEngine::new(http.clone(), config.vending.clone()));
    ApiContext {
        v1_state: State {
            authz: authorizer,
            catalog,
            secrets,
            config,
            vending,
            storage: StorageFactory::new(http, InMemoryStorage::new()),
        },
    }
}

pub(crate) fn random_request_metadata() -> RequestMetadata {
    RequestMetadata::new_unauthenticated()
}
