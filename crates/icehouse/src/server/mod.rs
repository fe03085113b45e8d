mod access;
mod config;
pub(crate) mod io;
pub mod namespace;
#[cfg(feature = "s3-signer")]
mod s3_signer;
pub mod tables;
pub(crate) mod tabular;
pub mod views;

use std::marker::PhantomData;

use chrono::Utc;

use crate::{
    SecretId, WarehouseId,
    api::{ErrorModel, Result, iceberg::types::Prefix},
    request_metadata::RequestMetadata,
    service::{
        CatalogStore, ResolvedWarehouse, SecretStore,
        authz::{Authorizer, AuthzWarehouseOps, CatalogWarehouseAction},
        storage::StorageCredential,
    },
};

/// Implements the Iceberg REST services on top of a [`CatalogStore`], an [`Authorizer`]
/// and a [`SecretStore`].
#[derive(Clone, Debug)]
pub struct CatalogServer<C: CatalogStore, A: Authorizer + Clone, S: SecretStore> {
    auth_handler: PhantomData<A>,
    catalog_backend: PhantomData<C>,
    secret_store: PhantomData<S>,
}

fn require_warehouse_id(prefix: Option<&Prefix>) -> std::result::Result<WarehouseId, ErrorModel> {
    WarehouseId::from_str_or_bad_request(
        prefix
            .ok_or_else(|| {
                tracing::debug!("No prefix specified.");
                ErrorModel::bad_request(
                    "No prefix specified. The warehouse-id must be provided as prefix in the URL.",
                    "NoPrefixProvided",
                    None,
                )
            })?
            .as_str(),
    )
}

pub(crate) async fn maybe_get_secret<S: SecretStore>(
    secret: Option<SecretId>,
    secrets: &S,
) -> Result<Option<StorageCredential>> {
    if let Some(secret_id) = secret {
        Ok(Some(
            secrets
                .get_secret_by_id::<StorageCredential>(secret_id)
                .await?
                .secret,
        ))
    } else {
        Ok(None)
    }
}

/// Resolve an active warehouse and check `action` on it.
/// Soft-deleted warehouses are not reachable through the catalog API.
pub(crate) async fn require_active_warehouse<C: CatalogStore, A: Authorizer>(
    authorizer: &A,
    metadata: &RequestMetadata,
    warehouse_id: WarehouseId,
    catalog_state: C::State,
    action: CatalogWarehouseAction,
) -> Result<ResolvedWarehouse> {
    let warehouse = C::get_warehouse(warehouse_id, catalog_state)
        .await
        .map(|w| w.filter(ResolvedWarehouse::is_active));
    Ok(authorizer
        .require_warehouse_action(metadata, warehouse_id, warehouse, action)
        .await?)
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_warehouse_id() {
        let id = WarehouseId::new_random();
        assert_eq!(
            require_warehouse_id(Some(&Prefix(id.to_string()))).unwrap(),
            id
        );
        assert_eq!(require_warehouse_id(None).unwrap_err().code, 400);
        assert_eq!(
            require_warehouse_id(Some(&Prefix("not-a-uuid".to_string())))
                .unwrap_err()
                .code,
            400
        );
    }
}
