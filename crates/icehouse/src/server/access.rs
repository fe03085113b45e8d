//! Storage configuration and credentials handed to clients alongside table metadata.
use std::{collections::HashMap, str::FromStr};

use icehouse_ext::catalog::rest::StorageCredential as ClientCredential;
use icehouse_io::Location;

use crate::{
    api::{
        ErrorModel, Result,
        iceberg::v1::DataAccessMode,
    },
    request_metadata::RequestMetadata,
    service::{
        ResolvedWarehouse, SecretStore, TabularId,
        credentials::{AccessLevel, CredentialScope, CredentialVendingEngine, Vended, VendingSession},
        storage::StorageProfile,
    },
};

/// Table config plus the credentials to embed in `storage-credentials`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StorageAccess {
    pub(crate) config: HashMap<String, String>,
    pub(crate) credentials: Option<Vec<ClientCredential>>,
}

/// `<base-uri>/catalog/v1/signer/<warehouse-id>/tabular-id/<tabular-id>`
pub(crate) fn signer_uri(
    metadata: &RequestMetadata,
    warehouse: &ResolvedWarehouse,
    tabular_id: TabularId,
) -> Result<url::Url> {
    let uri = format!(
        "{}/catalog/v1/signer/{}/tabular-id/{}",
        metadata.base_uri(),
        warehouse.warehouse_id,
        tabular_id.uuid()
    );
    url::Url::parse(&uri).map_err(|e| {
        ErrorModel::internal(
            format!("Failed to build signer URI `{uri}`"),
            "InvalidBaseUri",
            Some(Box::new(e)),
        )
        .into()
    })
}

fn remote_signing(
    metadata: &RequestMetadata,
    warehouse: &ResolvedWarehouse,
    tabular_id: TabularId,
) -> Result<HashMap<String, String>> {
    match &warehouse.storage_profile {
        StorageProfile::S3(profile) => Ok(profile
            .remote_signing_config(&signer_uri(metadata, warehouse, tabular_id)?)),
        _ => Ok(HashMap::new()),
    }
}

/// Resolve how the client reaches the data at `location`.
///
/// - vended credentials requested: vend, or fall back to remote signing if the
///   profile has STS disabled
/// - remote signing or nothing requested: embed no credential and advertise the
///   signer for S3 profiles
#[allow(clippy::too_many_arguments)]
pub(crate) async fn storage_access<S: SecretStore>(
    vending: &CredentialVendingEngine,
    secrets: &S,
    metadata: &RequestMetadata,
    warehouse: &ResolvedWarehouse,
    tabular_id: TabularId,
    location: &str,
    access: AccessLevel,
    data_access: DataAccessMode,
) -> Result<StorageAccess> {
    let profile = &warehouse.storage_profile;
    let mut config = profile.table_config();

    let DataAccessMode::ServerDelegated(requested) = data_access else {
        return Ok(StorageAccess {
            config,
            credentials: None,
        });
    };

    if !requested.vended_credentials {
        config.extend(remote_signing(metadata, warehouse, tabular_id)?);
        return Ok(StorageAccess {
            config,
            credentials: None,
        });
    }

    let credential = super::maybe_get_secret(warehouse.storage_secret_id, secrets).await?;
    let scope = CredentialScope {
        location: Location::from_str(location).map_err(|e| {
            ErrorModel::internal(
                format!("Stored location `{location}` is invalid"),
                "InvalidTabularLocation",
                Some(Box::new(e)),
            )
        })?,
        access,
    };
    let session = VendingSession::new(metadata.token_expires_at(), metadata.session_name());
    let vended = vending
        .vend(
            profile,
            credential.as_ref(),
            &scope,
            profile.sts_enabled(),
            &session,
        )
        .await?;

    match vended {
        Vended::Delegated(delegated) => {
            config.extend(delegated.config.clone());
            Ok(StorageAccess {
                config,
                credentials: Some(vec![ClientCredential {
                    prefix: delegated.prefix,
                    config: delegated.config,
                }]),
            })
        }
        Vended::RemoteSigning => {
            config.extend(remote_signing(metadata, warehouse, tabular_id)?);
            Ok(StorageAccess {
                config,
                credentials: None,
            })
        }
    }
}
