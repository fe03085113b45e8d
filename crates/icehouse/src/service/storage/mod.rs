//! Storage profiles and credentials of a warehouse.
//!
//! Both are closed unions tagged by `type`. A profile and a credential only become
//! usable together as a [`WarehouseStorage`], which is built by
//! [`StorageProfile::validate_credential`] and guarantees that the two match.
mod adls;
mod error;
mod gcs;
mod s3;

use std::collections::HashMap;

pub use adls::{AdlsProfile, AzClientCredentials, AzCredential};
pub use error::ValidationError;
pub use gcs::{GcsCredential, GcsProfile};
use icehouse_io::{
    Location, StorageBackend, adls::AdlsStorage, gcs::GcsAuth, memory::InMemoryStorage,
};
pub use s3::{S3AccessKeyCredential, S3Credential, S3Flavor, S3Profile, S3SystemIdentityCredential};
use serde::{Deserialize, Serialize};

use super::{NamespaceId, TabularId, secrets::SecretInStorage};

/// Host of every `memory://` location.
pub const MEMORY_BUCKET: &str = "icehouse";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StorageType {
    S3,
    Adls,
    Gcs,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::From)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum StorageProfile {
    S3(S3Profile),
    Adls(AdlsProfile),
    Gcs(GcsProfile),
    /// Process-local storage for development and tests.
    Memory(MemoryProfile),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct MemoryProfile {
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl StorageProfile {
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        match self {
            StorageProfile::S3(_) => StorageType::S3,
            StorageProfile::Adls(_) => StorageType::Adls,
            StorageProfile::Gcs(_) => StorageType::Gcs,
            StorageProfile::Memory(_) => StorageType::Memory,
        }
    }

    /// Validate the profile against its credential and pair them up.
    ///
    /// # Errors
    /// Fails if a field of the profile is invalid, if the credential is of the
    /// wrong type, or if a required credential is missing.
    pub fn validate_credential(
        mut self,
        credential: Option<StorageCredential>,
    ) -> Result<WarehouseStorage, ValidationError> {
        match &mut self {
            StorageProfile::S3(profile) => {
                profile.normalize()?;
                S3Profile::validate_credential(credential.as_ref())?;
            }
            StorageProfile::Adls(profile) => {
                profile.normalize()?;
                AdlsProfile::validate_credential(credential.as_ref())?;
            }
            StorageProfile::Gcs(profile) => {
                profile.normalize()?;
                GcsProfile::validate_credential(credential.as_ref())?;
            }
            StorageProfile::Memory(profile) => {
                profile.key_prefix = normalize_key_prefix(profile.key_prefix.as_deref())?;
                if credential.is_some() {
                    return Err(ValidationError::UnexpectedCredential(StorageType::Memory));
                }
            }
        }
        // Surface malformed bucket or account names now rather than on first use.
        self.base_location()?;
        Ok(WarehouseStorage {
            profile: self,
            credential,
        })
    }

    /// Root location of all data of the warehouse.
    ///
    /// # Errors
    /// Fails if the profile does not form a valid URL.
    pub fn base_location(&self) -> Result<Location, ValidationError> {
        match self {
            StorageProfile::S3(profile) => profile.base_location(),
            StorageProfile::Adls(profile) => profile.base_location(),
            StorageProfile::Gcs(profile) => profile.base_location(),
            StorageProfile::Memory(profile) => {
                let mut location: Location = format!("memory://{MEMORY_BUCKET}/").parse()?;
                if let Some(prefix) = &profile.key_prefix {
                    location.push(prefix);
                }
                Ok(location)
            }
        }
    }

    /// Whether the profile hands out delegated credentials.
    #[must_use]
    pub fn sts_enabled(&self) -> bool {
        match self {
            StorageProfile::S3(profile) => profile.sts_enabled,
            StorageProfile::Adls(profile) => profile.sas_enabled,
            StorageProfile::Gcs(profile) => profile.sts_enabled,
            StorageProfile::Memory(_) => true,
        }
    }

    /// Non-secret configuration clients need to reach the storage.
    #[must_use]
    pub fn table_config(&self) -> HashMap<String, String> {
        match self {
            StorageProfile::S3(profile) => profile.table_config(),
            StorageProfile::Gcs(profile) => profile.table_config(),
            StorageProfile::Adls(_) | StorageProfile::Memory(_) => HashMap::new(),
        }
    }

    fn allows_scheme(&self, scheme: &str) -> bool {
        match self {
            StorageProfile::S3(profile) => profile.allows_scheme(scheme),
            StorageProfile::Adls(_) => matches!(scheme, "abfss" | "abfs"),
            StorageProfile::Gcs(_) => scheme == "gs",
            StorageProfile::Memory(_) => scheme == "memory",
        }
    }

    /// Check that a client supplied location lies within the warehouse.
    ///
    /// # Errors
    /// Fails if the location is malformed or outside of the base location.
    pub fn require_location_within(&self, location: &str) -> Result<Location, ValidationError> {
        let location: Location = location.parse()?;
        let base = self.base_location()?;
        // Alternative S3 schemes address the same objects as `s3://`.
        let comparable = if location.scheme() != base.scheme() && self.allows_scheme(location.scheme())
        {
            format!(
                "{}://{}",
                base.scheme(),
                location.as_str().split_once("://").map_or("", |(_, rest)| rest)
            )
            .parse()?
        } else {
            location.clone()
        };
        if !comparable.is_sublocation_of(&base) || comparable == base {
            return Err(ValidationError::LocationOutsideWarehouse {
                location: location.to_string(),
                base: base.to_string(),
            });
        }
        Ok(location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::From)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum StorageCredential {
    S3(S3Credential),
    Az(AzCredential),
    Gcs(GcsCredential),
}

impl SecretInStorage for StorageCredential {}

impl StorageCredential {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            StorageCredential::S3(_) => "s3",
            StorageCredential::Az(_) => "az",
            StorageCredential::Gcs(_) => "gcs",
        }
    }
}

/// A storage profile together with a credential of matching type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseStorage {
    profile: StorageProfile,
    credential: Option<StorageCredential>,
}

impl WarehouseStorage {
    #[must_use]
    pub fn profile(&self) -> &StorageProfile {
        &self.profile
    }

    #[must_use]
    pub fn credential(&self) -> Option<&StorageCredential> {
        self.credential.as_ref()
    }

    #[must_use]
    pub fn into_parts(self) -> (StorageProfile, Option<StorageCredential>) {
        (self.profile, self.credential)
    }
}

/// Strip surrounding slashes and reject empty or relative segments.
pub(crate) fn normalize_key_prefix(prefix: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(prefix) = prefix.map(|p| p.trim_matches('/')) else {
        return Ok(None);
    };
    if prefix.is_empty() {
        return Ok(None);
    }
    if prefix
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(ValidationError::invalid_profile(
            "key-prefix",
            format!("`{prefix}` contains empty or relative segments"),
        ));
    }
    if prefix.chars().any(|c| c.is_control() || c == '\\') {
        return Err(ValidationError::invalid_profile(
            "key-prefix",
            "Key prefix must not contain control characters or backslashes",
        ));
    }
    Ok(Some(prefix.to_string()))
}

/// Default location of a namespace: `<base>/<namespace-id>`.
///
/// # Errors
/// Fails if the base location of the profile is invalid.
pub fn namespace_location(
    profile: &StorageProfile,
    namespace_id: NamespaceId,
) -> Result<Location, ValidationError> {
    let mut location = profile.base_location()?;
    location.push(&namespace_id.to_string());
    Ok(location)
}

/// Default location of a table or view: `<base>/<namespace-id>/<tabular-id>`.
///
/// # Errors
/// Fails if the base location of the profile is invalid.
pub fn tabular_location(
    profile: &StorageProfile,
    namespace_id: NamespaceId,
    tabular_id: TabularId,
) -> Result<Location, ValidationError> {
    let mut location = namespace_location(profile, namespace_id)?;
    location.push(&tabular_id.uuid().to_string());
    Ok(location)
}

/// Builds object store clients for warehouses. The in-memory store is shared by all
/// `memory` warehouses of the process.
#[derive(Debug, Clone, Default)]
pub struct StorageFactory {
    http: reqwest::Client,
    memory: InMemoryStorage,
}

impl StorageFactory {
    #[must_use]
    pub fn new(http: reqwest::Client, memory: InMemoryStorage) -> Self {
        Self { http, memory }
    }

    #[must_use]
    pub fn memory(&self) -> &InMemoryStorage {
        &self.memory
    }

    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Client for the storage of a warehouse.
    ///
    /// # Errors
    /// Fails if the credential does not match the profile.
    pub async fn storage(
        &self,
        profile: &StorageProfile,
        credential: Option<&StorageCredential>,
    ) -> Result<StorageBackend, ValidationError> {
        match (profile, credential) {
            (StorageProfile::Memory(_), None) => Ok(self.memory.clone().into()),
            (StorageProfile::S3(profile), Some(StorageCredential::S3(credential))) => {
                let auth: icehouse_io::s3::S3Auth = credential.into();
                Ok(profile.s3_settings().get_storage_client(Some(&auth)).await.into())
            }
            (StorageProfile::Adls(profile), Some(StorageCredential::Az(credential))) => {
                Ok(AdlsStorage::new(
                    self.http.clone(),
                    profile.adls_settings(),
                    credential.into(),
                )
                .into())
            }
            (StorageProfile::Gcs(profile), Some(StorageCredential::Gcs(credential))) => {
                Ok(icehouse_io::gcs::GcsStorage::new(
                    self.http.clone(),
                    GcsAuth::ServiceAccountKey(credential.service_account_key().clone()),
                    profile.endpoint.as_ref(),
                )
                .into())
            }
            (profile, None) => Err(ValidationError::MissingCredential(profile.storage_type())),
            (profile, Some(credential)) => match profile {
                StorageProfile::Memory(_) => {
                    Err(ValidationError::UnexpectedCredential(StorageType::Memory))
                }
                _ => Err(ValidationError::CredentialMismatch {
                    profile_type: profile.storage_type(),
                    credential_type: credential.type_name(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::TableId;

    fn memory_profile(prefix: &str) -> StorageProfile {
        StorageProfile::Memory(MemoryProfile {
            key_prefix: Some(prefix.to_string()),
        })
    }

    fn s3_profile() -> StorageProfile {
        serde_json::from_value(serde_json::json!({
            "type": "s3",
            "bucket": "tests",
            "key-prefix": "wh",
            "region": "eu-central-1",
            "sts-enabled": false,
            "allow-alternative-protocols": true
        }))
        .unwrap()
    }

    fn s3_credential() -> StorageCredential {
        serde_json::from_value(serde_json::json!({
            "type": "s3",
            "credential-type": "access-key",
            "aws-access-key-id": "key",
            "aws-secret-access-key": "secret"
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_credential_matches_types() {
        assert!(s3_profile().validate_credential(Some(s3_credential())).is_ok());
        assert!(matches!(
            s3_profile().validate_credential(None),
            Err(ValidationError::MissingCredential(StorageType::S3))
        ));
        assert!(matches!(
            memory_profile("a").validate_credential(Some(s3_credential())),
            Err(ValidationError::UnexpectedCredential(StorageType::Memory))
        ));

        let az: StorageCredential = serde_json::from_value(serde_json::json!({
            "type": "az",
            "credential-type": "client-credentials",
            "client-id": "c",
            "client-secret": "s",
            "tenant-id": "t"
        }))
        .unwrap();
        assert!(matches!(
            s3_profile().validate_credential(Some(az)),
            Err(ValidationError::CredentialMismatch {
                profile_type: StorageType::S3,
                credential_type: "az"
            })
        ));
    }

    #[test]
    fn test_key_prefix_normalization() {
        assert_eq!(normalize_key_prefix(Some("/a/b/")).unwrap(), Some("a/b".to_string()));
        assert_eq!(normalize_key_prefix(Some("/")).unwrap(), None);
        assert!(normalize_key_prefix(Some("a//b")).is_err());
        assert!(normalize_key_prefix(Some("a/../b")).is_err());
    }

    #[test]
    fn test_tabular_location_layout() {
        let profile = memory_profile("/dev/");
        let namespace_id = NamespaceId::new_random();
        let table_id = TableId::new_random();
        let location = tabular_location(&profile, namespace_id, table_id.into()).unwrap();
        assert_eq!(
            location.as_str(),
            format!("memory://icehouse/dev/{namespace_id}/{table_id}")
        );
    }

    #[test]
    fn test_require_location_within() {
        let storage = s3_profile().validate_credential(Some(s3_credential())).unwrap();
        let profile = storage.profile();
        assert!(profile.require_location_within("s3://tests/wh/ns/t").is_ok());
        assert!(profile.require_location_within("s3a://tests/wh/ns/t").is_ok());
        assert!(matches!(
            profile.require_location_within("s3://tests/other/t"),
            Err(ValidationError::LocationOutsideWarehouse { .. })
        ));
        assert!(profile.require_location_within("s3://tests/wh").is_err());
        assert!(profile.require_location_within("gs://tests/wh/t").is_err());
    }

    #[tokio::test]
    async fn test_factory_shares_memory_storage() {
        let factory = StorageFactory::default();
        let storage = factory.storage(&memory_profile("a"), None).await.unwrap();
        assert!(matches!(storage, StorageBackend::Memory(_)));
        assert!(
            factory
                .storage(&memory_profile("a"), Some(&s3_credential()))
                .await
                .is_err()
        );
    }
}
