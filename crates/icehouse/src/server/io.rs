use std::str::FromStr;

use bytes::Bytes;
use icehouse_io::{IcehouseStorage, Location, StorageBackend};
use serde::Serialize;

use crate::{
    api::{ErrorModel, Result},
    service::{ResolvedWarehouse, SecretStore, storage::StorageFactory},
};

/// Storage client of a warehouse, built with the warehouse's stored credential.
pub(crate) async fn warehouse_storage<S: SecretStore>(
    factory: &StorageFactory,
    secrets: &S,
    warehouse: &ResolvedWarehouse,
) -> Result<StorageBackend> {
    let credential = super::maybe_get_secret(warehouse.storage_secret_id, secrets).await?;
    Ok(factory
        .storage(&warehouse.storage_profile, credential.as_ref())
        .await?)
}

/// Version encoded in the file name of a metadata location
/// (`<version>-<uuid>.metadata.json`).
fn metadata_version(metadata_location: &str) -> Option<u64> {
    let file_name = metadata_location.rsplit('/').next()?;
    let (version, _) = file_name.split_once('-')?;
    version.parse().ok()
}

/// Location of the next metadata file of the tabular at `tabular_location`:
/// `<tabular_location>/metadata/<version>-<uuid>.metadata.json`, where version counts up
/// from the previous metadata file.
pub(crate) fn next_metadata_location(
    tabular_location: &str,
    previous_metadata_location: Option<&str>,
) -> Result<Location> {
    let version = previous_metadata_location
        .and_then(metadata_version)
        .map_or(0, |v| v + 1);
    let mut location = Location::from_str(tabular_location).map_err(|e| {
        ErrorModel::internal(
            format!("Stored location `{tabular_location}` is invalid"),
            "InvalidTabularLocation",
            Some(Box::new(e)),
        )
    })?;
    location
        .without_trailing_slash()
        .push("metadata")
        .push(&format!(
            "{version:05}-{}.metadata.json",
            uuid::Uuid::now_v7()
        ));
    Ok(location)
}

/// Serialize and write a metadata document.
pub(crate) async fn write_metadata_file(
    storage: &StorageBackend,
    location: &Location,
    metadata: &impl Serialize,
) -> Result<()> {
    let body = serde_json::to_vec(metadata).map_err(|e| {
        ErrorModel::internal(
            "Failed to serialize metadata",
            "MetadataSerializationError",
            Some(Box::new(e)),
        )
    })?;
    storage
        .write(location, Bytes::from(body))
        .await
        .map_err(|e| ErrorModel::from_io_error(e, "Failed to write metadata file").into())
}

#[cfg(test)]
mod tests {
    use icehouse_io::memory::InMemoryStorage;

    use super::*;

    #[test]
    fn test_metadata_locations_count_up() {
        let first = next_metadata_location("memory://icehouse/ns/t", None).unwrap();
        assert!(
            first
                .as_str()
                .starts_with("memory://icehouse/ns/t/metadata/00000-")
        );
        assert!(first.as_str().ends_with(".metadata.json"));

        let second =
            next_metadata_location("memory://icehouse/ns/t/", Some(first.as_str())).unwrap();
        assert!(
            second
                .as_str()
                .starts_with("memory://icehouse/ns/t/metadata/00001-")
        );
    }

    #[tokio::test]
    async fn test_write_metadata_file() {
        let memory = InMemoryStorage::default();
        let storage = StorageBackend::from(memory.clone());
        let location = next_metadata_location("memory://icehouse/t", None).unwrap();
        write_metadata_file(&storage, &location, &serde_json::json!({"a": 1}))
            .await
            .unwrap();
        let body = storage.read(&location).await.unwrap();
        assert_eq!(&body[..], br#"{"a":1}"#);
        assert_eq!(memory.object_count().await, 1);
    }
}
