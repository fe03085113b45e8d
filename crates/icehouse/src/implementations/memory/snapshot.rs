use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CatalogData;
use crate::{
    SecretId,
    service::{CatalogBackendError, CatalogBackendErrorType},
};

/// A stored secret. The payload is opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct StoredSecret {
    pub(super) secret: serde_json::Value,
    pub(super) created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct SecretRecords(pub(super) BTreeMap<SecretId, StoredSecret>);

#[derive(Debug, Deserialize)]
pub(super) struct Snapshot {
    pub(super) catalog: CatalogData,
    #[serde(default)]
    pub(super) secrets: SecretRecords,
}

#[derive(Debug, Serialize)]
struct SnapshotRef<'a> {
    catalog: &'a CatalogData,
    secrets: &'a SecretRecords,
}

fn persistence_error(e: impl std::error::Error + Send + Sync + 'static) -> CatalogBackendError {
    CatalogBackendError::new(e, CatalogBackendErrorType::Persistence)
}

impl Snapshot {
    /// `None` if no snapshot has been written yet.
    pub(super) async fn load(path: &Path) -> Result<Option<Self>, CatalogBackendError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(persistence_error(e)
                    .append_detail(format!("Failed to read snapshot {}", path.display())));
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            persistence_error(e).append_detail(format!("Failed to parse snapshot {}", path.display()))
        })
    }

    /// Replace the snapshot at `path`. Readers of the file never see a partial write.
    pub(super) async fn write(
        path: &Path,
        catalog: &CatalogData,
        secrets: &SecretRecords,
    ) -> Result<(), CatalogBackendError> {
        let bytes = serde_json::to_vec(&SnapshotRef { catalog, secrets })
            .map_err(|e| persistence_error(e).append_detail("Failed to serialize snapshot"))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                persistence_error(e)
                    .append_detail(format!("Failed to create directory {}", parent.display()))
            })?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await.map_err(|e| {
            persistence_error(e).append_detail(format!("Failed to write {}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            persistence_error(e).append_detail(format!("Failed to replace {}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Wrote catalog snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Snapshot::load(&dir.path().join("catalog.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.json");
        let catalog = CatalogData::new();
        let mut secrets = SecretRecords::default();
        secrets.0.insert(
            SecretId::new_random(),
            StoredSecret {
                secret: serde_json::json!({"k": "v"}),
                created_at: Utc::now(),
            },
        );

        Snapshot::write(&path, &catalog, &secrets).await.unwrap();
        let loaded = Snapshot::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.catalog, catalog);
        assert_eq!(loaded.secrets, secrets);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let err = Snapshot::load(&path).await.unwrap_err();
        assert_eq!(err.r#type, CatalogBackendErrorType::Persistence);
    }
}
