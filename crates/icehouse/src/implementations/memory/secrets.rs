use chrono::Utc;
use icehouse_ext::catalog::rest::ErrorModel;
use serde::{Serialize, de::DeserializeOwned};

use super::{CatalogState, snapshot::StoredSecret};
use crate::{
    SecretId,
    api::Result,
    service::secrets::{Secret, SecretInStorage, SecretStore},
};

/// Secret store sharing the memory catalog's lock and snapshot.
#[derive(Debug, Clone)]
pub struct MemorySecretStore {
    state: CatalogState,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new(state: CatalogState) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret_by_id<S: SecretInStorage + DeserializeOwned>(
        &self,
        secret_id: SecretId,
    ) -> Result<Secret<S>> {
        let secrets = self.state.read_secrets().await;
        let stored = secrets.0.get(&secret_id).ok_or_else(|| {
            ErrorModel::not_found(
                format!("Secret '{secret_id}' not found"),
                "SecretNotFound",
                None,
            )
        })?;
        let secret = serde_json::from_value(stored.secret.clone()).map_err(|e| {
            ErrorModel::internal(
                "Stored secret has an unexpected format",
                "SecretParseError",
                Some(Box::new(e)),
            )
        })?;
        Ok(Secret {
            secret_id,
            secret,
            created_at: stored.created_at,
        })
    }

    #[tracing::instrument(skip_all)]
    async fn create_secret<S: SecretInStorage + Send + Sync + Serialize + std::fmt::Debug>(
        &self,
        secret: S,
    ) -> Result<SecretId> {
        let secret = serde_json::to_value(&secret).map_err(|e| {
            ErrorModel::internal(
                "Failed to serialize secret",
                "SecretSerializationError",
                Some(Box::new(e)),
            )
        })?;

        let guard = self.state.lock_writes().await;
        let mut secrets = self.state.read_secrets().await.as_ref().clone();
        let secret_id = SecretId::new_random();
        secrets.0.insert(
            secret_id,
            StoredSecret {
                secret,
                created_at: Utc::now(),
            },
        );
        self.state
            .install_secrets(&guard, secrets)
            .await
            .map_err(|e| ErrorModel::from(e.append_detail("Error storing secret")))?;
        Ok(secret_id)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_secret(&self, secret_id: &SecretId) -> Result<()> {
        let guard = self.state.lock_writes().await;
        let mut secrets = self.state.read_secrets().await.as_ref().clone();
        if secrets.0.remove(secret_id).is_none() {
            return Ok(());
        }
        self.state
            .install_secrets(&guard, secrets)
            .await
            .map_err(|e| ErrorModel::from(e.append_detail("Error deleting secret")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::storage::{S3AccessKeyCredential, S3Credential, StorageCredential};

    fn credential() -> StorageCredential {
        StorageCredential::S3(S3Credential::AccessKey(S3AccessKeyCredential {
            aws_access_key_id: "AKIA".to_string(),
            aws_secret_access_key: "secret".to_string(),
            external_id: None,
        }))
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = MemorySecretStore::new(CatalogState::new());
        let secret_id = store.create_secret(credential()).await.unwrap();
        let secret: Secret<StorageCredential> = store.get_secret_by_id(secret_id).await.unwrap();
        assert_eq!(secret.secret, credential());

        store.delete_secret(&secret_id).await.unwrap();
        store.delete_secret(&secret_id).await.unwrap();
        let err = store
            .get_secret_by_id::<StorageCredential>(secret_id)
            .await
            .unwrap_err();
        assert_eq!(err.error.code, 404);
    }

    #[tokio::test]
    async fn test_secrets_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let store = MemorySecretStore::new(CatalogState::open(&path).await.unwrap());
        let secret_id = store.create_secret(credential()).await.unwrap();

        let reopened = MemorySecretStore::new(CatalogState::open(&path).await.unwrap());
        let secret: Secret<StorageCredential> =
            reopened.get_secret_by_id(secret_id).await.unwrap();
        assert_eq!(secret.secret, credential());
    }
}
