use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::{ErrorKind, IcehouseStorage, IoError, Location};

/// Process-local object store. Cloning shares the underlying objects,
/// so every warehouse using the `memory` profile sees the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    fail_deletes: Arc<AtomicBool>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unavailable backend for delete operations.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    fn check_deletes_enabled(&self, location: &Location) -> Result<(), IoError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(
                IoError::new(ErrorKind::ServiceUnavailable, "Delete rejected by storage")
                    .with_location(location.as_str()),
            );
        }
        Ok(())
    }
}

fn directory_prefix(prefix: &Location) -> String {
    let mut prefix = prefix.clone();
    prefix.with_trailing_slash();
    prefix.as_str().to_string()
}

#[async_trait::async_trait]
impl IcehouseStorage for InMemoryStorage {
    async fn write(&self, location: &Location, data: Bytes) -> Result<(), IoError> {
        self.objects
            .write()
            .await
            .insert(location.as_str().to_string(), data);
        Ok(())
    }

    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        self.objects
            .read()
            .await
            .get(location.as_str())
            .cloned()
            .ok_or_else(|| {
                IoError::new(ErrorKind::NotFound, "Object not found")
                    .with_location(location.as_str())
            })
    }

    async fn list(&self, prefix: &Location) -> Result<Vec<Location>, IoError> {
        let prefix = directory_prefix(prefix);
        self.objects
            .read()
            .await
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| {
                Location::from_str(key)
                    .map_err(|e| IoError::new(ErrorKind::Unexpected, e.to_string()))
            })
            .collect()
    }

    async fn delete(&self, location: &Location) -> Result<(), IoError> {
        self.check_deletes_enabled(location)?;
        self.objects.write().await.remove(location.as_str());
        Ok(())
    }

    async fn remove_all(&self, prefix: &Location) -> Result<crate::DeleteSummary, IoError> {
        self.check_deletes_enabled(prefix)?;
        let dir = directory_prefix(prefix);
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(&dir));
        Ok(crate::DeleteSummary {
            deleted: before - objects.len(),
        })
    }
}
