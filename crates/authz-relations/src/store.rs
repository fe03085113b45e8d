use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A single relationship: `subject` has `relation` on `object`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tuple {
    pub object: String,
    pub relation: String,
    pub subject: String,
}

impl Tuple {
    #[must_use]
    pub fn new(
        object: impl Into<String>,
        relation: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            object: object.into(),
            relation: relation.into(),
            subject: subject.into(),
        }
    }
}

/// Matches tuples on every field that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleFilter {
    pub object: Option<String>,
    pub relation: Option<String>,
    pub subject: Option<String>,
}

impl TupleFilter {
    #[must_use]
    pub fn object(object: impl Into<String>) -> Self {
        Self {
            object: Some(object.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    fn matches(&self, tuple: &Tuple) -> bool {
        self.object.as_ref().is_none_or(|o| *o == tuple.object)
            && self.relation.as_ref().is_none_or(|r| *r == tuple.relation)
            && self.subject.as_ref().is_none_or(|s| *s == tuple.subject)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read tuple snapshot `{path}`")]
    ReadSnapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write tuple snapshot `{path}`")]
    WriteSnapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Tuple snapshot `{path}` is corrupt")]
    CorruptSnapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Tuple store is unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for relationship tuples.
///
/// `write` applies `deletes` and then `writes` as one unit. Writing a tuple that
/// exists or deleting one that does not is not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TupleStore: Send + Sync + 'static {
    async fn write(&self, writes: Vec<Tuple>, deletes: Vec<Tuple>) -> Result<(), StoreError>;

    async fn read(&self, filter: TupleFilter) -> Result<Vec<Tuple>, StoreError>;
}

/// Keeps all tuples in memory, optionally mirrored to a JSON file.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTupleStore {
    tuples: Arc<RwLock<BTreeSet<Tuple>>>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryTupleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load tuples from `path` and persist every later write there.
    /// A missing file starts an empty store.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let tuples = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<BTreeSet<Tuple>>(&bytes).map_err(|source| {
                StoreError::CorruptSnapshot {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(source) => return Err(StoreError::ReadSnapshot { path, source }),
        };
        tracing::debug!(path = %path.display(), tuples = tuples.len(), "Opened tuple store");
        Ok(Self {
            tuples: Arc::new(RwLock::new(tuples)),
            snapshot_path: Some(path),
        })
    }

    async fn persist(path: &Path, tuples: &BTreeSet<Tuple>) -> Result<(), StoreError> {
        let write_error = |source: std::io::Error| StoreError::WriteSnapshot {
            path: path.to_path_buf(),
            source,
        };
        let bytes = serde_json::to_vec(tuples).map_err(|e| write_error(e.into()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await.map_err(write_error)?;
        tokio::fs::rename(&tmp, path).await.map_err(write_error)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TupleStore for InMemoryTupleStore {
    async fn write(&self, writes: Vec<Tuple>, deletes: Vec<Tuple>) -> Result<(), StoreError> {
        let mut guard = self.tuples.write().await;
        let mut next = guard.clone();
        for tuple in &deletes {
            next.remove(tuple);
        }
        next.extend(writes);

        if let Some(path) = &self.snapshot_path {
            Self::persist(path, &next).await?;
        }
        *guard = next;
        Ok(())
    }

    async fn read(&self, filter: TupleFilter) -> Result<Vec<Tuple>, StoreError> {
        let guard = self.tuples.read().await;
        Ok(guard.iter().filter(|t| filter.matches(t)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_write_is_idempotent_and_deletes_first() {
        let store = InMemoryTupleStore::new();
        let tuple = Tuple::new("warehouse:1", "select", "user:alice");
        store
            .write(vec![tuple.clone(), tuple.clone()], vec![])
            .await
            .unwrap();
        assert_eq!(store.read(TupleFilter::default()).await.unwrap().len(), 1);

        // Deleting and re-writing the same tuple in one call keeps it.
        store
            .write(vec![tuple.clone()], vec![tuple.clone()])
            .await
            .unwrap();
        assert_eq!(store.read(TupleFilter::default()).await.unwrap(), vec![tuple.clone()]);

        store.write(vec![], vec![tuple]).await.unwrap();
        assert!(store.read(TupleFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_filters() {
        let store = InMemoryTupleStore::new();
        store
            .write(
                vec![
                    Tuple::new("table:1", "parent", "namespace:1"),
                    Tuple::new("table:1", "modify", "user:alice"),
                    Tuple::new("table:2", "parent", "namespace:1"),
                ],
                vec![],
            )
            .await
            .unwrap();

        let children = store
            .read(
                TupleFilter::default()
                    .with_relation("parent")
                    .with_subject("namespace:1"),
            )
            .await
            .unwrap();
        assert_eq!(children.len(), 2);

        let grants = store
            .read(TupleFilter::object("table:1").with_relation("modify"))
            .await
            .unwrap();
        assert_eq!(grants, vec![Tuple::new("table:1", "modify", "user:alice")]);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authz").join("tuples.json");

        let store = InMemoryTupleStore::open(path.clone()).await.unwrap();
        store
            .write(vec![Tuple::new("server:1", "ownership", "user:root")], vec![])
            .await
            .unwrap();

        let reopened = InMemoryTupleStore::open(path).await.unwrap();
        assert_eq!(
            reopened.read(TupleFilter::default()).await.unwrap(),
            vec![Tuple::new("server:1", "ownership", "user:root")]
        );
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuples.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let err = InMemoryTupleStore::open(path).await.unwrap_err();
        assert!(matches!(err, StoreError::CorruptSnapshot { .. }));
    }
}
