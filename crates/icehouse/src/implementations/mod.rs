//! Implementations of [`crate::service::CatalogStore`] and [`crate::service::SecretStore`].
pub mod memory;

pub use memory::{CatalogState, MemoryBackend, MemorySecretStore, MemoryTransaction};
