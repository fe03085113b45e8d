#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![allow(clippy::module_name_repetitions)]
#![forbid(unsafe_code)]

use bytes::Bytes;

#[cfg(feature = "storage-adls")]
pub mod adls;
mod auth;
mod error;
#[cfg(feature = "storage-gcs")]
pub mod gcs;
mod location;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;

pub use auth::AccessToken;
pub use error::{ErrorKind, IoError};
pub use location::{InvalidLocationError, Location};

/// Summary of a recursive delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub deleted: usize,
}

/// Minimal object store surface the catalog needs: writing metadata files
/// and removing everything below a prefix once an entity is purged.
#[async_trait::async_trait]
pub trait IcehouseStorage
where
    Self: Send + Sync + std::fmt::Debug,
{
    async fn write(&self, location: &Location, data: Bytes) -> Result<(), IoError>;

    async fn read(&self, location: &Location) -> Result<Bytes, IoError>;

    /// List all objects below `prefix`. The prefix is treated as a directory.
    async fn list(&self, prefix: &Location) -> Result<Vec<Location>, IoError>;

    /// Delete a single object. Deleting a missing object is not an error.
    async fn delete(&self, location: &Location) -> Result<(), IoError>;

    /// Delete every object below `prefix`.
    async fn remove_all(&self, prefix: &Location) -> Result<DeleteSummary, IoError> {
        let objects = self.list(prefix).await?;
        let mut summary = DeleteSummary::default();
        for object in objects {
            self.delete(&object).await?;
            summary.deleted += 1;
        }
        Ok(summary)
    }
}

/// Storage client resolved for one warehouse.
#[derive(Debug, Clone, derive_more::From)]
pub enum StorageBackend {
    Memory(memory::InMemoryStorage),
    #[cfg(feature = "storage-s3")]
    S3(s3::S3Storage),
    #[cfg(feature = "storage-adls")]
    Adls(adls::AdlsStorage),
    #[cfg(feature = "storage-gcs")]
    Gcs(gcs::GcsStorage),
}

macro_rules! dispatch {
    ($self:ident, $storage:ident => $body:expr) => {
        match $self {
            StorageBackend::Memory($storage) => $body,
            #[cfg(feature = "storage-s3")]
            StorageBackend::S3($storage) => $body,
            #[cfg(feature = "storage-adls")]
            StorageBackend::Adls($storage) => $body,
            #[cfg(feature = "storage-gcs")]
            StorageBackend::Gcs($storage) => $body,
        }
    };
}

#[async_trait::async_trait]
impl IcehouseStorage for StorageBackend {
    async fn write(&self, location: &Location, data: Bytes) -> Result<(), IoError> {
        dispatch!(self, s => s.write(location, data).await)
    }

    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        dispatch!(self, s => s.read(location).await)
    }

    async fn list(&self, prefix: &Location) -> Result<Vec<Location>, IoError> {
        dispatch!(self, s => s.list(prefix).await)
    }

    async fn delete(&self, location: &Location) -> Result<(), IoError> {
        dispatch!(self, s => s.delete(location).await)
    }

    async fn remove_all(&self, prefix: &Location) -> Result<DeleteSummary, IoError> {
        dispatch!(self, s => s.remove_all(prefix).await)
    }
}

/// Map a non-success HTTP status from a storage or identity endpoint.
#[must_use]
pub fn error_from_status(
    status: reqwest::StatusCode,
    body: &str,
    location: Option<&str>,
) -> IoError {
    let kind = match status {
        reqwest::StatusCode::NOT_FOUND => ErrorKind::NotFound,
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            ErrorKind::PermissionDenied
        }
        reqwest::StatusCode::PRECONDITION_FAILED | reqwest::StatusCode::CONFLICT => {
            ErrorKind::ConditionNotMatch
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
        reqwest::StatusCode::REQUEST_TIMEOUT | reqwest::StatusCode::GATEWAY_TIMEOUT => {
            ErrorKind::RequestTimeout
        }
        s if s.is_server_error() => ErrorKind::ServiceUnavailable,
        _ => ErrorKind::Unexpected,
    };
    let mut error = IoError::new(kind, format!("Request failed with status {status}"));
    if let Some(location) = location {
        error = error.with_location(location);
    }
    if body.is_empty() {
        error
    } else {
        error.with_context(body.chars().take(512).collect::<String>())
    }
}

/// Map a transport failure of an HTTP call.
#[must_use]
pub fn error_from_reqwest(err: reqwest::Error, location: Option<&str>) -> IoError {
    let kind = if err.is_timeout() {
        ErrorKind::RequestTimeout
    } else if err.is_connect() {
        ErrorKind::ServiceUnavailable
    } else {
        ErrorKind::Unexpected
    };
    let mut error = IoError::new(kind, "HTTP request failed").with_source(err);
    if let Some(location) = location {
        error = error.with_location(location);
    }
    error
}
