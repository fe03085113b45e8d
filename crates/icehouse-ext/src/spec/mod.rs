//! Minimal Iceberg table and view metadata model. Only what the catalog must track
//! is modelled; manifests and data files are opaque to it.
mod partition;
mod schema;
mod table_metadata;
mod view_metadata;

pub use partition::{
    PARTITION_DATA_ID_START, PartitionField, PartitionSpec, SortField, SortOrder,
    UnboundPartitionField, UnboundPartitionSpec,
};
pub use schema::{NestedField, NestedType, PrimitiveType, Schema, StructTag, Type};
pub use table_metadata::{
    LAST_ADDED, MAIN_BRANCH, MetadataLog, RequirementFailed, Snapshot, SnapshotLog,
    SnapshotRefType, SnapshotReference, TableMetadata, TableRequirement, TableUpdate,
};
pub use view_metadata::{
    SqlViewRepresentation, ViewMetadata, ViewRepresentation, ViewRequirement, ViewUpdate,
    ViewVersion, ViewVersionLog,
};

/// A metadata document or update is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SpecError {
    pub message: String,
}

impl SpecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
