use chrono::{DateTime, Utc};
use http::StatusCode;
use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};
use serde::{Deserialize, Serialize};

use super::{
    CatalogBackendError, ProjectIdNotFound, define_transparent_error, impl_error_stack_methods,
    impl_from_with_detail,
};
use crate::{
    ProjectId, SecretId, WarehouseId,
    service::{catalog_store::define_version_newtype, storage::StorageProfile},
};

/// Status of a warehouse
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum_macros::Display,
    strum_macros::EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum WarehouseStatus {
    /// The warehouse is active and can be used
    Active,
    /// The warehouse is soft-deleted and waits for its purge.
    Deleted,
}

/// What happens to a warehouse, table or view when it is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum DeleteProfile {
    /// Purge immediately.
    Hard,
    /// Keep the entity restorable for `expiration_seconds`.
    #[serde(rename_all = "kebab-case")]
    Soft { expiration_seconds: u64 },
}

impl Default for DeleteProfile {
    fn default() -> Self {
        DeleteProfile::Soft {
            expiration_seconds: 7 * 24 * 3600,
        }
    }
}

impl DeleteProfile {
    /// Expiry of an entity deleted at `deleted_at`, `None` for hard deletes.
    #[must_use]
    pub fn expires_at(&self, deleted_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            DeleteProfile::Hard => None,
            DeleteProfile::Soft { expiration_seconds } => Some(
                deleted_at
                    + chrono::Duration::seconds(
                        i64::try_from(*expiration_seconds).unwrap_or(i64::MAX / 1000),
                    ),
            ),
        }
    }
}

/// Soft-deletion state of a warehouse, table or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct DeletionInfo {
    pub deleted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Remove the data of a table or view on purge.
    #[serde(default)]
    pub purge_requested: bool,
}

impl DeletionInfo {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

define_version_newtype!(WarehouseVersion);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWarehouse {
    /// ID of the warehouse.
    pub warehouse_id: WarehouseId,
    /// Name of the warehouse.
    pub name: String,
    /// Project ID in which the warehouse is created.
    pub project_id: ProjectId,
    /// Storage profile used for the warehouse.
    pub storage_profile: StorageProfile,
    /// Storage secret ID used for the warehouse.
    pub storage_secret_id: Option<SecretId>,
    pub status: WarehouseStatus,
    pub delete_profile: DeleteProfile,
    /// Set while the warehouse is soft-deleted.
    pub deletion: Option<DeletionInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Increments on each update to the warehouse.
    pub version: WarehouseVersion,
}

impl ResolvedWarehouse {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == WarehouseStatus::Active
    }
}

/// Result of deleting a warehouse.
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseDeletion {
    SoftDeleted(ResolvedWarehouse),
    /// Metadata is gone, storage below the base location is left for the caller.
    Purged(ResolvedWarehouse),
}

// --------------------------- GENERAL ERROR ---------------------------
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("A warehouse with id '{warehouse_id}' does not exist")]
pub struct WarehouseIdNotFound {
    pub warehouse_id: WarehouseId,
    pub stack: Vec<String>,
}
impl WarehouseIdNotFound {
    #[must_use]
    pub fn new(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(WarehouseIdNotFound);

impl From<WarehouseIdNotFound> for ErrorModel {
    fn from(err: WarehouseIdNotFound) -> Self {
        ErrorModel::builder()
            .r#type("WarehouseNotFound")
            .code(StatusCode::NOT_FOUND.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

impl From<WarehouseIdNotFound> for IcebergErrorResponse {
    fn from(err: WarehouseIdNotFound) -> Self {
        ErrorModel::from(err).into()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("A warehouse '{warehouse_name}' does not exist")]
pub struct WarehouseNameNotFound {
    pub warehouse_name: String,
    pub stack: Vec<String>,
}
impl WarehouseNameNotFound {
    #[must_use]
    pub fn new(warehouse_name: impl Into<String>) -> Self {
        Self {
            warehouse_name: warehouse_name.into(),
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(WarehouseNameNotFound);

impl From<WarehouseNameNotFound> for ErrorModel {
    fn from(err: WarehouseNameNotFound) -> Self {
        ErrorModel::builder()
            .r#type("WarehouseNotFound")
            .code(StatusCode::NOT_FOUND.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

impl From<WarehouseNameNotFound> for IcebergErrorResponse {
    fn from(err: WarehouseNameNotFound) -> Self {
        ErrorModel::from(err).into()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("A warehouse with the name '{warehouse_name}' already exists in project '{project_id}'")]
pub struct WarehouseAlreadyExists {
    pub warehouse_name: String,
    pub project_id: ProjectId,
    pub stack: Vec<String>,
}
impl WarehouseAlreadyExists {
    #[must_use]
    pub fn new(warehouse_name: impl Into<String>, project_id: ProjectId) -> Self {
        Self {
            warehouse_name: warehouse_name.into(),
            project_id,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(WarehouseAlreadyExists);

impl From<WarehouseAlreadyExists> for ErrorModel {
    fn from(err: WarehouseAlreadyExists) -> Self {
        ErrorModel::builder()
            .r#type("WarehouseAlreadyExists")
            .code(StatusCode::CONFLICT.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error(
    "Warehouse '{warehouse_id}' still contains namespaces, tables or views. Use `force` to delete it with its content"
)]
pub struct WarehouseNotEmpty {
    pub warehouse_id: WarehouseId,
    pub stack: Vec<String>,
}
impl WarehouseNotEmpty {
    #[must_use]
    pub fn new(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(WarehouseNotEmpty);

impl From<WarehouseNotEmpty> for ErrorModel {
    fn from(err: WarehouseNotEmpty) -> Self {
        ErrorModel::builder()
            .r#type("WarehouseNotEmpty")
            .code(StatusCode::CONFLICT.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

// --------------------------- CREATE ERROR ---------------------------
define_transparent_error! {
    pub enum CreateWarehouseError,
    stack_message: "Error creating warehouse",
    variants: [
        CatalogBackendError,
        ProjectIdNotFound,
        WarehouseAlreadyExists,
    ]
}

// --------------------------- RENAME ERROR ---------------------------
define_transparent_error! {
    pub enum RenameWarehouseError,
    stack_message: "Error renaming warehouse",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        WarehouseAlreadyExists,
    ]
}

// --------------------------- DELETE ERROR ---------------------------
define_transparent_error! {
    pub enum DeleteWarehouseError,
    stack_message: "Error deleting warehouse",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        WarehouseNotEmpty,
    ]
}

// --------------------------- UPDATE ERROR ---------------------------
define_transparent_error! {
    pub enum UpdateWarehouseError,
    stack_message: "Error updating warehouse",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
    ]
}

// --------------------------- RESTORE ERROR ---------------------------
define_transparent_error! {
    pub enum RestoreWarehouseError,
    stack_message: "Error restoring warehouse",
    variants: [
        CatalogBackendError,
        WarehouseIdNotFound,
        WarehouseAlreadyExists,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_profile_wire_format() {
        let soft: DeleteProfile =
            serde_json::from_value(serde_json::json!({"type": "soft", "expiration-seconds": 2}))
                .unwrap();
        assert_eq!(
            soft,
            DeleteProfile::Soft {
                expiration_seconds: 2
            }
        );
        let hard: DeleteProfile =
            serde_json::from_value(serde_json::json!({"type": "hard"})).unwrap();
        assert_eq!(hard, DeleteProfile::Hard);
        assert_eq!(
            serde_json::to_value(soft).unwrap(),
            serde_json::json!({"type": "soft", "expiration-seconds": 2})
        );
    }

    #[test]
    fn test_expires_at() {
        let now = Utc::now();
        assert_eq!(DeleteProfile::Hard.expires_at(now), None);
        let soft = DeleteProfile::Soft {
            expiration_seconds: 60,
        };
        assert_eq!(soft.expires_at(now), Some(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_not_empty_is_conflict() {
        let err: DeleteWarehouseError = WarehouseNotEmpty::new(WarehouseId::new_random()).into();
        let model = ErrorModel::from(err);
        assert_eq!(model.code, 409);
        assert_eq!(model.stack, vec!["Error deleting warehouse"]);
    }
}
