use chrono::{DateTime, Utc};
use http::StatusCode;
use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};

use super::{
    CatalogBackendError, define_transparent_error, impl_error_stack_methods, impl_from_with_detail,
};
use crate::ProjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetProjectResponse {
    pub project_id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Project '{project_id}' does not exist")]
pub struct ProjectIdNotFound {
    pub project_id: ProjectId,
    pub stack: Vec<String>,
}
impl ProjectIdNotFound {
    #[must_use]
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(ProjectIdNotFound);

impl From<ProjectIdNotFound> for ErrorModel {
    fn from(err: ProjectIdNotFound) -> Self {
        ErrorModel::builder()
            .r#type("ProjectNotFound")
            .code(StatusCode::NOT_FOUND.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

impl From<ProjectIdNotFound> for IcebergErrorResponse {
    fn from(err: ProjectIdNotFound) -> Self {
        ErrorModel::from(err).into()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Project '{project_id}' already exists")]
pub struct ProjectIdAlreadyExists {
    pub project_id: ProjectId,
    pub stack: Vec<String>,
}
impl ProjectIdAlreadyExists {
    #[must_use]
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(ProjectIdAlreadyExists);

impl From<ProjectIdAlreadyExists> for ErrorModel {
    fn from(err: ProjectIdAlreadyExists) -> Self {
        ErrorModel::builder()
            .r#type("ProjectAlreadyExists")
            .code(StatusCode::CONFLICT.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

impl From<ProjectIdAlreadyExists> for IcebergErrorResponse {
    fn from(err: ProjectIdAlreadyExists) -> Self {
        ErrorModel::from(err).into()
    }
}

/// Soft-deleted warehouses count: they still own storage until purged.
#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Project '{project_id}' still has {warehouse_count} warehouse(s), including soft-deleted ones")]
pub struct ProjectNotEmpty {
    pub project_id: ProjectId,
    pub warehouse_count: usize,
    pub stack: Vec<String>,
}
impl ProjectNotEmpty {
    #[must_use]
    pub fn new(project_id: ProjectId, warehouse_count: usize) -> Self {
        Self {
            project_id,
            warehouse_count,
            stack: Vec::new(),
        }
    }
}
impl_error_stack_methods!(ProjectNotEmpty);

impl From<ProjectNotEmpty> for ErrorModel {
    fn from(err: ProjectNotEmpty) -> Self {
        ErrorModel::builder()
            .r#type("ProjectNotEmpty")
            .code(StatusCode::CONFLICT.as_u16())
            .message(err.to_string())
            .stack(err.stack)
            .build()
    }
}

define_transparent_error! {
    pub enum CreateProjectError,
    stack_message: "Error creating project",
    variants: [
        CatalogBackendError,
        ProjectIdAlreadyExists,
    ]
}

define_transparent_error! {
    pub enum RenameProjectError,
    stack_message: "Error renaming project",
    variants: [
        CatalogBackendError,
        ProjectIdNotFound,
    ]
}

define_transparent_error! {
    pub enum DeleteProjectError,
    stack_message: "Error deleting project",
    variants: [
        CatalogBackendError,
        ProjectIdNotFound,
        ProjectNotEmpty,
    ]
}
