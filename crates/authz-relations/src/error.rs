use icehouse::{
    api::{ErrorModel, IcebergErrorResponse},
    service::authz::AuthorizationBackendUnavailable,
};

use crate::{ObjectType, store::StoreError};

pub type RelationsResult<T> = Result<T, RelationsError>;

#[derive(Debug, thiserror::Error)]
pub enum RelationsError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Invalid entity string `{0}`")]
    InvalidEntity(String),
    #[error("Unknown object type `{0}`")]
    UnknownType(String),
    #[error("Unexpected object type `{actual}`, expected {expected}")]
    UnexpectedObjectType {
        expected: &'static str,
        actual: ObjectType,
    },
    #[error("Parent chain of `{object}` is deeper than {max_depth} levels")]
    HierarchyTooDeep { object: String, max_depth: usize },
    #[error("Bootstrapping the relations authorizer requires an authenticated caller")]
    AuthenticationRequired,
    #[error("{}", .0.message)]
    InvalidRequest(ErrorModel),
}

impl From<ErrorModel> for RelationsError {
    fn from(err: ErrorModel) -> Self {
        RelationsError::InvalidRequest(err)
    }
}

impl From<RelationsError> for AuthorizationBackendUnavailable {
    fn from(err: RelationsError) -> Self {
        match err {
            RelationsError::Store(e) => {
                AuthorizationBackendUnavailable::new(e).append_detail("Tuple store error")
            }
            e => AuthorizationBackendUnavailable::new(e),
        }
    }
}

impl From<RelationsError> for ErrorModel {
    fn from(err: RelationsError) -> Self {
        let message = err.to_string();
        match err {
            RelationsError::Store(_) | RelationsError::HierarchyTooDeep { .. } => {
                AuthorizationBackendUnavailable::from(err).into()
            }
            RelationsError::InvalidEntity(_) => {
                ErrorModel::bad_request(message, "InvalidEntity", Some(Box::new(err)))
            }
            RelationsError::UnknownType(_) | RelationsError::UnexpectedObjectType { .. } => {
                ErrorModel::bad_request(message, "InvalidObjectType", Some(Box::new(err)))
            }
            RelationsError::AuthenticationRequired => {
                ErrorModel::unauthorized(message, "AuthenticationRequired", None)
            }
            RelationsError::InvalidRequest(e) => e,
        }
    }
}

impl From<RelationsError> for IcebergErrorResponse {
    fn from(err: RelationsError) -> Self {
        ErrorModel::from(err).into()
    }
}
