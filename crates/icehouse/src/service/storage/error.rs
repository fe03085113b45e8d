use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};
use icehouse_io::InvalidLocationError;

use super::StorageType;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Invalid storage profile field `{entity}`: {reason}")]
    InvalidProfile { reason: String, entity: String },
    #[error("A `{credential_type}` credential cannot be used with a `{profile_type}` storage profile")]
    CredentialMismatch {
        profile_type: StorageType,
        credential_type: &'static str,
    },
    #[error("A storage credential is required for `{0}` storage profiles")]
    MissingCredential(StorageType),
    #[error("`{0}` storage profiles do not accept a storage credential")]
    UnexpectedCredential(StorageType),
    #[error("Location `{location}` is not within the warehouse location `{base}`")]
    LocationOutsideWarehouse { location: String, base: String },
    #[error(transparent)]
    InvalidLocation(#[from] InvalidLocationError),
}

impl ValidationError {
    pub(crate) fn invalid_profile(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            reason: reason.into(),
            entity: entity.into(),
        }
    }
}

impl From<ValidationError> for ErrorModel {
    fn from(err: ValidationError) -> Self {
        let r#type = match &err {
            ValidationError::InvalidProfile { .. } => "InvalidStorageProfile",
            ValidationError::CredentialMismatch { .. } => "StorageCredentialMismatch",
            ValidationError::MissingCredential(_) => "MissingStorageCredential",
            ValidationError::UnexpectedCredential(_) => "UnexpectedStorageCredential",
            ValidationError::LocationOutsideWarehouse { .. } => "LocationOutsideWarehouse",
            ValidationError::InvalidLocation(_) => "InvalidLocation",
        };
        ErrorModel::bad_request(err.to_string(), r#type, None)
    }
}

impl From<ValidationError> for IcebergErrorResponse {
    fn from(err: ValidationError) -> Self {
        ErrorModel::from(err).into()
    }
}
