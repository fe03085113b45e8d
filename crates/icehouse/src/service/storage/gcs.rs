use std::collections::HashMap;

use icehouse_io::{Location, gcs::GcsServiceAccountKey};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{StorageType, ValidationError, normalize_key_prefix};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct GcsProfile {
    pub bucket: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Overrides the storage JSON API endpoint.
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Vend downscoped access tokens.
    #[serde(default = "default_true")]
    pub sts_enabled: bool,
}

impl GcsProfile {
    pub(super) fn normalize(&mut self) -> Result<(), ValidationError> {
        let bucket = &self.bucket;
        let chars_ok = bucket.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')
        });
        let edges_ok = bucket.starts_with(|c: char| c.is_ascii_alphanumeric())
            && bucket.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !(3..=63).contains(&bucket.len()) || !chars_ok || !edges_ok {
            return Err(ValidationError::invalid_profile(
                "bucket",
                "Bucket must be 3 to 63 characters of lowercase letters, digits, `-`, `_` or `.`, starting and ending with a letter or digit",
            ));
        }
        if bucket.starts_with("goog") || bucket.contains("google") {
            return Err(ValidationError::invalid_profile(
                "bucket",
                "Bucket names must not start with `goog` or contain `google`",
            ));
        }
        self.key_prefix = normalize_key_prefix(self.key_prefix.as_deref())?;
        Ok(())
    }

    pub(super) fn base_location(&self) -> Result<Location, ValidationError> {
        let mut location: Location = format!("gs://{}/", self.bucket).parse()?;
        if let Some(prefix) = &self.key_prefix {
            location.push(prefix);
        }
        Ok(location)
    }

    pub(super) fn validate_credential(
        credential: Option<&super::StorageCredential>,
    ) -> Result<(), ValidationError> {
        match credential {
            Some(super::StorageCredential::Gcs(_)) => Ok(()),
            Some(other) => Err(ValidationError::CredentialMismatch {
                profile_type: StorageType::Gcs,
                credential_type: other.type_name(),
            }),
            None => Err(ValidationError::MissingCredential(StorageType::Gcs)),
        }
    }

    pub(super) fn table_config(&self) -> HashMap<String, String> {
        self.endpoint
            .iter()
            .map(|endpoint| ("gcs.service.host".to_string(), endpoint.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "credential-type", rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum GcsCredential {
    ServiceAccountKey {
        #[cfg_attr(feature = "open-api", schema(value_type = Object))]
        key: GcsServiceAccountKey,
    },
}

impl GcsCredential {
    #[must_use]
    pub fn service_account_key(&self) -> &GcsServiceAccountKey {
        let GcsCredential::ServiceAccountKey { key } = self;
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_rules() {
        let mut profile = GcsProfile {
            bucket: "tables_01".to_string(),
            key_prefix: Some("a/b/".to_string()),
            endpoint: None,
            sts_enabled: true,
        };
        profile.normalize().unwrap();
        assert_eq!(profile.base_location().unwrap().as_str(), "gs://tables_01/a/b");

        profile.bucket = "google-tables".to_string();
        assert!(profile.normalize().is_err());
        profile.bucket = "_tables".to_string();
        assert!(profile.normalize().is_err());
    }

    #[test]
    fn test_sts_enabled_by_default() {
        let profile: GcsProfile =
            serde_json::from_value(serde_json::json!({"bucket": "tables"})).unwrap();
        assert!(profile.sts_enabled);
    }
}
