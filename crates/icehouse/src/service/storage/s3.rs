use std::collections::HashMap;

use icehouse_io::{
    Location,
    s3::{S3AccessKeyAuth, S3Auth, S3AwsSystemIdentityAuth, S3Settings},
};
use serde::{Deserialize, Serialize};
use url::Url;
use veil::Redact;

use super::{StorageType, ValidationError, normalize_key_prefix};

const SIGNER_ENDPOINT: &str = "v1/aws/s3/sign";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum S3Flavor {
    #[default]
    Aws,
    /// S3 compatible stores such as MinIO. Role ARNs are optional for STS.
    #[serde(alias = "s3-compat")]
    Minio,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct S3Profile {
    pub bucket: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<Url>,
    #[serde(default)]
    pub path_style_access: Option<bool>,
    #[serde(default)]
    pub sts_enabled: bool,
    /// Role assumed with the scoped session policy when vending credentials.
    #[serde(default)]
    pub sts_role_arn: Option<String>,
    /// Role assumed with the warehouse credential before anything else.
    #[serde(default)]
    pub assume_role_arn: Option<String>,
    #[serde(default)]
    pub flavor: S3Flavor,
    /// Accept `s3a://` and `s3n://` table locations.
    #[serde(default)]
    pub allow_alternative_protocols: bool,
}

impl S3Profile {
    pub(super) fn normalize(&mut self) -> Result<(), ValidationError> {
        icehouse_io::s3::validate_bucket_name(&self.bucket)
            .map_err(|reason| ValidationError::invalid_profile("bucket", reason))?;
        icehouse_io::s3::validate_region(&self.region)
            .map_err(|reason| ValidationError::invalid_profile("region", reason))?;
        self.key_prefix = normalize_key_prefix(self.key_prefix.as_deref())?;

        if let Some(endpoint) = &mut self.endpoint {
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(ValidationError::invalid_profile(
                    "endpoint",
                    "Endpoint must use http or https",
                ));
            }
            if endpoint.path() != "/" && !endpoint.path().is_empty() {
                return Err(ValidationError::invalid_profile(
                    "endpoint",
                    "Endpoint must not contain a path",
                ));
            }
            endpoint.set_path("/");
        }

        for (entity, arn) in [
            ("sts-role-arn", &self.sts_role_arn),
            ("assume-role-arn", &self.assume_role_arn),
        ] {
            if let Some(arn) = arn {
                if !arn.starts_with("arn:") {
                    return Err(ValidationError::invalid_profile(
                        entity,
                        format!("`{arn}` is not an ARN"),
                    ));
                }
            }
        }

        if self.sts_enabled
            && self.flavor == S3Flavor::Aws
            && self.sts_role_arn.is_none()
            && self.assume_role_arn.is_none()
        {
            return Err(ValidationError::invalid_profile(
                "sts-role-arn",
                "`sts-role-arn` or `assume-role-arn` is required when STS is enabled for AWS",
            ));
        }
        Ok(())
    }

    pub(super) fn base_location(&self) -> Result<Location, ValidationError> {
        let mut location: Location = format!("s3://{}/", self.bucket).parse()?;
        if let Some(prefix) = &self.key_prefix {
            location.push(prefix);
        }
        Ok(location)
    }

    pub(super) fn validate_credential(
        credential: Option<&super::StorageCredential>,
    ) -> Result<(), ValidationError> {
        match credential {
            Some(super::StorageCredential::S3(_)) => Ok(()),
            Some(other) => Err(ValidationError::CredentialMismatch {
                profile_type: StorageType::S3,
                credential_type: other.type_name(),
            }),
            None => Err(ValidationError::MissingCredential(StorageType::S3)),
        }
    }

    pub(super) fn allows_scheme(&self, scheme: &str) -> bool {
        scheme == "s3" || (self.allow_alternative_protocols && matches!(scheme, "s3a" | "s3n"))
    }

    #[must_use]
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings::builder()
            .assume_role_arn(self.assume_role_arn.clone())
            .endpoint(self.endpoint.clone())
            .region(self.region.clone())
            .path_style_access(self.path_style_access)
            .build()
    }

    pub(super) fn table_config(&self) -> HashMap<String, String> {
        let mut config = HashMap::from([
            ("s3.region".to_string(), self.region.clone()),
            ("client.region".to_string(), self.region.clone()),
        ]);
        if let Some(endpoint) = &self.endpoint {
            config.insert("s3.endpoint".to_string(), endpoint.to_string());
        }
        if let Some(path_style) = self.path_style_access {
            config.insert("s3.path-style-access".to_string(), path_style.to_string());
        }
        config
    }

    /// Table config directing clients to the signer of a single tabular.
    #[must_use]
    pub fn remote_signing_config(&self, signer_uri: &Url) -> HashMap<String, String> {
        HashMap::from([
            ("s3.remote-signing-enabled".to_string(), "true".to_string()),
            ("s3.signer.uri".to_string(), signer_uri.to_string()),
            ("s3.signer.endpoint".to_string(), SIGNER_ENDPOINT.to_string()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "credential-type", rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum S3Credential {
    AccessKey(S3AccessKeyCredential),
    /// Use the identity of the host the catalog runs on.
    AwsSystemIdentity(S3SystemIdentityCredential),
}

#[derive(Redact, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct S3AccessKeyCredential {
    pub aws_access_key_id: String,
    #[redact(partial)]
    pub aws_secret_access_key: String,
    #[serde(default)]
    #[redact(partial)]
    pub external_id: Option<String>,
}

#[derive(Redact, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct S3SystemIdentityCredential {
    #[serde(default)]
    #[redact(partial)]
    pub external_id: Option<String>,
}

impl S3Credential {
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        match self {
            S3Credential::AccessKey(S3AccessKeyCredential { external_id, .. })
            | S3Credential::AwsSystemIdentity(S3SystemIdentityCredential { external_id }) => {
                external_id.as_deref()
            }
        }
    }
}

impl From<&S3Credential> for S3Auth {
    fn from(value: &S3Credential) -> Self {
        match value {
            S3Credential::AccessKey(key) => S3Auth::AccessKey(
                S3AccessKeyAuth::builder()
                    .aws_access_key_id(key.aws_access_key_id.clone())
                    .aws_secret_access_key(key.aws_secret_access_key.clone())
                    .external_id(key.external_id.clone())
                    .build(),
            ),
            S3Credential::AwsSystemIdentity(identity) => {
                S3Auth::AwsSystemIdentity(S3AwsSystemIdentityAuth {
                    external_id: identity.external_id.clone(),
                })
            }
        }
    }
}
