use std::collections::BTreeMap;

use aws_config::{BehaviorVersion, SdkConfig, sts::AssumeRoleProvider};
use aws_sdk_s3::{
    config::SharedCredentialsProvider,
    types::{Delete, ObjectIdentifier},
};
use bytes::Bytes;
use veil::Redact;

use crate::{DeleteSummary, ErrorKind, IcehouseStorage, IoError, Location};

const APP_NAME: &str = "icehouse";
const DELETE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Hash, Clone, PartialEq, Eq, derive_more::From)]
pub enum S3Auth {
    AccessKey(S3AccessKeyAuth),
    AwsSystemIdentity(S3AwsSystemIdentityAuth),
}

impl S3Auth {
    /// External id to present when assuming a role with this credential.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        match self {
            S3Auth::AccessKey(S3AccessKeyAuth { external_id, .. })
            | S3Auth::AwsSystemIdentity(S3AwsSystemIdentityAuth { external_id }) => {
                external_id.as_deref()
            }
        }
    }
}

#[derive(Redact, Hash, Clone, PartialEq, Eq)]
pub struct S3AwsSystemIdentityAuth {
    #[redact(partial)]
    pub external_id: Option<String>,
}

#[derive(Redact, Hash, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct S3AccessKeyAuth {
    pub aws_access_key_id: String,
    #[redact(partial)]
    pub aws_secret_access_key: String,
    #[builder(default)]
    #[redact(partial)]
    pub external_id: Option<String>,
}

#[derive(Debug, Eq, Clone, PartialEq, typed_builder::TypedBuilder)]
pub struct S3Settings {
    /// Role assumed with the base credential before any client is built.
    #[builder(default)]
    pub assume_role_arn: Option<String>,
    /// Session tags passed when assuming `assume_role_arn`.
    #[builder(default)]
    pub sts_session_tags: BTreeMap<String, String>,
    #[builder(default)]
    pub endpoint: Option<url::Url>,
    pub region: String,
    #[builder(default)]
    pub path_style_access: Option<bool>,
}

impl S3Settings {
    pub async fn get_storage_client(&self, s3_credential: Option<&S3Auth>) -> S3Storage {
        let sdk_config = self.get_sdk_config(s3_credential).await;
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if self.path_style_access.unwrap_or(false) {
            s3_builder.set_force_path_style(Some(true));
        }
        S3Storage::new(aws_sdk_s3::Client::from_conf(s3_builder.build()))
    }

    /// SDK configuration for the base credential, with `assume_role_arn`
    /// applied when configured.
    pub async fn get_sdk_config(&self, s3_credential: Option<&S3Auth>) -> SdkConfig {
        let region = aws_config::Region::new(self.region.clone());

        let sdk_config = match s3_credential {
            Some(S3Auth::AccessKey(S3AccessKeyAuth {
                aws_access_key_id,
                aws_secret_access_key,
                external_id: _,
            })) => {
                let credentials = aws_credential_types::Credentials::new(
                    aws_access_key_id,
                    aws_secret_access_key,
                    None,
                    None,
                    "icehouse-secret-storage",
                );
                let mut builder = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .app_name(app_name())
                    .credentials_provider(SharedCredentialsProvider::new(credentials));
                if let Some(endpoint) = &self.endpoint {
                    builder = builder.endpoint_url(endpoint.to_string());
                }
                builder.load().await
            }
            Some(S3Auth::AwsSystemIdentity(_)) | None => {
                let mut builder = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .app_name(app_name());
                if let Some(endpoint) = &self.endpoint {
                    builder = builder.endpoint_url(endpoint.to_string());
                }
                builder.load().await
            }
        };

        let Some(assume_role_arn) = &self.assume_role_arn else {
            return sdk_config;
        };

        let mut provider = AssumeRoleProvider::builder(assume_role_arn)
            .configure(&sdk_config)
            .session_name("icehouse-assume-role");
        if let Some(external_id) = s3_credential.and_then(S3Auth::external_id) {
            provider = provider.external_id(external_id);
        }
        if !self.sts_session_tags.is_empty() {
            provider = provider.tags(self.sts_session_tags.iter());
        }
        let provider = provider.build().await;

        sdk_config
            .into_builder()
            .credentials_provider(SharedCredentialsProvider::new(provider))
            .build()
    }
}

fn app_name() -> aws_config::AppName {
    aws_config::AppName::new(APP_NAME).unwrap_or_else(|_| unreachable!("static app name is valid"))
}

#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
}

impl S3Storage {
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

fn map_sdk_error<E, R>(err: aws_sdk_s3::error::SdkError<E, R>, location: &Location) -> IoError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    use aws_sdk_s3::error::SdkError;
    let kind = match &err {
        SdkError::TimeoutError(_) => ErrorKind::RequestTimeout,
        SdkError::DispatchFailure(_) => ErrorKind::ServiceUnavailable,
        SdkError::ServiceError(e) => {
            let message = e.err().to_string();
            if message.contains("NoSuchKey") || message.contains("NotFound") {
                ErrorKind::NotFound
            } else if message.contains("AccessDenied") {
                ErrorKind::PermissionDenied
            } else if message.contains("ExpiredToken") {
                ErrorKind::CredentialsExpired
            } else {
                ErrorKind::Unexpected
            }
        }
        _ => ErrorKind::Unexpected,
    };
    IoError::new(kind, "S3 request failed")
        .with_location(location.as_str())
        .with_source(err)
}

#[async_trait::async_trait]
impl IcehouseStorage for S3Storage {
    async fn write(&self, location: &Location, data: Bytes) -> Result<(), IoError> {
        self.client
            .put_object()
            .bucket(location.authority_host())
            .key(location.key())
            .body(data.into())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, location))?;
        Ok(())
    }

    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        let output = self
            .client
            .get_object()
            .bucket(location.authority_host())
            .key(location.key())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, location))?;
        let data = output.body.collect().await.map_err(|e| {
            IoError::new(ErrorKind::Unexpected, "Failed to read S3 object body")
                .with_location(location.as_str())
                .with_source(e)
        })?;
        Ok(data.into_bytes())
    }

    async fn list(&self, prefix: &Location) -> Result<Vec<Location>, IoError> {
        let mut dir = prefix.clone();
        dir.with_trailing_slash();
        let bucket = dir.authority_host().to_string();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(dir.key())
            .into_paginator()
            .send();

        let mut result: Vec<Location> = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| map_sdk_error(e, prefix))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    let location = format!("{}://{bucket}/{key}", dir.scheme());
                    result.push(location.parse().map_err(|e: crate::InvalidLocationError| {
                        IoError::new(ErrorKind::Unexpected, e.to_string())
                    })?);
                }
            }
        }
        Ok(result)
    }

    async fn delete(&self, location: &Location) -> Result<(), IoError> {
        self.client
            .delete_object()
            .bucket(location.authority_host())
            .key(location.key())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, location))?;
        Ok(())
    }

    async fn remove_all(&self, prefix: &Location) -> Result<DeleteSummary, IoError> {
        let objects = self.list(prefix).await?;
        tracing::debug!(prefix = prefix.as_str(), objects = objects.len(), "Deleting S3 objects");
        let mut summary = DeleteSummary::default();
        for chunk in objects.chunks(DELETE_BATCH_SIZE) {
            let identifiers = chunk
                .iter()
                .map(|l| ObjectIdentifier::builder().key(l.key()).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| IoError::new(ErrorKind::Unexpected, e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| IoError::new(ErrorKind::Unexpected, e.to_string()))?;
            let output = self
                .client
                .delete_objects()
                .bucket(prefix.authority_host())
                .delete(delete)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, prefix))?;
            if let Some(first) = output.errors().first() {
                return Err(IoError::new(
                    ErrorKind::Unexpected,
                    format!(
                        "Failed to delete {} objects",
                        output.errors().len()
                    ),
                )
                .with_location(prefix.as_str())
                .with_context(format!(
                    "first failure: {} ({})",
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or_default()
                )));
            }
            summary.deleted += chunk.len();
        }
        Ok(summary)
    }
}

/// Validate the S3 region.
///
/// # Errors
/// If the region is longer than 128 characters, an error is returned.
pub fn validate_region(region: &str) -> Result<(), String> {
    if region.is_empty() {
        return Err("`region` must not be empty.".to_string());
    }
    if region.len() > 128 {
        return Err("`region` must be less than 128 characters.".to_string());
    }
    Ok(())
}

/// Validate an S3 bucket name according to the general purpose bucket naming rules.
///
/// # Errors
/// Returns a description of the first violated rule.
pub fn validate_bucket_name(bucket: &str) -> Result<(), String> {
    if !(3..=63).contains(&bucket.len()) {
        return Err("Bucket name must be between 3 and 63 characters long.".to_string());
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(
            "Bucket name may only contain lowercase letters, digits, dots and hyphens."
                .to_string(),
        );
    }
    let first_and_last = [bucket.chars().next(), bucket.chars().last()];
    if first_and_last
        .iter()
        .flatten()
        .any(|c| !c.is_ascii_alphanumeric())
    {
        return Err("Bucket name must begin and end with a letter or digit.".to_string());
    }
    if bucket.contains("..") {
        return Err("Bucket name must not contain two adjacent periods.".to_string());
    }
    Ok(())
}
