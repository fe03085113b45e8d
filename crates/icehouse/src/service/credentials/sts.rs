//! `sts:AssumeRole` based vending for S3.
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_sts::error::{ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};
use icehouse_io::{ErrorKind, IoError};
use serde_json::json;
use url::Url;
use veil::Redact;

use super::AccessLevel;
use crate::service::storage::S3AccessKeyCredential;

/// AWS caps sessions obtained through role chaining at one hour.
pub(crate) const ROLE_CHAINING_MAX_DURATION: i64 = 3600;
pub(crate) const STS_MIN_DURATION: i64 = 900;

/// Temporary credentials returned by `AssumeRole`.
#[derive(Redact, Clone, PartialEq, Eq)]
pub struct StsCredentials {
    pub access_key_id: String,
    #[redact]
    pub secret_access_key: String,
    #[redact]
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

/// Identity used to call STS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StsIdentity {
    AccessKey(S3AccessKeyCredential),
    /// Result of a previous hop.
    Session(StsCredentials),
    /// Default provider chain of the host.
    SystemIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StsEndpoint {
    pub region: String,
    /// Custom STS endpoint. S3 compatible stores serve STS on their S3 endpoint.
    pub endpoint: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// S3 compatible stores may not require a role.
    pub role_arn: Option<String>,
    pub session_name: String,
    pub external_id: Option<String>,
    /// Inline session policy.
    pub policy: Option<String>,
    pub duration_seconds: i32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssumeRoleClient: Send + Sync + std::fmt::Debug {
    async fn assume_role(
        &self,
        identity: &StsIdentity,
        endpoint: &StsEndpoint,
        request: &AssumeRoleRequest,
    ) -> Result<StsCredentials, IoError>;
}

/// [`AssumeRoleClient`] backed by the AWS SDK.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsStsClient;

#[async_trait]
impl AssumeRoleClient for AwsStsClient {
    async fn assume_role(
        &self,
        identity: &StsIdentity,
        endpoint: &StsEndpoint,
        request: &AssumeRoleRequest,
    ) -> Result<StsCredentials, IoError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(endpoint.region.clone()));
        if let Some(url) = &endpoint.endpoint {
            loader = loader.endpoint_url(url.as_str());
        }
        match identity {
            StsIdentity::AccessKey(key) => {
                loader = loader.credentials_provider(Credentials::new(
                    &key.aws_access_key_id,
                    &key.aws_secret_access_key,
                    None,
                    None,
                    "icehouse-warehouse-credential",
                ));
            }
            StsIdentity::Session(session) => {
                loader = loader.credentials_provider(Credentials::new(
                    &session.access_key_id,
                    &session.secret_access_key,
                    Some(session.session_token.clone()),
                    Some(SystemTime::from(session.expiration)),
                    "icehouse-role-chain",
                ));
            }
            StsIdentity::SystemIdentity => {}
        }
        let sdk_config = loader.load().await;
        let client = aws_sdk_sts::Client::new(&sdk_config);

        let output = client
            .assume_role()
            .set_role_arn(request.role_arn.clone())
            .role_session_name(&request.session_name)
            .set_external_id(request.external_id.clone())
            .set_policy(request.policy.clone())
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(map_sts_error)?;

        let credentials = output.credentials().ok_or_else(|| {
            IoError::new(ErrorKind::Unexpected, "STS response did not contain credentials")
        })?;
        let expiration = DateTime::from_timestamp(credentials.expiration().secs(), 0)
            .ok_or_else(|| {
                IoError::new(ErrorKind::Unexpected, "STS returned an invalid expiration")
            })?;
        Ok(StsCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }
}

fn map_sts_error<E, R>(err: SdkError<E, R>) -> IoError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let kind = match &err {
        SdkError::TimeoutError(_) => ErrorKind::RequestTimeout,
        SdkError::DispatchFailure(_) => ErrorKind::ServiceUnavailable,
        SdkError::ServiceError(e) => match e.err().code() {
            Some("AccessDenied") => ErrorKind::PermissionDenied,
            Some("ExpiredToken" | "ExpiredTokenException") => ErrorKind::CredentialsExpired,
            Some("Throttling" | "ThrottlingException") => ErrorKind::RateLimited,
            Some("MalformedPolicyDocument" | "PackedPolicyTooLarge" | "ValidationError") => {
                ErrorKind::ConfigInvalid
            }
            _ => ErrorKind::Unexpected,
        },
        _ => ErrorKind::Unexpected,
    };
    let message = match &err {
        SdkError::ServiceError(e) => e
            .err()
            .message()
            .map_or_else(|| "STS request failed".to_string(), |m| format!("STS: {m}")),
        _ => "STS request failed".to_string(),
    };
    IoError::new(kind, message).with_source(err)
}

/// Session policy limiting access to objects below `prefix` of `bucket`.
pub(crate) fn s3_session_policy(bucket: &str, prefix: &str, access: AccessLevel) -> String {
    let prefix = prefix.trim_matches('/');
    let object_actions = match access {
        AccessLevel::Read => vec!["s3:GetObject", "s3:GetObjectVersion"],
        AccessLevel::ReadWrite => vec![
            "s3:GetObject",
            "s3:GetObjectVersion",
            "s3:PutObject",
            "s3:DeleteObject",
            "s3:AbortMultipartUpload",
        ],
    };
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "TabularObjects",
                "Effect": "Allow",
                "Action": object_actions,
                "Resource": [format!("arn:aws:s3:::{bucket}/{prefix}/*")]
            },
            {
                "Sid": "TabularListing",
                "Effect": "Allow",
                "Action": ["s3:ListBucket"],
                "Resource": [format!("arn:aws:s3:::{bucket}")],
                "Condition": {
                    "StringLike": {
                        "s3:prefix": [prefix.to_string(), format!("{prefix}/*")]
                    }
                }
            }
        ]
    })
    .to_string()
}

/// Keep only the characters STS accepts in a session name.
pub(crate) fn sanitize_session_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "+=,.@-_".contains(c) {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect();
    if sanitized.len() < 2 {
        "icehouse".to_string()
    } else {
        sanitized
    }
}
