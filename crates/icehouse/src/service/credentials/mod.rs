//! Short-lived, prefix-scoped credentials for clients of a warehouse.
//!
//! The engine never touches the catalog store. Handlers resolve the warehouse first,
//! drop their read guard and only then call [`CredentialVendingEngine::vend`].
mod adls;
mod gcs;
mod sts;

use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
    time::{Duration, Instant},
};

use axum_prometheus::metrics;
use chrono::{DateTime, Utc};
pub use gcs::GcsEndpoints;
use icehouse_ext::catalog::rest::{ErrorModel, IcebergErrorResponse};
use icehouse_io::{ErrorKind, IoError, Location, adls::AdlsStorage, gcs::CLOUD_PLATFORM_SCOPE};
use serde::Serialize;
pub use sts::{
    AssumeRoleClient, AssumeRoleRequest, AwsStsClient, StsCredentials, StsEndpoint, StsIdentity,
};
#[cfg(test)]
pub(crate) use sts::MockAssumeRoleClient;
use sts::{ROLE_CHAINING_MAX_DURATION, STS_MIN_DURATION};
use tryhard::RetryPolicy;
use xxhash_rust::xxh3::xxh3_64;

use crate::{
    config::VendingConfig,
    service::storage::{
        AdlsProfile, AzCredential, GcsCredential, GcsProfile, S3Credential, S3Flavor, S3Profile,
        StorageCredential, StorageProfile, StorageType, ValidationError,
    },
};

const METRIC_VENDING_CACHE_HITS: &str = "icehouse_vending_cache_hits_total";
const METRIC_VENDING_CACHE_MISSES: &str = "icehouse_vending_cache_misses_total";
const METRIC_VENDING_CACHE_SIZE: &str = "icehouse_vending_cache_size";
const CACHE_CAPACITY: u64 = 10_000;

static METRICS_INITIALIZED: LazyLock<()> = LazyLock::new(|| {
    metrics::describe_gauge!(
        METRIC_VENDING_CACHE_SIZE,
        "Current number of entries in the vended credentials cache"
    );
    metrics::describe_counter!(METRIC_VENDING_CACHE_HITS, "Total number of vending cache hits");
    metrics::describe_counter!(
        METRIC_VENDING_CACHE_MISSES,
        "Total number of vending cache misses"
    );
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum AccessLevel {
    Read,
    ReadWrite,
}

/// What a vended credential may reach.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialScope {
    pub location: Location,
    pub access: AccessLevel,
}

/// Validity window of the caller. Vended credentials never outlive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendingSession {
    /// Expiry of the bearer token, if known.
    pub expires_at: Option<DateTime<Utc>>,
    /// Shows up in provider audit logs.
    pub session_name: String,
}

impl VendingSession {
    #[must_use]
    pub fn new(expires_at: Option<DateTime<Utc>>, session_name: impl Into<String>) -> Self {
        Self {
            expires_at,
            session_name: session_name.into(),
        }
    }

    fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|e| (e - now).num_seconds())
    }

    fn cap(&self, expires_at: DateTime<Utc>) -> DateTime<Utc> {
        self.expires_at.map_or(expires_at, |e| e.min(expires_at))
    }
}

/// Credential handed to a client. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelegatedCredential {
    pub prefix: String,
    pub config: HashMap<String, String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vended {
    Delegated(DelegatedCredential),
    /// Clients should sign requests through the catalog.
    RemoteSigning,
}

#[derive(thiserror::Error, Debug)]
pub enum VendingError {
    #[error("`{0}` storage cannot vend credentials without STS enabled")]
    UnsupportedBackend(StorageType),
    #[error("Session expires in {remaining_seconds}s, which is too short to vend credentials")]
    SessionTooShort { remaining_seconds: i64 },
    #[error(transparent)]
    Provider(#[from] IoError),
    #[error("Stored warehouse storage is inconsistent: {0}")]
    Storage(#[from] ValidationError),
}

impl From<VendingError> for ErrorModel {
    fn from(err: VendingError) -> Self {
        match err {
            VendingError::UnsupportedBackend(_) => {
                ErrorModel::not_implemented(err.to_string(), "UnsupportedBackend", None)
            }
            VendingError::SessionTooShort { .. } => {
                ErrorModel::unauthorized(err.to_string(), "SessionExpiresTooSoon", None)
            }
            VendingError::Provider(e) => {
                ErrorModel::from_io_error(e, "Failed to vend storage credentials")
            }
            e @ VendingError::Storage(_) => {
                ErrorModel::internal(e.to_string(), "StorageConfigurationError", Some(Box::new(e)))
            }
        }
    }
}

impl From<VendingError> for IcebergErrorResponse {
    fn from(err: VendingError) -> Self {
        ErrorModel::from(err).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    profile_hash: u64,
    credential_hash: u64,
    location: String,
    access: AccessLevel,
    session_expires_at: Option<DateTime<Utc>>,
    session_name: String,
}

#[derive(Debug, Clone)]
struct CacheValue {
    credential: DelegatedCredential,
    valid_until: Instant,
}

fn fingerprint<T: Serialize>(value: &T) -> u64 {
    xxh3_64(&serde_json::to_vec(value).unwrap_or_default())
}

struct CacheExpiry;

impl moka::Expiry<CacheKey, CacheValue> for CacheExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheValue,
        created_at: Instant,
    ) -> Option<Duration> {
        let valid_for = value
            .valid_until
            .checked_duration_since(created_at)
            .unwrap_or_default();
        // Half the lifetime, at most one hour.
        Some((valid_for / 2).min(Duration::from_secs(3600)))
    }
}

#[derive(Debug, Clone)]
pub struct CredentialVendingEngine {
    http: reqwest::Client,
    sts: Arc<dyn AssumeRoleClient>,
    gcs_endpoints: GcsEndpoints,
    config: VendingConfig,
    cache: moka::future::Cache<CacheKey, CacheValue>,
}

impl CredentialVendingEngine {
    #[must_use]
    pub fn new(http: reqwest::Client, config: VendingConfig) -> Self {
        Self {
            http,
            sts: Arc::new(AwsStsClient),
            gcs_endpoints: GcsEndpoints::default(),
            config,
            cache: moka::future::Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .expire_after(CacheExpiry)
                .build(),
        }
    }

    #[must_use]
    pub fn with_assume_role_client(mut self, client: Arc<dyn AssumeRoleClient>) -> Self {
        self.sts = client;
        self
    }

    #[must_use]
    pub fn with_gcs_endpoints(mut self, endpoints: GcsEndpoints) -> Self {
        self.gcs_endpoints = endpoints;
        self
    }

    /// Produce credentials for `scope`, or tell the caller to use remote signing.
    ///
    /// # Errors
    /// - [`VendingError::UnsupportedBackend`] if the profile cannot vend without STS
    /// - [`VendingError::SessionTooShort`] if the session ends before a credential
    ///   could be valid
    /// - [`VendingError::Provider`] if the identity provider fails or times out
    #[tracing::instrument(
        skip(self, profile, credential, session),
        fields(storage_type = %profile.storage_type(), location = %scope.location, access = %scope.access)
    )]
    pub async fn vend(
        &self,
        profile: &StorageProfile,
        credential: Option<&StorageCredential>,
        scope: &CredentialScope,
        sts_enabled: bool,
        session: &VendingSession,
    ) -> Result<Vended, VendingError> {
        if !sts_enabled {
            return match profile {
                StorageProfile::S3(_) => Ok(Vended::RemoteSigning),
                other => Err(VendingError::UnsupportedBackend(other.storage_type())),
            };
        }

        let now = Utc::now();
        if let StorageProfile::Memory(_) = profile {
            self.bounded_lifetime(session, now, false, self.max_duration())?;
            return Ok(Vended::Delegated(DelegatedCredential {
                prefix: scope.location.to_string(),
                config: HashMap::new(),
                expires_at: session.cap(now + chrono::Duration::seconds(self.max_duration())),
            }));
        }

        let key = CacheKey {
            profile_hash: fingerprint(profile),
            credential_hash: fingerprint(&credential),
            location: scope.location.to_string(),
            access: scope.access,
            session_expires_at: session.expires_at,
            session_name: session.session_name.clone(),
        };
        if let Some(cached) = self.cached(&key).await {
            return Ok(Vended::Delegated(cached));
        }

        let delegated = match (profile, credential) {
            (StorageProfile::S3(profile), Some(StorageCredential::S3(credential))) => {
                self.vend_s3(profile, credential, scope, session, now).await?
            }
            (StorageProfile::Adls(profile), Some(StorageCredential::Az(credential))) => {
                self.vend_adls(profile, credential, scope, session, now)
                    .await?
            }
            (StorageProfile::Gcs(profile), Some(StorageCredential::Gcs(credential))) => {
                self.vend_gcs(profile, credential, scope, session, now)
                    .await?
            }
            (profile, None) => {
                return Err(ValidationError::MissingCredential(profile.storage_type()).into());
            }
            (profile, Some(credential)) => {
                return Err(ValidationError::CredentialMismatch {
                    profile_type: profile.storage_type(),
                    credential_type: credential.type_name(),
                }
                .into());
            }
        };

        self.insert(key, &delegated).await;
        Ok(Vended::Delegated(delegated))
    }

    fn max_duration(&self) -> i64 {
        i64::try_from(self.config.sts_max_duration).unwrap_or(i64::MAX)
    }

    /// Lifetime in seconds, bounded by `max` and the session window. With `sts_floor`
    /// the result is at least the STS minimum and a session ending earlier is rejected.
    fn bounded_lifetime(
        &self,
        session: &VendingSession,
        now: DateTime<Utc>,
        sts_floor: bool,
        max: i64,
    ) -> Result<i64, VendingError> {
        let floor = if sts_floor { STS_MIN_DURATION } else { 1 };
        let mut lifetime = max.max(floor);
        if let Some(remaining) = session.remaining_seconds(now) {
            if remaining < floor {
                return Err(VendingError::SessionTooShort {
                    remaining_seconds: remaining,
                });
            }
            lifetime = lifetime.min(remaining);
        }
        Ok(lifetime)
    }

    async fn vend_s3(
        &self,
        profile: &S3Profile,
        credential: &S3Credential,
        scope: &CredentialScope,
        session: &VendingSession,
        now: DateTime<Utc>,
    ) -> Result<DelegatedCredential, VendingError> {
        let chained = profile.assume_role_arn.is_some() && profile.sts_role_arn.is_some();
        let max = if chained {
            self.max_duration().min(ROLE_CHAINING_MAX_DURATION)
        } else {
            self.max_duration()
        };
        let lifetime = self.bounded_lifetime(session, now, true, max)?;
        let duration_seconds = i32::try_from(lifetime).unwrap_or(i32::MAX);

        let endpoint = StsEndpoint {
            region: self
                .config
                .sts_region
                .clone()
                .unwrap_or_else(|| profile.region.clone()),
            endpoint: match profile.flavor {
                S3Flavor::Minio => profile.endpoint.clone(),
                S3Flavor::Aws => None,
            },
        };
        let base_identity = match credential {
            S3Credential::AccessKey(key) => StsIdentity::AccessKey(key.clone()),
            S3Credential::AwsSystemIdentity(_) => StsIdentity::SystemIdentity,
        };
        let session_name = sts::sanitize_session_name(&session.session_name);
        let policy = sts::s3_session_policy(&profile.bucket, scope.location.key(), scope.access);
        let external_id = credential.external_id().map(str::to_string);

        let credentials = match (&profile.assume_role_arn, &profile.sts_role_arn) {
            (Some(first), Some(second)) => {
                let hop = self
                    .assume_role(
                        &base_identity,
                        &endpoint,
                        &AssumeRoleRequest {
                            role_arn: Some(first.clone()),
                            session_name: session_name.clone(),
                            external_id,
                            policy: None,
                            duration_seconds,
                        },
                    )
                    .await?;
                self.assume_role(
                    &StsIdentity::Session(hop),
                    &endpoint,
                    &AssumeRoleRequest {
                        role_arn: Some(second.clone()),
                        session_name,
                        external_id: None,
                        policy: Some(policy),
                        duration_seconds,
                    },
                )
                .await?
            }
            (first, second) => {
                self.assume_role(
                    &base_identity,
                    &endpoint,
                    &AssumeRoleRequest {
                        role_arn: second.clone().or_else(|| first.clone()),
                        session_name,
                        external_id,
                        policy: Some(policy),
                        duration_seconds,
                    },
                )
                .await?
            }
        };

        let expires_at = session.cap(credentials.expiration);
        Ok(DelegatedCredential {
            prefix: scope.location.to_string(),
            config: HashMap::from([
                ("s3.access-key-id".to_string(), credentials.access_key_id),
                ("s3.secret-access-key".to_string(), credentials.secret_access_key),
                ("s3.session-token".to_string(), credentials.session_token),
                (
                    "s3.session-token-expires-at-ms".to_string(),
                    expires_at.timestamp_millis().to_string(),
                ),
            ]),
            expires_at,
        })
    }

    async fn assume_role(
        &self,
        identity: &StsIdentity,
        endpoint: &StsEndpoint,
        request: &AssumeRoleRequest,
    ) -> Result<StsCredentials, IoError> {
        self.with_retries("AssumeRole", || {
            self.sts.assume_role(identity, endpoint, request)
        })
        .await
    }

    async fn vend_adls(
        &self,
        profile: &AdlsProfile,
        credential: &AzCredential,
        scope: &CredentialScope,
        session: &VendingSession,
        now: DateTime<Utc>,
    ) -> Result<DelegatedCredential, VendingError> {
        let lifetime = self.bounded_lifetime(session, now, false, self.max_duration())?;
        // Tolerate clock skew between us and Azure.
        let start = now - chrono::Duration::minutes(5);
        let expiry = session.cap(now + chrono::Duration::seconds(lifetime));

        let storage = AdlsStorage::new(self.http.clone(), profile.adls_settings(), credential.into());
        let key = self
            .with_retries("GetUserDelegationKey", || {
                storage.get_user_delegation_key(start, expiry)
            })
            .await?;
        let sas = adls::directory_sas(
            &key,
            &profile.account_name,
            &profile.filesystem,
            scope.location.key(),
            scope.access,
            start,
            expiry,
        )?;

        Ok(DelegatedCredential {
            prefix: scope.location.to_string(),
            config: HashMap::from([(profile.sas_token_key(), sas)]),
            expires_at: expiry,
        })
    }

    async fn vend_gcs(
        &self,
        profile: &GcsProfile,
        credential: &GcsCredential,
        scope: &CredentialScope,
        session: &VendingSession,
        now: DateTime<Utc>,
    ) -> Result<DelegatedCredential, VendingError> {
        let lifetime = self.bounded_lifetime(session, now, false, self.max_duration())?;
        let key = credential.service_account_key();

        let bearer = self
            .with_retries("ServiceAccountToken", || {
                key.access_token(&self.http, CLOUD_PLATFORM_SCOPE)
            })
            .await?;
        let minted = self
            .with_retries("GenerateAccessToken", || {
                gcs::generate_access_token(
                    &self.http,
                    &self.gcs_endpoints,
                    &bearer,
                    &key.client_email,
                    lifetime,
                )
            })
            .await?;
        let boundary = gcs::access_boundary(&profile.bucket, scope.location.key(), scope.access);
        let token = self
            .with_retries("DownscopeToken", || {
                gcs::downscope(&self.http, &self.gcs_endpoints, &minted, &boundary)
            })
            .await?;

        let expires_at = session.cap(token.expires_at);
        Ok(DelegatedCredential {
            prefix: scope.location.to_string(),
            config: HashMap::from([
                ("gcs.oauth2.token".to_string(), token.token),
                (
                    "gcs.oauth2.token-expires-at".to_string(),
                    expires_at.timestamp_millis().to_string(),
                ),
            ]),
            expires_at,
        })
    }

    /// Run `call` with a per-attempt timeout. Only transient failures are retried.
    async fn with_retries<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, IoError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IoError>>,
    {
        let timeout = self.config.timeout();
        tryhard::retry_fn(|| {
            let attempt = call();
            async move {
                tokio::time::timeout(timeout, attempt)
                    .await
                    .unwrap_or_else(|_| {
                        Err(IoError::new(
                            ErrorKind::RequestTimeout,
                            format!("{operation} did not answer within {}s", timeout.as_secs()),
                        ))
                    })
            }
        })
        .retries(self.config.max_retries)
        .custom_backoff(|attempt: u32, error: &IoError| {
            if error.kind().is_transient() {
                tracing::debug!("{operation} failed with a transient error, retrying: {error}");
                RetryPolicy::Delay(Duration::from_millis(100 * 2_u64.pow(attempt.min(10))))
            } else {
                RetryPolicy::Break
            }
        })
        .await
        .inspect_err(|e| tracing::warn!("{operation} failed: {e}"))
    }

    async fn cached(&self, key: &CacheKey) -> Option<DelegatedCredential> {
        let () = &*METRICS_INITIALIZED;
        let result = self.cache.get(key).await;
        if result.is_some() {
            metrics::counter!(METRIC_VENDING_CACHE_HITS).increment(1);
        } else {
            metrics::counter!(METRIC_VENDING_CACHE_MISSES).increment(1);
        }
        self.update_cache_size_metric();
        result.map(|value| value.credential)
    }

    async fn insert(&self, key: CacheKey, credential: &DelegatedCredential) {
        let valid_for = (credential.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default();
        self.cache
            .insert(
                key,
                CacheValue {
                    credential: credential.clone(),
                    valid_until: Instant::now() + valid_for,
                },
            )
            .await;
        self.update_cache_size_metric();
    }

    #[allow(clippy::cast_precision_loss)]
    fn update_cache_size_metric(&self) {
        metrics::gauge!(METRIC_VENDING_CACHE_SIZE).set(self.cache.entry_count() as f64);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::service::storage::{MemoryProfile, S3AccessKeyCredential};

    fn s3_profile(assume_role_arn: Option<&str>, sts_role_arn: Option<&str>) -> StorageProfile {
        serde_json::from_value(serde_json::json!({
            "type": "s3",
            "bucket": "tests",
            "key-prefix": "wh",
            "region": "eu-central-1",
            "sts-enabled": true,
            "assume-role-arn": assume_role_arn,
            "sts-role-arn": sts_role_arn,
        }))
        .unwrap()
    }

    fn s3_credential() -> StorageCredential {
        StorageCredential::S3(S3Credential::AccessKey(S3AccessKeyCredential {
            aws_access_key_id: "base-key".to_string(),
            aws_secret_access_key: "base-secret".to_string(),
            external_id: Some("ext-1".to_string()),
        }))
    }

    fn scope() -> CredentialScope {
        CredentialScope {
            location: "s3://tests/wh/ns/table".parse().unwrap(),
            access: AccessLevel::Read,
        }
    }

    fn sts_credentials(name: &str, lifetime: i64) -> StsCredentials {
        StsCredentials {
            access_key_id: format!("{name}-key"),
            secret_access_key: format!("{name}-secret"),
            session_token: format!("{name}-token"),
            expiration: Utc::now() + chrono::Duration::seconds(lifetime),
        }
    }

    fn engine(mock: MockAssumeRoleClient) -> CredentialVendingEngine {
        CredentialVendingEngine::new(
            reqwest::Client::new(),
            VendingConfig {
                timeout: 1,
                max_retries: 2,
                ..VendingConfig::default()
            },
        )
        .with_assume_role_client(Arc::new(mock))
    }

    fn delegated(vended: Vended) -> DelegatedCredential {
        match vended {
            Vended::Delegated(credential) => credential,
            Vended::RemoteSigning => panic!("expected a delegated credential"),
        }
    }

    #[tokio::test]
    async fn test_two_hop_chain_scopes_policy_to_second_hop() {
        let mut mock = MockAssumeRoleClient::new();
        let mut sequence = mockall::Sequence::new();
        mock.expect_assume_role()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|identity, _, request| {
                matches!(identity, StsIdentity::AccessKey(key) if key.aws_access_key_id == "base-key")
                    && request.role_arn.as_deref() == Some("arn:aws:iam::1:role/hop1")
                    && request.external_id.as_deref() == Some("ext-1")
                    && request.policy.is_none()
            })
            .returning(|_, _, _| Ok(sts_credentials("hop1", 3600)));
        mock.expect_assume_role()
            .times(1)
            .in_sequence(&mut sequence)
            .withf(|identity, _, request| {
                matches!(identity, StsIdentity::Session(s) if s.access_key_id == "hop1-key")
                    && request.role_arn.as_deref() == Some("arn:aws:iam::1:role/hop2")
                    && request.external_id.is_none()
                    && request
                        .policy
                        .as_deref()
                        .is_some_and(|p| p.contains("arn:aws:s3:::tests/wh/ns/table/*"))
                    && request.duration_seconds <= 3600
            })
            .returning(|_, _, request| {
                Ok(sts_credentials("hop2", i64::from(request.duration_seconds)))
            });

        let credential = delegated(
            engine(mock)
                .vend(
                    &s3_profile(Some("arn:aws:iam::1:role/hop1"), Some("arn:aws:iam::1:role/hop2")),
                    Some(&s3_credential()),
                    &scope(),
                    true,
                    &VendingSession::new(None, "alice"),
                )
                .await
                .unwrap(),
        );
        assert_eq!(credential.config["s3.access-key-id"], "hop2-key");
        assert_eq!(credential.prefix, "s3://tests/wh/ns/table");
    }

    #[tokio::test]
    async fn test_duration_bounded_by_session_window() {
        let session_expiry = Utc::now() + chrono::Duration::seconds(1200);
        let mut mock = MockAssumeRoleClient::new();
        mock.expect_assume_role()
            .times(1)
            .withf(|_, _, request| {
                (900..=1200).contains(&request.duration_seconds)
                    && request.role_arn.as_deref() == Some("arn:aws:iam::1:role/only")
            })
            .returning(|_, _, request| {
                Ok(sts_credentials("single", i64::from(request.duration_seconds)))
            });

        let credential = delegated(
            engine(mock)
                .vend(
                    &s3_profile(None, Some("arn:aws:iam::1:role/only")),
                    Some(&s3_credential()),
                    &scope(),
                    true,
                    &VendingSession::new(Some(session_expiry), "alice"),
                )
                .await
                .unwrap(),
        );
        assert!(credential.expires_at <= session_expiry);
        assert_eq!(
            credential.config["s3.session-token-expires-at-ms"],
            credential.expires_at.timestamp_millis().to_string()
        );
    }

    #[tokio::test]
    async fn test_session_too_short_is_rejected_without_calling_sts() {
        let mut mock = MockAssumeRoleClient::new();
        mock.expect_assume_role().times(0);
        let result = engine(mock)
            .vend(
                &s3_profile(None, Some("arn:aws:iam::1:role/only")),
                Some(&s3_credential()),
                &scope(),
                true,
                &VendingSession::new(Some(Utc::now() + chrono::Duration::seconds(60)), "alice"),
            )
            .await;
        let err = ErrorModel::from(result.unwrap_err());
        assert_eq!(err.code, 401);
        assert_eq!(err.r#type, "SessionExpiresTooSoon");
    }

    #[tokio::test]
    async fn test_sts_disabled() {
        let engine = engine(MockAssumeRoleClient::new());
        let session = VendingSession::new(None, "alice");
        let vended = engine
            .vend(&s3_profile(None, None), Some(&s3_credential()), &scope(), false, &session)
            .await
            .unwrap();
        assert_eq!(vended, Vended::RemoteSigning);

        let adls: StorageProfile = serde_json::from_value(serde_json::json!({
            "type": "adls",
            "account-name": "account",
            "filesystem": "tables",
            "sas-enabled": false
        }))
        .unwrap();
        let err = engine
            .vend(&adls, None, &scope(), false, &session)
            .await
            .unwrap_err();
        assert!(matches!(err, VendingError::UnsupportedBackend(StorageType::Adls)));
        assert_eq!(ErrorModel::from(err).code, 501);
    }

    #[tokio::test]
    async fn test_memory_credential_expires_with_session() {
        let expiry = Utc::now() + chrono::Duration::seconds(30);
        let credential = delegated(
            engine(MockAssumeRoleClient::new())
                .vend(
                    &StorageProfile::Memory(MemoryProfile::default()),
                    None,
                    &CredentialScope {
                        location: "memory://icehouse/ns/t".parse().unwrap(),
                        access: AccessLevel::ReadWrite,
                    },
                    true,
                    &VendingSession::new(Some(expiry), "alice"),
                )
                .await
                .unwrap(),
        );
        assert!(credential.config.is_empty());
        assert_eq!(credential.expires_at, expiry);
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_retried() {
        let mut mock = MockAssumeRoleClient::new();
        mock.expect_assume_role().times(1).returning(|_, _, _| {
            Err(IoError::new(ErrorKind::PermissionDenied, "not authorized"))
        });
        let err = engine(mock)
            .vend(
                &s3_profile(None, Some("arn:aws:iam::1:role/only")),
                Some(&s3_credential()),
                &scope(),
                true,
                &VendingSession::new(None, "alice"),
            )
            .await
            .unwrap_err();
        assert_eq!(ErrorModel::from(err).code, 502);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockAssumeRoleClient::new();
        mock.expect_assume_role().returning(move |_, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(IoError::new(ErrorKind::RateLimited, "slow down"))
            } else {
                Ok(sts_credentials("retried", 900))
            }
        });
        let credential = delegated(
            engine(mock)
                .vend(
                    &s3_profile(None, Some("arn:aws:iam::1:role/only")),
                    Some(&s3_credential()),
                    &scope(),
                    true,
                    &VendingSession::new(None, "alice"),
                )
                .await
                .unwrap(),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(credential.config["s3.access-key-id"], "retried-key");
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_as_unavailable() {
        let mut mock = MockAssumeRoleClient::new();
        mock.expect_assume_role()
            .times(3)
            .returning(|_, _, _| Err(IoError::new(ErrorKind::ServiceUnavailable, "down")));
        let err = engine(mock)
            .vend(
                &s3_profile(None, Some("arn:aws:iam::1:role/only")),
                Some(&s3_credential()),
                &scope(),
                true,
                &VendingSession::new(None, "alice"),
            )
            .await
            .unwrap_err();
        assert_eq!(ErrorModel::from(err).code, 503);
    }

    #[tokio::test]
    async fn test_credentials_are_cached() {
        let mut mock = MockAssumeRoleClient::new();
        mock.expect_assume_role()
            .times(1)
            .returning(|_, _, _| Ok(sts_credentials("cached", 3600)));
        let engine = engine(mock);
        let profile = s3_profile(None, Some("arn:aws:iam::1:role/only"));
        let session = VendingSession::new(None, "alice");
        let first = engine
            .vend(&profile, Some(&s3_credential()), &scope(), true, &session)
            .await
            .unwrap();
        let second = engine
            .vend(&profile, Some(&s3_credential()), &scope(), true, &session)
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}
