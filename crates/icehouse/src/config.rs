//! Service configuration. Loaded once from the environment and passed around as
//! `Arc<ServiceConfig>`.
use std::{net::IpAddr, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use url::Url;
use veil::Redact;

use crate::service::ProjectId;

#[cfg(not(test))]
const ENV_PREFIX: &str = "ICEHOUSE__";
#[cfg(test)]
const ENV_PREFIX: &str = "ICEHOUSE_TEST__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AuthZBackend {
    #[default]
    AllowAll,
    Relations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_ip: IpAddr,
    pub listen_port: u16,
    /// Public base URI, used to build signer and config URLs.
    pub base_uri: Url,
    /// Project used when a request does not name one.
    pub default_project_id: Option<ProjectId>,
    pub max_request_body_size: usize,
    /// Seconds.
    pub max_request_time: u64,
    pub allow_origin: Option<Vec<String>>,
    pub authn: Option<AuthnConfig>,
    pub authz_backend: AuthZBackend,
    pub expiration: ExpirationConfig,
    pub vending: VendingConfig,
    /// Persist the in-memory catalog to this file after every commit.
    pub snapshot_path: Option<PathBuf>,
    pub metrics: MetricsConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::from([0, 0, 0, 0]),
            listen_port: 8181,
            base_uri: Url::parse("http://localhost:8181")
                .unwrap_or_else(|_| unreachable!("static url is valid")),
            default_project_id: None,
            max_request_body_size: 2 * 1024 * 1024,
            max_request_time: 30,
            allow_origin: None,
            authn: None,
            authz_backend: AuthZBackend::default(),
            expiration: ExpirationConfig::default(),
            vending: VendingConfig::default(),
            snapshot_path: None,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Token introspection against the identity provider (RFC 7662).
#[derive(Clone, PartialEq, Serialize, Deserialize, Redact)]
pub struct AuthnConfig {
    pub introspection_url: Url,
    pub client_id: String,
    #[redact]
    pub client_secret: String,
    /// Seconds.
    #[serde(default = "default_authn_timeout")]
    pub timeout: u64,
    /// Upper bound for caching an introspection result, in seconds.
    #[serde(default = "default_authn_cache_ttl")]
    pub cache_ttl: u64,
}

fn default_authn_timeout() -> u64 {
    5
}

fn default_authn_cache_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    /// Seconds between purge sweeps.
    pub sweep_interval: u64,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self { sweep_interval: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendingConfig {
    /// Timeout of a single provider call, in seconds.
    pub timeout: u64,
    pub max_retries: u32,
    /// Upper bound for the lifetime of a vended credential, in seconds.
    pub sts_max_duration: u64,
    /// Region of the STS endpoint. Defaults to the region of the storage profile.
    pub sts_region: Option<String>,
}

impl Default for VendingConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            max_retries: 2,
            sts_max_duration: 3600,
            sts_region: None,
        }
    }
}

impl VendingConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9000,
        }
    }
}

impl ServiceConfig {
    /// Defaults merged with `ICEHOUSE__*` environment variables. Nested keys are
    /// separated by `__`, e.g. `ICEHOUSE__VENDING__MAX_RETRIES`.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment().extract().map_err(Box::new)
    }

    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(ServiceConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    #[must_use]
    pub fn max_request_time(&self) -> Duration {
        Duration::from_secs(self.max_request_time)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiration.sweep_interval.max(1))
    }
}
