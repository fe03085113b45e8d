use icehouse_io::{
    Location,
    adls::{AdlsSettings, AzureClientCredentials, DEFAULT_HOST},
};
use serde::{Deserialize, Serialize};
use url::Url;
use veil::Redact;

use super::{StorageType, ValidationError, normalize_key_prefix};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct AdlsProfile {
    pub filesystem: String,
    pub account_name: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Defaults to `dfs.core.windows.net`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub authority_host: Option<Url>,
    /// Vend user delegation SAS tokens.
    #[serde(default = "default_true")]
    pub sas_enabled: bool,
}

impl AdlsProfile {
    pub(super) fn normalize(&mut self) -> Result<(), ValidationError> {
        let account_ok = (3..=24).contains(&self.account_name.len())
            && self
                .account_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !account_ok {
            return Err(ValidationError::invalid_profile(
                "account-name",
                "Account name must be 3 to 24 lowercase letters or digits",
            ));
        }

        let filesystem_ok = (3..=63).contains(&self.filesystem.len())
            && self
                .filesystem
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !self.filesystem.starts_with('-')
            && !self.filesystem.ends_with('-')
            && !self.filesystem.contains("--");
        if !filesystem_ok {
            return Err(ValidationError::invalid_profile(
                "filesystem",
                "Filesystem must be 3 to 63 lowercase letters, digits or single hyphens",
            ));
        }

        if let Some(host) = &self.host {
            if host.is_empty() || host.contains('/') {
                return Err(ValidationError::invalid_profile(
                    "host",
                    "Host must be a bare domain such as `dfs.core.windows.net`",
                ));
            }
        }
        self.key_prefix = normalize_key_prefix(self.key_prefix.as_deref())?;
        Ok(())
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub(super) fn base_location(&self) -> Result<Location, ValidationError> {
        let mut location = self.adls_settings().base_location()?;
        if let Some(prefix) = &self.key_prefix {
            location.push(prefix);
        }
        Ok(location)
    }

    pub(super) fn validate_credential(
        credential: Option<&super::StorageCredential>,
    ) -> Result<(), ValidationError> {
        match credential {
            Some(super::StorageCredential::Az(_)) => Ok(()),
            Some(other) => Err(ValidationError::CredentialMismatch {
                profile_type: StorageType::Adls,
                credential_type: other.type_name(),
            }),
            None => Err(ValidationError::MissingCredential(StorageType::Adls)),
        }
    }

    #[must_use]
    pub fn adls_settings(&self) -> AdlsSettings {
        AdlsSettings::builder()
            .account_name(self.account_name.clone())
            .filesystem(self.filesystem.clone())
            .host(self.host().to_string())
            .authority_host(self.authority_host.clone())
            .build()
    }

    /// Config key under which the SAS token for this account is handed to clients.
    #[must_use]
    pub fn sas_token_key(&self) -> String {
        format!("adls.sas-token.{}.{}", self.account_name, self.host())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "credential-type", rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub enum AzCredential {
    ClientCredentials(AzClientCredentials),
}

#[derive(Redact, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "open-api", derive(utoipa::ToSchema))]
pub struct AzClientCredentials {
    pub client_id: String,
    #[redact(partial)]
    pub client_secret: String,
    pub tenant_id: String,
}

impl From<&AzCredential> for AzureClientCredentials {
    fn from(value: &AzCredential) -> Self {
        let AzCredential::ClientCredentials(credentials) = value;
        AzureClientCredentials {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            tenant_id: credentials.tenant_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_and_base_location() {
        let mut profile: AdlsProfile = serde_json::from_value(serde_json::json!({
            "account-name": "icehouse01",
            "filesystem": "tables",
            "key-prefix": "wh"
        }))
        .unwrap();
        profile.normalize().unwrap();
        assert!(profile.sas_enabled);
        assert_eq!(
            profile.base_location().unwrap().as_str(),
            "abfss://tables@icehouse01.dfs.core.windows.net/wh"
        );
        assert_eq!(
            profile.sas_token_key(),
            "adls.sas-token.icehouse01.dfs.core.windows.net"
        );
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let mut profile = AdlsProfile {
            filesystem: "tables".to_string(),
            account_name: "Upper".to_string(),
            key_prefix: None,
            host: None,
            authority_host: None,
            sas_enabled: true,
        };
        assert!(profile.normalize().is_err());
        profile.account_name = "lower".to_string();
        profile.filesystem = "a--b".to_string();
        assert!(profile.normalize().is_err());
    }

    #[test]
    fn test_client_credentials_are_redacted() {
        let credential: AzCredential = serde_json::from_value(serde_json::json!({
            "credential-type": "client-credentials",
            "client-id": "id",
            "client-secret": "do-not-print-me",
            "tenant-id": "tenant"
        }))
        .unwrap();
        assert!(!format!("{credential:?}").contains("do-not-print-me"));
        let io_credentials = AzureClientCredentials::from(&credential);
        assert_eq!(io_credentials.tenant_id, "tenant");
    }
}
