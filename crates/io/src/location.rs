use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid location `{value}`: {reason}")]
pub struct InvalidLocationError {
    pub value: String,
    pub reason: String,
}

impl InvalidLocationError {
    #[must_use]
    pub fn new(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// An absolute object-store location such as `s3://bucket/prefix/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(Url);

impl Location {
    /// Reserved property key used by namespaces and tables to report their location.
    pub const KEY: &'static str = "location";

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.0
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Bucket, GCS bucket or ADLS account host.
    #[must_use]
    pub fn authority_host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// ADLS filesystem (the userinfo part of `abfss://<filesystem>@<account>...`).
    #[must_use]
    pub fn username(&self) -> &str {
        self.0.username()
    }

    /// Object key path without leading slash.
    #[must_use]
    pub fn key(&self) -> &str {
        self.0.path().trim_start_matches('/')
    }

    pub fn with_trailing_slash(&mut self) -> &mut Self {
        if !self.0.path().ends_with('/') {
            let path = format!("{}/", self.0.path());
            self.0.set_path(&path);
        }
        self
    }

    pub fn without_trailing_slash(&mut self) -> &mut Self {
        let trimmed = self.0.path().trim_end_matches('/').to_string();
        self.0.set_path(&trimmed);
        self
    }

    /// Append a single path segment.
    pub fn push(&mut self, segment: &str) -> &mut Self {
        self.without_trailing_slash();
        let path = format!("{}/{}", self.0.path(), segment.trim_matches('/'));
        self.0.set_path(&path);
        self
    }

    #[must_use]
    pub fn cloning_push(&self, segment: &str) -> Self {
        let mut location = self.clone();
        location.push(segment);
        location
    }

    /// Whether `self` equals `other` or lies below it. Segment boundaries are respected,
    /// so `s3://b/ab` is not a sub-location of `s3://b/a`.
    #[must_use]
    pub fn is_sublocation_of(&self, other: &Location) -> bool {
        if self.scheme() != other.scheme()
            || self.authority_host() != other.authority_host()
            || self.username() != other.username()
        {
            return false;
        }
        let own = self.0.path().trim_end_matches('/');
        let parent = other.0.path().trim_end_matches('/');
        own == parent || own.starts_with(&format!("{parent}/"))
    }
}

impl FromStr for Location {
    type Err = InvalidLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| InvalidLocationError::new(s, e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(InvalidLocationError::new(s, "location must be hierarchical"));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(InvalidLocationError::new(s, "location must contain a bucket"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(InvalidLocationError::new(
                s,
                "location must not contain a query or fragment",
            ));
        }
        Ok(Self(url))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Location::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_trailing_slash() {
        let mut location = Location::from_str("s3://bucket/prefix/").unwrap();
        location.push("ns").push("table");
        assert_eq!(location.as_str(), "s3://bucket/prefix/ns/table");
        location.with_trailing_slash();
        assert_eq!(location.as_str(), "s3://bucket/prefix/ns/table/");
        assert_eq!(location.key(), "prefix/ns/table/");
    }

    #[test]
    fn test_sublocation_respects_segments() {
        let parent = Location::from_str("s3://bucket/a").unwrap();
        assert!(Location::from_str("s3://bucket/a/b").unwrap().is_sublocation_of(&parent));
        assert!(Location::from_str("s3://bucket/a/").unwrap().is_sublocation_of(&parent));
        assert!(!Location::from_str("s3://bucket/ab").unwrap().is_sublocation_of(&parent));
        assert!(!Location::from_str("s3://other/a/b").unwrap().is_sublocation_of(&parent));
    }

    #[test]
    fn test_adls_location_parts() {
        let location =
            Location::from_str("abfss://fs@account.dfs.core.windows.net/prefix/x").unwrap();
        assert_eq!(location.username(), "fs");
        assert_eq!(location.authority_host(), "account.dfs.core.windows.net");
        assert_eq!(location.key(), "prefix/x");
    }

    #[test]
    fn test_rejects_query_and_missing_bucket() {
        assert!(Location::from_str("s3://bucket/a?x=1").is_err());
        assert!(Location::from_str("s3:///a").is_err());
        assert!(Location::from_str("not a url").is_err());
    }
}
