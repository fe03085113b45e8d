use std::ops::Deref;

use icehouse_ext::catalog::rest::ErrorModel;

/// Project identifier. Any non-empty string of alphanumerics, `-` and `_`;
/// generated ids are UUIDs.
#[derive(Debug, serde::Serialize, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ProjectId(String);

impl<'de> serde::Deserialize<'de> for ProjectId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<ProjectId, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ProjectId::try_new(s).map_err(|e| serde::de::Error::custom(e.message))
    }
}

impl ProjectId {
    #[must_use]
    pub fn new(id: uuid::Uuid) -> Self {
        Self(id.to_string())
    }

    #[must_use]
    pub fn new_random() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// # Errors
    /// `BAD_REQUEST` for an empty id or disallowed characters.
    pub fn try_new(id: String) -> Result<Self, ErrorModel> {
        if id.is_empty() {
            return Err(ErrorModel::bad_request(
                "Project IDs must not be empty",
                "MalformedProjectID",
                None,
            ));
        }
        if id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Ok(Self(id))
        } else {
            Err(ErrorModel::bad_request(
                format!(
                    "Project IDs may only contain alphanumeric characters, hyphens and underscores. Got: `{id}`"
                ),
                "MalformedProjectID",
                None,
            ))
        }
    }
}

impl Deref for ProjectId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = ErrorModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_validation() {
        assert!(ProjectId::try_new("my_project-1".to_string()).is_ok());
        assert!(ProjectId::try_new(String::new()).is_err());
        assert!(ProjectId::try_new("a/b".to_string()).is_err());
        assert!(serde_json::from_str::<ProjectId>(r#""a b""#).is_err());
    }
}
