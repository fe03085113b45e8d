pub mod rest;

use serde::{Deserialize, Serialize};

/// Separator of namespace levels in URL path segments.
pub const NAMESPACE_SEPARATOR: char = '\u{1f}';

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid namespace identifier: {0}")]
pub struct InvalidNamespaceIdent(pub String);

/// Hierarchical namespace identifier. Every level is a non-empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct NamespaceIdent(Vec<String>);

impl NamespaceIdent {
    /// # Errors
    /// Fails for an empty identifier or if any level is empty.
    pub fn from_vec(levels: Vec<String>) -> Result<Self, InvalidNamespaceIdent> {
        if levels.is_empty() {
            return Err(InvalidNamespaceIdent(
                "Namespace must have at least one level".to_string(),
            ));
        }
        if let Some(pos) = levels.iter().position(String::is_empty) {
            return Err(InvalidNamespaceIdent(format!(
                "Namespace level {pos} must not be empty"
            )));
        }
        if levels.iter().any(|l| l.contains(NAMESPACE_SEPARATOR)) {
            return Err(InvalidNamespaceIdent(
                "Namespace levels must not contain the unit separator".to_string(),
            ));
        }
        Ok(Self(levels))
    }

    /// # Errors
    /// Fails if the name is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNamespaceIdent> {
        Self::from_vec(vec![name.into()])
    }

    /// Parse the `%1F`-joined form used in URLs. Percent decoding is expected to have
    /// happened already.
    ///
    /// # Errors
    /// Fails if any level is empty.
    pub fn from_url_segment(segment: &str) -> Result<Self, InvalidNamespaceIdent> {
        Self::from_vec(
            segment
                .split(NAMESPACE_SEPARATOR)
                .map(ToString::to_string)
                .collect(),
        )
    }

    #[must_use]
    pub fn to_url_string(&self) -> String {
        self.0.join(&NAMESPACE_SEPARATOR.to_string())
    }

    #[must_use]
    pub fn inner(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        (self.0.len() > 1).then(|| Self(self.0[..self.0.len() - 1].to_vec()))
    }

    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut levels = self.0.clone();
        levels.push(name.into());
        Self(levels)
    }

    /// Whether `self` is a direct child of `parent` (`None` meaning the root).
    #[must_use]
    pub fn is_direct_child_of(&self, parent: Option<&NamespaceIdent>) -> bool {
        match parent {
            None => self.0.len() == 1,
            Some(p) => self.0.len() == p.0.len() + 1 && self.0.starts_with(&p.0),
        }
    }

    /// Whether `self` lies below `ancestor`, excluding equality.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &NamespaceIdent) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }
}

impl TryFrom<Vec<String>> for NamespaceIdent {
    type Error = InvalidNamespaceIdent;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_vec(value)
    }
}

impl From<NamespaceIdent> for Vec<String> {
    fn from(value: NamespaceIdent) -> Self {
        value.0
    }
}

impl std::fmt::Display for NamespaceIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// Identifier of a table or view: a namespace plus a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdent {
    pub namespace: NamespaceIdent,
    pub name: String,
}

impl TableIdent {
    #[must_use]
    pub fn new(namespace: NamespaceIdent, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TableIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_url_roundtrip_and_hierarchy() {
        let ns = NamespaceIdent::from_url_segment("a\u{1f}b\u{1f}c").unwrap();
        assert_eq!(ns.inner(), &["a", "b", "c"]);
        assert_eq!(ns.to_url_string(), "a\u{1f}b\u{1f}c");
        let parent = ns.parent().unwrap();
        assert!(ns.is_direct_child_of(Some(&parent)));
        assert!(!ns.is_direct_child_of(None));
        assert!(ns.is_descendant_of(&NamespaceIdent::new("a").unwrap()));
    }

    #[test]
    fn test_empty_levels_are_rejected() {
        assert!(NamespaceIdent::from_vec(vec![]).is_err());
        assert!(NamespaceIdent::from_url_segment("a\u{1f}").is_err());
        assert!(serde_json::from_str::<NamespaceIdent>(r#"["a", ""]"#).is_err());
        let ns: NamespaceIdent = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(serde_json::to_string(&ns).unwrap(), r#"["a","b"]"#);
    }
}
