use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[cfg(feature = "axum")]
use super::impl_into_response;
use crate::catalog::NamespaceIdent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateNamespaceRequest {
    pub namespace: NamespaceIdent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateNamespaceResponse {
    pub namespace: NamespaceIdent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, String>>,
}

pub type GetNamespaceResponse = CreateNamespaceResponse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListNamespacesResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub namespaces: Vec<NamespaceIdent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNamespacesQuery {
    /// Only direct children of this namespace are listed; the root if absent.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateNamespacePropertiesRequest {
    #[serde(default)]
    pub removals: Option<Vec<String>>,
    #[serde(default)]
    pub updates: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateNamespacePropertiesResponse {
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Keys requested for removal that were not present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

#[cfg(feature = "axum")]
impl_into_response!(CreateNamespaceResponse);
#[cfg(feature = "axum")]
impl_into_response!(ListNamespacesResponse);
#[cfg(feature = "axum")]
impl_into_response!(UpdateNamespacePropertiesResponse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_properties_response_omits_missing_when_none() {
        let response = UpdateNamespacePropertiesResponse {
            updated: vec!["a".to_string()],
            removed: vec![],
            missing: None,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"updated": ["a"], "removed": []})
        );
    }
}
