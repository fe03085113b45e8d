use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[cfg(feature = "axum")]
use super::impl_into_response;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogConfig {
    pub defaults: HashMap<String, String>,
    pub overrides: HashMap<String, String>,
    /// Routes supported by this catalog, formatted `<METHOD> <path>`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConfigQueryParams {
    /// `<project-id>/<warehouse-name>`, or just the name when a default project is set.
    #[serde(default)]
    pub warehouse: Option<String>,
}

#[cfg(feature = "axum")]
impl_into_response!(CatalogConfig);
