use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[cfg(feature = "axum")]
use super::impl_into_response;

/// Request a client sends to have an S3 request signed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct S3SignRequest {
    pub region: String,
    pub uri: url::Url,
    pub method: String,
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct S3SignResponse {
    pub uri: url::Url,
    pub headers: HashMap<String, Vec<String>>,
}

#[cfg(feature = "axum")]
impl_into_response!(S3SignResponse);
