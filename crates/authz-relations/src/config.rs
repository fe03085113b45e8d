use std::{path::PathBuf, sync::LazyLock};

use serde::{Deserialize, Serialize};

pub static CONFIG: LazyLock<RelationsConfig> = LazyLock::new(get_config);

#[derive(Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
pub struct RelationsConfig {
    /// Maximum number of `parent` hops followed when resolving inherited roles.
    /// Namespaces nest, so this bounds namespace depth plus four.
    #[serde(default = "default_max_hierarchy_depth")]
    pub max_hierarchy_depth: usize,
    /// Persist tuples to this JSON file. Tuples live in memory only if unset.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: default_max_hierarchy_depth(),
            snapshot_path: None,
        }
    }
}

fn default_max_hierarchy_depth() -> usize {
    32
}

fn get_config() -> RelationsConfig {
    let defaults = figment::providers::Serialized::defaults(RelationsConfig::default());

    #[cfg(not(test))]
    let prefix = "ICEHOUSE__RELATIONS__";
    #[cfg(test)]
    let prefix = "ICEHOUSE_TEST__RELATIONS__";

    let config = figment::Figment::from(defaults).merge(figment::providers::Env::prefixed(prefix));

    match config.extract::<RelationsConfig>() {
        Ok(c) => c,
        Err(e) => {
            panic!("Failed to extract relations authorizer config: {e}");
        }
    }
}
