use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub(crate) static CONFIG_BIN: LazyLock<BinConfig> = LazyLock::new(get_config);

#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub(crate) struct BinConfig {
    pub(crate) debug: DebugConfig,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub(crate) struct DebugConfig {
    /// Run the serve command unless another command is specified.
    pub(crate) auto_serve: bool,
    /// Add file and line number to every log line.
    pub(crate) extended_logs: bool,
}

fn get_config() -> BinConfig {
    let defaults = figment::providers::Serialized::defaults(BinConfig::default());

    #[cfg(not(test))]
    let prefix = "ICEHOUSE__";
    #[cfg(test)]
    let prefix = "ICEHOUSE_TEST__";

    let config = figment::Figment::from(defaults)
        .merge(figment::providers::Env::prefixed(prefix).split("__"));

    match config.extract::<BinConfig>() {
        Ok(c) => c,
        Err(e) => {
            panic!("Failed to extract Icehouse binary config: {e}");
        }
    }
}
