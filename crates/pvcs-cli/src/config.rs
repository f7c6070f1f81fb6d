use std::path::Path;

use anyhow::Context;
use pvcs_format::DecodeConfig;
use serde::{Deserialize, Serialize};

use crate::cli::DecodeLimits;

/// Settings loaded from the `--config` TOML file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub decode: DecodeConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// The decode configuration with command-line flags applied on top.
    pub fn decode_config(&self, limits: &DecodeLimits) -> DecodeConfig {
        let mut config = self.decode.clone();
        if let Some(max) = limits.max_field_len {
            config.max_field_len = Some(max);
        }
        if limits.lossy {
            config.strict_utf8 = false;
        }
        config
    }
}
