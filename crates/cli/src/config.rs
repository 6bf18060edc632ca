//! Optional `mapwright.toml` settings. Command-line flags override them.

use mapwright_core::CollisionPolicy;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// File looked up in the working directory when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "mapwright.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    pub engine: EngineConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct EngineConfig {
    pub collision_policy: Option<CollisionPolicy>,
    pub target_schema_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct OutputConfig {
    pub pretty: Option<bool>,
}

impl Config {
    /// Load `explicit`, else [`DEFAULT_CONFIG_FILE`] if it exists, else
    /// defaults. An explicit path that cannot be read is an error.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Config, String> {
        let path = match explicit {
            Some(p) => p,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    return Ok(Config::default());
                }
                fallback
            }
        };
        let text = fs::read_to_string(path).map_err(|e| format!("error reading {}: {e}", path.display()))?;
        Config::parse(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))
    }

    fn parse(text: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(text)
    }

    pub(crate) fn collision_policy(&self, flag: Option<CollisionPolicy>) -> CollisionPolicy {
        flag.or(self.engine.collision_policy).unwrap_or_default()
    }

    pub(crate) fn target_schema_version(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.engine.target_schema_version.clone())
            .unwrap_or_else(|| mapwright_core::SCHEMA_VERSION.to_string())
    }

    /// `--pretty` can only switch pretty output on.
    pub(crate) fn pretty(&self, flag: bool) -> bool {
        flag || self.output.pretty.unwrap_or(false)
    }
}
