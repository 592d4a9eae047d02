//! Configuration management

use crate::application::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginsConfig {
    /// Plugin root directories, scanned in order
    pub roots: Vec<PathBuf>,
    pub auto_fix: AutoFixConfig,
    pub watch: WatchSettings,
    /// Upper bound for the syntax-only validation of patched source
    pub validation_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoFixConfig {
    pub enabled: bool,
    /// Auto-fix cycles attempted per file before giving up
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WatchSettings {
    pub enabled: bool,
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "starling-bot".to_string(),
                prefix: "!".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            plugins: PluginsConfig {
                roots: vec![PathBuf::from("./plugins")],
                auto_fix: AutoFixConfig {
                    enabled: true,
                    max_attempts: 2,
                },
                watch: WatchSettings {
                    enabled: true,
                    debounce_ms: 300,
                },
                validation_timeout_ms: 5000,
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn load_env() -> Self {
        let mut config = Config::default();

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }
        if let Ok(roots) = std::env::var("PLUGIN_ROOTS") {
            config.plugins.roots = roots.split(':').map(PathBuf::from).collect();
        }

        config
    }

    pub fn write_default(path: impl Into<PathBuf>) -> Result<(), ConfigError> {
        let path = path.into();
        let content = serde_yaml::to_string(&Config::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(&path, content)
            .map_err(|e| ConfigError::Parse(format!("Failed to write config: {}", e)))
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.plugins.validation_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.plugins.watch.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.bot.prefix, "!");
        assert_eq!(parsed.plugins.auto_fix.max_attempts, 2);
        assert_eq!(parsed.plugins.watch.debounce_ms, 300);
    }

    #[test]
    fn kebab_case_keys_are_accepted() {
        let yaml = r#"
bot:
  name: test
  prefix: "?"
  version: "0.0.1"
plugins:
  roots: ["./a", "./b"]
  auto-fix:
    enabled: false
    max-attempts: 1
  watch:
    enabled: false
    debounce-ms: 100
  validation-timeout-ms: 1000
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.plugins.roots.len(), 2);
        assert!(!config.plugins.auto_fix.enabled);
        assert_eq!(config.plugins.watch.debounce_ms, 100);
    }
}
