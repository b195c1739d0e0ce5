use super::ConfigError;
use crate::runtime::{default_state_root_path, StatePaths};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENGINE_BASE_URL_ENV: &str = "RUNWATCH_ENGINE_BASE_URL";
pub const ENGINE_API_KEY_ENV: &str = "RUNWATCH_ENGINE_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub state_root: Option<PathBuf>,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub monitoring: MonitorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineSettings {
    #[serde(default = "default_engine_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_engine_user")]
    pub user: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: default_engine_base_url(),
            api_key: String::new(),
            user: default_engine_user(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl EngineSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub enforce_max_retries: bool,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub timeout_ms: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: default_polling_interval_ms(),
            max_retries: default_max_retries(),
            enforce_max_retries: false,
            timeout_ms: default_confirmation_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn with_polling_interval_ms(mut self, polling_interval_ms: u64) -> Self {
        self.polling_interval_ms = polling_interval_ms;
        self
    }

    /// Never zero, so a loop built from an unvalidated config still sleeps.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms.max(1))
    }

    pub fn retry_ceiling(&self) -> Option<u32> {
        if self.enforce_max_retries && self.max_retries > 0 {
            Some(self.max_retries)
        } else {
            None
        }
    }
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw, path)
    }

    pub fn from_yaml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.display().to_string(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(base_url) = non_empty_env(ENGINE_BASE_URL_ENV) {
            self.engine.base_url = base_url;
        }
        if let Some(api_key) = non_empty_env(ENGINE_API_KEY_ENV) {
            self.engine.api_key = api_key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.engine.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Settings(format!(
                "`engine.base_url` must start with http:// or https://, got `{base_url}`"
            )));
        }
        if self.engine.request_timeout_ms == 0 {
            return Err(ConfigError::Settings(
                "`engine.request_timeout_ms` must be greater than 0".to_string(),
            ));
        }
        if self.monitoring.polling_interval_ms == 0 {
            return Err(ConfigError::Settings(
                "`monitoring.polling_interval_ms` must be greater than 0".to_string(),
            ));
        }
        if let Some(root) = &self.state_root {
            if !root.is_absolute() {
                return Err(ConfigError::Settings(
                    "`state_root` must be an absolute path".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn state_paths(&self) -> Result<StatePaths, ConfigError> {
        match &self.state_root {
            Some(root) => Ok(StatePaths::new(root)),
            None => default_state_root_path()
                .map(StatePaths::new)
                .map_err(|_| ConfigError::HomeDirectoryUnavailable),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_engine_base_url() -> String {
    "https://api.dify.ai/v1".to_string()
}

fn default_engine_user() -> String {
    "system".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_polling_interval_ms() -> u64 {
    2_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_confirmation_timeout_ms() -> Option<u64> {
    Some(300_000)
}
