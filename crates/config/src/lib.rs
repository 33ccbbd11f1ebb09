use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use core_types::UiLanguage;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CURRENT_SCHEMA_VERSION: u32 = 2;
pub const APP_DIR_NAME: &str = "productivity-dashboard";

pub const ENV_GATEWAY_URL: &str = "DASHBOARD_GATEWAY_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "DASHBOARD_REQUEST_TIMEOUT_SECS";
pub const ENV_LANGUAGE: &str = "DASHBOARD_LANGUAGE";

const DEFAULT_GATEWAY_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatConfig {
    #[serde(default = "default_include_context")]
    pub include_context: bool,
}

fn default_include_context() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            include_context: default_include_context(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityConfig {
    #[serde(default)]
    pub local_encryption_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub language: UiLanguage,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            language: UiLanguage::EnUs,
            gateway: GatewayConfig::default(),
            chat: ChatConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Layers `DASHBOARD_*` variables over the file values. Unusable values
    /// are logged and skipped.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_GATEWAY_URL) {
            let url = url.trim();
            if url.is_empty() {
                warn!(var = ENV_GATEWAY_URL, "ignoring empty gateway url override");
            } else {
                self.gateway.base_url = url.to_string();
            }
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.gateway.request_timeout_secs = secs,
                _ => warn!(var = ENV_REQUEST_TIMEOUT_SECS, value = %raw, "ignoring invalid timeout override"),
            }
        }

        if let Some(raw) = lookup(ENV_LANGUAGE) {
            match UiLanguage::parse(&raw) {
                Some(language) => self.language = language,
                None => warn!(var = ENV_LANGUAGE, value = %raw, "ignoring unknown language override"),
            }
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn from_default_location() -> Result<Self> {
        let mut dir = dirs::config_dir().context("failed to resolve config_dir")?;
        dir.push(APP_DIR_NAME);
        Ok(Self::from_dir(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        if self.migrate(&mut config) {
            self.save(&config)?;
        }
        Ok(config)
    }

    /// File config with process environment overrides applied. Overrides
    /// are never written back.
    pub fn load_effective(&self) -> Result<AppConfig> {
        let mut config = self.load_or_init()?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn migrate(&self, config: &mut AppConfig) -> bool {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return false;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        // v1 files could carry an empty base url.
        if config.gateway.base_url.trim().is_empty() {
            config.gateway.base_url = DEFAULT_GATEWAY_URL.to_string();
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
        true
    }
}
