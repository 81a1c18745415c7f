use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gomodel_common::{AuditCapture, parse_body_size_limit};
use gomodel_resilience::{BreakerConfig, HttpClientConfig, ResilienceConfig, RetryPolicy};
use gomodel_usage::ModelPricing;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(String),
    #[error("invalid value for env var {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

/// Merged gateway configuration. Load order: struct defaults → YAML overlay
/// → env overrides; env always wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub resilience: ResilienceSettings,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub guardrails: Vec<GuardrailSettings>,
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// When set, every non-health request must present it as a bearer token.
    pub master_key: Option<String>,
    pub body_size_limit: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            master_key: None,
            body_size_limit: "100MB".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceSettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_factor: f64,
    pub jitter_factor: f64,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_idle_conns: usize,
    pub proxy: Option<String>,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_factor: 2.0,
            jitter_factor: 0.2,
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_secs: 30,
            connect_timeout_secs: 5,
            request_timeout_secs: 600,
            read_timeout_secs: 90,
            max_idle_conns: 32,
            proxy: None,
        }
    }
}

impl ResilienceSettings {
    pub fn http_client(&self) -> HttpClientConfig {
        HttpClientConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_idle_conns: self.max_idle_conns,
            proxy: self.proxy.clone(),
        }
    }

    pub fn to_config(&self) -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryPolicy {
                max_retries: self.max_retries,
                initial_backoff: Duration::from_millis(self.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
                backoff_factor: self.backoff_factor,
                jitter_factor: self.jitter_factor,
            },
            breaker: BreakerConfig {
                failure_threshold: self.failure_threshold,
                success_threshold: self.success_threshold,
                open_timeout: Duration::from_secs(self.open_timeout_secs),
            },
        }
    }

    /// Per-provider settings inherit from the global table and may override
    /// any retry/breaker field.
    pub fn merged_with(&self, patch: Option<&ResiliencePatch>) -> ResilienceConfig {
        let mut settings = self.clone();
        if let Some(patch) = patch {
            patch.overlay(&mut settings);
        }
        settings.to_config()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResiliencePatch {
    pub max_retries: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub jitter_factor: Option<f64>,
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub open_timeout_secs: Option<u64>,
}

impl ResiliencePatch {
    fn overlay(&self, settings: &mut ResilienceSettings) {
        if let Some(value) = self.max_retries {
            settings.max_retries = value;
        }
        if let Some(value) = self.initial_backoff_ms {
            settings.initial_backoff_ms = value;
        }
        if let Some(value) = self.max_backoff_ms {
            settings.max_backoff_ms = value;
        }
        if let Some(value) = self.backoff_factor {
            settings.backoff_factor = value;
        }
        if let Some(value) = self.jitter_factor {
            settings.jitter_factor = value;
        }
        if let Some(value) = self.failure_threshold {
            settings.failure_threshold = value;
        }
        if let Some(value) = self.success_threshold {
            settings.success_threshold = value;
        }
        if let Some(value) = self.open_timeout_secs {
            settings.open_timeout_secs = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub resilience: Option<ResiliencePatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    pub refresh_interval_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardrailSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub order: i32,
    pub mode: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    pub database_url: String,
    pub buffer_size: usize,
    pub batch_flush_threshold: usize,
    pub flush_interval_secs: u64,
    /// 0 disables retention cleanup.
    pub retention_days: u32,
    pub audit: AuditCapture,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            buffer_size: 1000,
            batch_flush_threshold: 100,
            flush_interval_secs: 5,
            retention_days: 0,
            audit: AuditCapture::default(),
        }
    }
}

impl Config {
    /// Loads defaults, overlays the YAML file (when given) and applies the
    /// env table from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_yaml::from_str(&text).map_err(|err| ConfigError::Yaml(err.to_string()))?
            }
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit env binding table; each field names its variable. No
    /// reflection: adding a setting means adding a line here.
    pub fn apply_env(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = get("GOMODEL_HOST") {
            self.server.host = value;
        }
        if let Some(value) = get("GOMODEL_PORT") {
            self.server.port = parse_env("GOMODEL_PORT", &value)?;
        }
        if let Some(value) = get("GOMODEL_MASTER_KEY") {
            self.server.master_key = Some(value);
        }
        if let Some(value) = get("GOMODEL_BODY_SIZE_LIMIT") {
            self.server.body_size_limit = value;
        }
        if let Some(value) = get("GOMODEL_DATABASE_URL") {
            self.logging.database_url = value;
        }
        if let Some(value) = get("GOMODEL_REFRESH_INTERVAL_SECS") {
            self.registry.refresh_interval_secs =
                parse_env("GOMODEL_REFRESH_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = get("GOMODEL_RETENTION_DAYS") {
            self.logging.retention_days = parse_env("GOMODEL_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = get("GOMODEL_LOG_BUFFER_SIZE") {
            self.logging.buffer_size = parse_env("GOMODEL_LOG_BUFFER_SIZE", &value)?;
        }
        if let Some(value) = get("GOMODEL_FLUSH_INTERVAL_SECS") {
            self.logging.flush_interval_secs = parse_env("GOMODEL_FLUSH_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = get("GOMODEL_MAX_RETRIES") {
            self.resilience.max_retries = parse_env("GOMODEL_MAX_RETRIES", &value)?;
        }
        if let Some(value) = get("GOMODEL_PROXY") {
            self.resilience.proxy = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_body_size_limit(&self.server.body_size_limit)
            .map_err(|err| ConfigError::Invalid(err.message.clone()))?;
        for provider in &self.providers {
            if !matches!(provider.provider_type.as_str(), "openai" | "anthropic") {
                return Err(ConfigError::Invalid(format!(
                    "unknown provider type {:?} for provider {}",
                    provider.provider_type, provider.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overlays_defaults() {
        let config: Config = serde_yaml::from_str(
            "server:\n  port: 9000\nproviders:\n  - name: openai-main\n    type: openai\n    api_key: sk-test\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        // Unset fields keep their defaults.
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.registry.refresh_interval_secs, 3600);
        assert_eq!(config.providers.len(), 1);
    }

    #[test]
    fn env_always_wins() {
        let mut config: Config = serde_yaml::from_str("server:\n  port: 9000\n").unwrap();
        config
            .apply_env(|name| match name {
                "GOMODEL_PORT" => Some("7777".to_string()),
                "GOMODEL_MASTER_KEY" => Some("mk".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.server.port, 7777);
        assert_eq!(config.server.master_key.as_deref(), Some("mk"));
    }

    #[test]
    fn bad_env_value_is_a_startup_failure() {
        let mut config = Config::default();
        let err = config
            .apply_env(|name| (name == "GOMODEL_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "GOMODEL_PORT", .. }));
    }

    #[test]
    fn provider_patch_overrides_global_resilience() {
        let global = ResilienceSettings::default();
        let patch = ResiliencePatch {
            max_retries: Some(0),
            failure_threshold: Some(1),
            ..ResiliencePatch::default()
        };
        let merged = global.merged_with(Some(&patch));
        assert_eq!(merged.retry.max_retries, 0);
        assert_eq!(merged.breaker.failure_threshold, 1);
        // Untouched fields inherit.
        assert_eq!(merged.breaker.success_threshold, global.success_threshold);
    }

    #[test]
    fn invalid_body_limit_fails_validation() {
        let config: Config =
            serde_yaml::from_str("server:\n  body_size_limit: \"512\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_provider_type_fails_validation() {
        let config: Config = serde_yaml::from_str(
            "providers:\n  - name: x\n    type: carrier-pigeon\n    api_key: k\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
