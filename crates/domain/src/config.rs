use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event store configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection parameters for the event log, read from the environment.
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "message_store".to_string(),
            user: "message_store".to_string(),
            password: String::new(),
            pool_min: 2,
            pool_max: 10,
        }
    }
}

impl EventStoreConfig {
    /// Reads `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`,
    /// `DB_POOL_MIN`, `DB_POOL_MAX`, falling back to the same defaults as
    /// the canonical Message DB client.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            host: env::var("DB_HOST").unwrap_or(defaults.host),
            port: env_parsed("DB_PORT", defaults.port)?,
            database: env::var("DB_NAME").unwrap_or(defaults.database),
            user: env::var("DB_USER").unwrap_or(defaults.user),
            password: env::var("DB_PASSWORD").unwrap_or(defaults.password),
            pool_min: env_parsed("DB_POOL_MIN", defaults.pool_min)?,
            pool_max: env_parsed("DB_POOL_MAX", defaults.pool_max)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("DB_HOST must not be empty".into()));
        }
        if self.database.trim().is_empty() {
            return Err(Error::Config("DB_NAME must not be empty".into()));
        }
        if self.user.trim().is_empty() {
            return Err(Error::Config("DB_USER must not be empty".into()));
        }
        Ok(())
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Processing-loop / engine configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_iterations: usize,
    /// Retry budget on LLM transport/response failures. The source's
    /// default is not uniformly documented; this implementation makes
    /// 2 the explicit default (Open Question, SPEC_FULL.md).
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_retries: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_iterations: env_parsed("MAX_ITERATIONS", defaults.max_iterations)?,
            max_retries: env_parsed("LLM_MAX_RETRIES", defaults.max_retries)?,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model provider bootstrap (ambient env-var surface, §6 config table)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The handful of environment variables §6 names for the model-provider
/// collaborator: project/location/name plus a direct API key. Distinct
/// from [`ProviderConfig`] below, which describes one *registered*
/// provider instance inside an [`LlmConfig`].
#[derive(Debug, Clone, Default)]
pub struct ModelEnvConfig {
    pub project: Option<String>,
    pub location: Option<String>,
    pub model_name: Option<String>,
    pub api_key: Option<String>,
}

impl ModelEnvConfig {
    pub fn from_env() -> Self {
        Self {
            project: env::var("MODEL_PROJECT").ok(),
            location: env::var("MODEL_LOCATION").ok(),
            model_name: env::var("MODEL_NAME").ok(),
            api_key: env::var("MODEL_API_KEY").ok(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider registry configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the whole provider registry + capability router: the
/// set of registered providers, the model role assignments the engine's
/// processing loop calls against, and shared transport policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_20000u")]
    pub default_timeout_ms: u64,
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// If true, abort startup when no providers initialize.
    #[serde(default)]
    pub require_provider: bool,
    /// Startup policy for LLM providers; takes precedence over
    /// `require_provider` when set explicitly.
    #[serde(default)]
    pub startup_policy: LlmStartupPolicy,
    /// Model roles: planner, executor, summarizer, embedder (+ custom).
    #[serde(default)]
    pub roles: HashMap<String, RoleConfig>,
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            max_retries: 2,
            require_provider: false,
            startup_policy: LlmStartupPolicy::AllowNone,
            roles: HashMap::new(),
            providers: Vec::new(),
        }
    }
}

/// Controls how the engine handles LLM provider initialization at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStartupPolicy {
    /// Boot even if no LLM providers initialize; LLM-backed calls fail
    /// until credentials are configured.
    #[default]
    AllowNone,
    /// Abort startup if no LLM providers successfully initialize.
    RequireOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Format: "provider_id/model_name"
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
    #[serde(default)]
    pub require_streaming: bool,
    #[serde(default)]
    pub fallbacks: Vec<FallbackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    pub model: String,
    #[serde(default)]
    pub require_tools: bool,
    #[serde(default)]
    pub require_json: bool,
}

/// One registered provider instance: which adapter (`kind`) to build, where
/// it lives, and how to authenticate to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    Anthropic,
    Google,
    OpenaiCodexOauth,
    AzureOpenai,
    AwsBedrock,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env or keychain).
    #[serde(default)]
    pub key: Option<String>,
    /// Multiple env var names for round-robin key rotation. Takes
    /// precedence over `env`/`key` when non-empty.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Keychain service name.
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name.
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    QueryParam,
    AwsSigv4,
    OauthDevice,
    Keychain,
    None,
}

fn d_20000u() -> u64 {
    20_000
}
fn d_2() -> u32 {
    2
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool execution configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the built-in `exec` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Hard timeout for a command (seconds).
    #[serde(default = "d_1800")]
    pub timeout_sec: u64,
    /// Max output chars kept from a command's combined stdout/stderr.
    #[serde(default = "d_1000000")]
    pub max_output_chars: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 1800,
            max_output_chars: 1_000_000,
        }
    }
}

fn d_1800() -> u64 {
    1800
}
fn d_1000000() -> usize {
    1_000_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            level: env::var("LOG_LEVEL").unwrap_or(defaults.level),
            json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json),
        }
    }
}

fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_store_defaults_match_canonical_client() {
        let config = EventStoreConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "message_store");
        assert_eq!(config.pool_min, 2);
        assert_eq!(config.pool_max, 10);
    }

    #[test]
    fn event_store_rejects_empty_host() {
        let config = EventStoreConfig {
            host: String::new(),
            ..EventStoreConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn engine_default_retry_budget_is_two() {
        assert_eq!(EngineConfig::default().max_retries, 2);
    }

    #[test]
    fn llm_config_default_allows_no_providers() {
        let config = LlmConfig::default();
        assert_eq!(config.startup_policy, LlmStartupPolicy::AllowNone);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn provider_config_deserializes() {
        let json = r#"{
            "id": "anthropic-main",
            "kind": "anthropic",
            "base_url": "https://api.anthropic.com",
            "auth": {"env": "ANTHROPIC_API_KEY"},
            "default_model": "claude-sonnet-4-20250514"
        }"#;
        let cfg: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.kind, ProviderKind::Anthropic);
        assert_eq!(cfg.auth.env.as_deref(), Some("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn exec_config_defaults() {
        let cfg = ExecConfig::default();
        assert_eq!(cfg.timeout_sec, 1800);
        assert_eq!(cfg.max_output_chars, 1_000_000);
    }
}
