//! Configuration loading for the CLI collaborator: event store + engine
//! settings from the environment, LLM provider wiring from a TOML file,
//! following the teacher's `load_config()` shape (read `--config`/`SA_CONFIG`,
//! parse if present, default otherwise).

use serde::Deserialize;

use ea_domain::config::{EngineConfig, EventStoreConfig, LlmConfig};

/// The on-disk shape of `--config <path>`. Only the LLM provider wiring is
/// file-driven; event store and engine settings come from the environment
/// per SPEC_FULL.md §6, matching the original's env-var configuration
/// surface.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub event_store: EventStoreConfig,
    pub engine: EngineConfig,
    pub llm: LlmConfig,
    pub category: String,
    pub version: Option<String>,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>, category: &str, version: Option<&str>) -> anyhow::Result<Self> {
        let path = config_path
            .map(str::to_string)
            .unwrap_or_else(|| std::env::var("EA_CONFIG").unwrap_or_else(|_| "config.toml".to_string()));

        let file_config = if std::path::Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))?
        } else {
            FileConfig::default()
        };

        Ok(Self {
            event_store: EventStoreConfig::from_env()?,
            engine: EngineConfig::from_env()?,
            llm: file_config.llm,
            category: category.to_string(),
            version: version.map(str::to_string),
        })
    }
}
