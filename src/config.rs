use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub files: FilesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// API key. Empty string falls back to the TABLETALK_API_KEY env var.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Maximum model-submission round trips per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Per-LLM-call watchdog timeout in seconds. 0 disables the timeout.
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    /// Whether tool results are surfaced on the wire stream (they are always
    /// folded into conversation history either way).
    #[serde(default = "default_true")]
    pub surface_tool_results: bool,
}

fn default_max_iterations() -> usize {
    10
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            llm_timeout_secs: default_llm_timeout_secs(),
            surface_tool_results: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesConfig {
    /// Hard cap on rows returned by any window operation.
    #[serde(default = "default_max_window_rows")]
    pub max_window_rows: usize,
    /// Default row count for head/tail when the model omits `n`.
    #[serde(default = "default_window_rows")]
    pub default_window_rows: usize,
}

fn default_max_window_rows() -> usize {
    100
}

fn default_window_rows() -> usize {
    5
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_window_rows: default_max_window_rows(),
            default_window_rows: default_window_rows(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;

        if config.provider.api_key.is_empty() {
            if let Ok(key) = std::env::var("TABLETALK_API_KEY") {
                config.provider.api_key = key;
            }
        }
        Ok(config)
    }

    /// Defaults plus the TABLETALK_API_KEY env var, for running without a
    /// config file at all.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("TABLETALK_API_KEY")
            .map_err(|_| anyhow::anyhow!("No config.toml found and TABLETALK_API_KEY is not set"))?;
        Ok(Self {
            provider: ProviderConfig {
                api_key,
                base_url: default_base_url(),
                model: default_model(),
            },
            agent: AgentConfig::default(),
            files: FilesConfig::default(),
        })
    }
}
