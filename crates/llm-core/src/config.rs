//! Configuration management for essay.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for in the working tree
pub const CONFIG_FILE_NAME: &str = "essay.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub revisions: RevisionsConfig,
    #[serde(default)]
    pub checkpoints: CheckpointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout; drafting long essays on local hardware is slow
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model used by the planner, drafter and critic
    pub default: String,
    /// Model used for structured query generation (falls back to `default`)
    #[serde(default)]
    pub researcher: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    DuckDuckGo,
    Tavily,
}

impl std::fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchProvider::DuckDuckGo => write!(f, "duckduckgo"),
            SearchProvider::Tavily => write!(f, "tavily"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub provider: SearchProvider,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    /// Environment variable holding the Tavily API key
    #[serde(default = "default_tavily_key_env")]
    pub tavily_api_key_env: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionsConfig {
    pub revision_number: i64,
    pub max_revisions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointsConfig {
    pub enabled: bool,
    /// Override for the run directory (defaults to the platform data dir)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_ollama_timeout() -> u64 {
    300
}

fn default_max_results() -> usize {
    2
}

fn default_max_queries() -> usize {
    3
}

fn default_tavily_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            timeout_secs: default_ollama_timeout(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: "llama3.2".to_string(),
            researcher: None,
            temperature: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::DuckDuckGo,
            max_results: default_max_results(),
            max_queries: default_max_queries(),
            tavily_api_key_env: default_tavily_key_env(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for RevisionsConfig {
    fn default() -> Self {
        Self {
            revision_number: 1,
            max_revisions: 2,
        }
    }
}

impl Default for CheckpointsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl Config {
    /// Load essay.toml if one exists, otherwise fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        match Self::find_config_path() {
            Ok(path) => Self::load_from(path),
            Err(_) => Ok(Self::default_minimal()),
        }
    }

    /// Create a minimal default configuration for when essay.toml is missing
    pub fn default_minimal() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            models: ModelsConfig::default(),
            search: SearchConfig::default(),
            revisions: RevisionsConfig::default(),
            checkpoints: CheckpointsConfig::default(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find essay.toml by searching current directory and parents
    pub fn find_config_path() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;

        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{} not found in current directory or parents", CONFIG_FILE_NAME)
    }

    /// Get Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Model used for structured query generation
    pub fn researcher_model(&self) -> &str {
        self.models
            .researcher
            .as_deref()
            .unwrap_or(&self.models.default)
    }

    /// Read the Tavily API key from the configured environment variable
    pub fn tavily_api_key(&self) -> Result<String> {
        std::env::var(&self.search.tavily_api_key_env)
            .with_context(|| format!("{} is not set", self.search.tavily_api_key_env))
    }

    /// Commented template written by `essay config init`
    pub fn template() -> &'static str {
        r#"# essay revision loop configuration

[ollama]
host = "127.0.0.1"
port = 11434
# Per-request timeout in seconds
timeout_secs = 300

[models]
# Model for planning, drafting and critique
default = "llama3.2"
# Model for search query generation (must handle JSON output)
# researcher = "qwen2.5:7b"
# temperature = 0.7

[search]
# "duckduckgo" or "tavily"
provider = "duckduckgo"
max_results = 2
max_queries = 3
tavily_api_key_env = "TAVILY_API_KEY"
timeout_secs = 30

[revisions]
revision_number = 1
max_revisions = 2

[checkpoints]
enabled = true
# dir = "/path/to/runs"
"#
    }
}
