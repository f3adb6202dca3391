//! Collaborator seams and their llm-core backed implementations
//!
//! The loop only sees the three traits below; the Ollama and web search
//! adapters are wired in by the caller.

use std::time::Duration;

use async_trait::async_trait;
use llm_core::{
    ChatMessage, ChatOptions, Config, DuckDuckGoClient, OllamaClient, SearchProvider,
    SearchResult, TavilyClient,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{LoopError, Result};

/// Free-text model completion
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Model call that yields a list of search queries
///
/// Implementations return [`LoopError::QueryParse`] when the model answered
/// but the answer is not a query list, and [`LoopError::Completion`] when the
/// call itself failed.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn queries(&self, system: &str, messages: &[ChatMessage]) -> Result<Vec<String>>;
}

/// Web search returning at most `max_results` hits
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

fn with_system(system: &str, messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut all = Vec::with_capacity(messages.len() + 1);
    all.push(ChatMessage::system(system));
    all.extend_from_slice(messages);
    all
}

fn client_from_config(config: &Config) -> Result<OllamaClient> {
    OllamaClient::with_timeout(
        config.ollama_url(),
        Duration::from_secs(config.ollama.timeout_secs),
    )
    .map_err(|e| LoopError::InvalidConfiguration(format!("{:#}", e)))
}

fn options_from_config(config: &Config) -> Option<ChatOptions> {
    config.models.temperature.map(|temperature| ChatOptions {
        temperature: Some(temperature),
        num_predict: None,
    })
}

/// Completion backed by an Ollama chat model
#[derive(Debug, Clone)]
pub struct OllamaCompletion {
    client: OllamaClient,
    model: String,
    options: Option<ChatOptions>,
}

impl OllamaCompletion {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client: client_from_config(config)?,
            model: config.models.default.clone(),
            options: options_from_config(config),
        })
    }
}

#[async_trait]
impl CompletionService for OllamaCompletion {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let messages = with_system(system, messages);
        let resp = self
            .client
            .chat(&self.model, &messages, self.options.clone())
            .await
            .map_err(|e| LoopError::Completion(format!("{:#}", e)))?;
        Ok(resp.message.content)
    }
}

#[derive(Debug, Deserialize)]
struct Queries {
    queries: Vec<String>,
}

/// JSON schema handed to the model for query generation
fn queries_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "queries": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["queries"]
    })
}

/// Query generation backed by Ollama's JSON-schema output mode
#[derive(Debug, Clone)]
pub struct OllamaQueries {
    client: OllamaClient,
    model: String,
    options: Option<ChatOptions>,
}

impl OllamaQueries {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client: client_from_config(config)?,
            model: config.researcher_model().to_string(),
            options: options_from_config(config),
        })
    }
}

#[async_trait]
impl QueryService for OllamaQueries {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn queries(&self, system: &str, messages: &[ChatMessage]) -> Result<Vec<String>> {
        let messages = with_system(system, messages);
        let resp = self
            .client
            .chat_structured(&self.model, &messages, &queries_schema(), self.options.clone())
            .await
            .map_err(|e| LoopError::Completion(format!("{:#}", e)))?;

        let queries = parse_queries(&resp.message.content)?;
        debug!(count = queries.len(), "Generated search queries");
        Ok(queries)
    }
}

/// Decode `{"queries": [...]}` from model output.
///
/// Accepts bare JSON, a fenced ```json block, or a JSON object embedded in
/// surrounding prose. Blank queries are dropped.
pub fn parse_queries(content: &str) -> Result<Vec<String>> {
    let content = content.trim();
    let candidates = [
        Some(content),
        extract_json_from_markdown(content),
        extract_outer_object(content),
    ];

    let mut last_error = String::from("empty response");
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<Queries>(candidate) {
            Ok(parsed) => {
                return Ok(parsed
                    .queries
                    .into_iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect())
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(LoopError::QueryParse(last_error))
}

fn extract_json_from_markdown(content: &str) -> Option<&str> {
    let patterns = ["```json\n", "```JSON\n", "```\n"];

    for pattern in patterns {
        if let Some(start) = content.find(pattern) {
            let json_start = start + pattern.len();
            if let Some(end) = content[json_start..].find("```") {
                return Some(content[json_start..json_start + end].trim());
            }
        }
    }

    None
}

fn extract_outer_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Web search over one of the configured providers
#[derive(Debug, Clone)]
pub enum WebSearch {
    DuckDuckGo(DuckDuckGoClient),
    Tavily(TavilyClient),
}

impl WebSearch {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::for_provider(config, config.search.provider)
    }

    pub fn for_provider(config: &Config, provider: SearchProvider) -> Result<Self> {
        let timeout = Duration::from_secs(config.search.timeout_secs);

        match provider {
            SearchProvider::DuckDuckGo => DuckDuckGoClient::new(timeout)
                .map(WebSearch::DuckDuckGo)
                .map_err(|e| LoopError::InvalidConfiguration(format!("{:#}", e))),
            SearchProvider::Tavily => {
                let key = config
                    .tavily_api_key()
                    .map_err(|e| LoopError::InvalidConfiguration(format!("{:#}", e)))?;
                TavilyClient::new(key, timeout)
                    .map(WebSearch::Tavily)
                    .map_err(|e| LoopError::InvalidConfiguration(format!("{:#}", e)))
            }
        }
    }

    pub fn provider(&self) -> SearchProvider {
        match self {
            WebSearch::DuckDuckGo(_) => SearchProvider::DuckDuckGo,
            WebSearch::Tavily(_) => SearchProvider::Tavily,
        }
    }
}

#[async_trait]
impl SearchService for WebSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let results = match self {
            WebSearch::DuckDuckGo(client) => client.search(query, max_results).await,
            WebSearch::Tavily(client) => client.search(query, max_results).await,
        };
        results.map_err(|e| LoopError::Search(format!("{:#}", e)))
    }
}
