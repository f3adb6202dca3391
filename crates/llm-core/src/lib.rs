//! llm-core: Model and search clients for the essay revision loop
//!
//! Provides:
//! - Configuration loading (essay.toml)
//! - Ollama chat client (plain and JSON-schema constrained)
//! - Web search clients (DuckDuckGo, Tavily)

pub mod config;
pub mod ollama;
pub mod search;

pub use config::{Config, SearchProvider};
pub use ollama::{ChatMessage, ChatOptions, ChatResponse, Model, OllamaClient, Role};
pub use search::{DuckDuckGoClient, SearchResult, TavilyClient};
