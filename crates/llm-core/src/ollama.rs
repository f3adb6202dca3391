//! Ollama API client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options forwarded to the model
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

/// A locally pulled model, as listed by `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub name: String,
}

impl Model {
    /// Whether this is the model a config names. A bare name means `:latest`.
    pub fn matches(&self, wanted: &str) -> bool {
        self.name == wanted || (!wanted.contains(':') && self.name == format!("{}:latest", wanted))
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<Model>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

/// Non-streaming chat response
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u64,
    #[serde(default)]
    pub eval_duration: u64,
}

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new client with default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(300))
    }

    /// Create a new client with a per-request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Check if Ollama is running
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// List the models pulled into this Ollama instance
    pub async fn list_models(&self) -> Result<Vec<Model>> {
        let url = format!("{}/api/tags", self.base_url);

        let resp: TagsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to connect to Ollama")?
            .error_for_status()
            .context("Listing models failed")?
            .json()
            .await
            .context("Failed to parse models response")?;

        Ok(resp.models)
    }

    /// Send a chat request and wait for the full reply
    #[instrument(skip(self, messages, options), fields(messages = messages.len()))]
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<ChatOptions>,
    ) -> Result<ChatResponse> {
        self.send_chat(ChatRequest {
            model,
            messages,
            stream: false,
            format: None,
            options,
        })
        .await
    }

    /// Chat with the reply constrained to a JSON schema
    ///
    /// The returned message content is JSON text; decoding it is left to the
    /// caller so that malformed output can be reported separately.
    #[instrument(skip(self, messages, schema, options), fields(messages = messages.len()))]
    pub async fn chat_structured(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        options: Option<ChatOptions>,
    ) -> Result<ChatResponse> {
        self.send_chat(ChatRequest {
            model,
            messages,
            stream: false,
            format: Some(schema),
            options,
        })
        .await
    }

    async fn send_chat(&self, req: ChatRequest<'_>) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);

        let resp: ChatResponse = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to connect to Ollama")?
            .error_for_status()
            .context("Chat request failed")?
            .json()
            .await
            .context("Failed to parse chat response")?;

        debug!(
            model = %resp.model,
            eval_count = resp.eval_count,
            reply_len = resp.message.content.len(),
            "Chat completed"
        );
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_serialization() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let schema = json!({"type": "object"});
        let req = ChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: false,
            format: Some(&schema),
            options: Some(ChatOptions {
                temperature: Some(0.2),
                num_predict: None,
            }),
        };

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["format"]["type"], "object");
        assert!(value["options"].get("num_predict").is_none());
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn test_plain_request_omits_format() {
        let messages = vec![ChatMessage::user("hi")];
        let req = ChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: false,
            format: None,
            options: None,
        };

        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("format").is_none());
        assert!(value.get("options").is_none());
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{
            "model": "llama3.2",
            "created_at": "2024-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "An outline"},
            "done": true,
            "eval_count": 42,
            "eval_duration": 1000000
        }"#;

        let resp: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.message.content, "An outline");
        assert_eq!(resp.eval_count, 42);
    }

    #[test]
    fn test_parse_tags_response() {
        let body = r#"{
            "models": [
                {"name": "llama3.2:latest", "size": 2019393189, "modified_at": "2024-09-25T12:00:00Z"},
                {"name": "qwen2.5:7b", "size": 4683087332}
            ]
        }"#;

        let resp: TagsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.models.len(), 2);
        assert!(resp.models[0].matches("llama3.2"));
        assert!(resp.models[0].matches("llama3.2:latest"));
        assert!(!resp.models[0].matches("llama3.2:1b"));
        assert!(resp.models[1].matches("qwen2.5:7b"));
        assert!(!resp.models[1].matches("qwen2.5"));
    }
}
