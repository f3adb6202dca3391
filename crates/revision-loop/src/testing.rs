//! In-memory collaborators for tests

use std::sync::Mutex;

use async_trait::async_trait;
use llm_core::{ChatMessage, SearchResult};

use crate::collaborators::{CompletionService, QueryService, SearchService};
use crate::error::{LoopError, Result};
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeRole {
    Plan,
    Draft,
    Reflect,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub role: FakeRole,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

/// Deterministic completion keyed on the system prompt
#[derive(Default)]
pub struct FakeCompletion {
    fail_on: Option<FakeRole>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(role: FakeRole) -> Self {
        Self {
            fail_on: Some(role),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, role: FakeRole) -> usize {
        self.calls().iter().filter(|c| c.role == role).count()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String> {
        let role = if system == prompts::PLAN_PROMPT {
            FakeRole::Plan
        } else if system == prompts::REFLECTION_PROMPT {
            FakeRole::Reflect
        } else {
            FakeRole::Draft
        };

        let mut calls = self.calls.lock().unwrap();
        calls.push(RecordedCall {
            role,
            system: system.to_string(),
            messages: messages.to_vec(),
        });

        if self.fail_on == Some(role) {
            return Err(LoopError::Completion("model unavailable".to_string()));
        }

        let n = calls.iter().filter(|c| c.role == role).count();
        let first_user = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        Ok(match role {
            FakeRole::Plan => format!("Outline for: {}", first_user),
            FakeRole::Draft => format!("Draft #{}", n),
            FakeRole::Reflect => format!("Critique #{}", n),
        })
    }
}

/// Query generator returning a fixed list (or a fixed error)
pub struct FakeQueries {
    outcome: std::result::Result<Vec<String>, LoopError>,
    inputs: Mutex<Vec<String>>,
}

impl FakeQueries {
    pub fn returning(queries: &[&str]) -> Self {
        Self {
            outcome: Ok(queries.iter().map(|q| q.to_string()).collect()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: LoopError) -> Self {
        Self {
            outcome: Err(error),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs_seen(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryService for FakeQueries {
    async fn queries(&self, _system: &str, messages: &[ChatMessage]) -> Result<Vec<String>> {
        if let Some(m) = messages.last() {
            self.inputs.lock().unwrap().push(m.content.clone());
        }
        self.outcome.clone()
    }
}

/// Search producing `"{query} snippet {i}"` hits
pub struct FakeSearch {
    hits_per_query: usize,
    snippets: Option<Vec<String>>,
    failing_query: Option<String>,
    seen: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn with_hits_per_query(hits_per_query: usize) -> Self {
        Self {
            hits_per_query,
            snippets: None,
            failing_query: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_hits_per_query(0)
    }

    /// Every query answers with exactly these snippets
    pub fn with_snippets(snippets: &[&str]) -> Self {
        let mut search = Self::with_hits_per_query(snippets.len());
        search.snippets = Some(snippets.iter().map(|s| s.to_string()).collect());
        search
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.failing_query = Some(query.to_string());
        self
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchService for FakeSearch {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        self.seen.lock().unwrap().push(query.to_string());

        if self.failing_query.as_deref() == Some(query) {
            return Err(LoopError::Search("connection reset".to_string()));
        }

        Ok((1..=self.hits_per_query)
            .map(|i| SearchResult {
                title: format!("{} result {}", query, i),
                url: format!("https://example.com/{}", i),
                snippet: match &self.snippets {
                    Some(snippets) => snippets[i - 1].clone(),
                    None => format!("{} snippet {}", query, i),
                },
            })
            .collect())
    }
}
