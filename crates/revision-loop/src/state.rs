//! Run state and input validation

use serde::{Deserialize, Serialize};

use crate::error::{LoopError, Result};

/// Default number of search queries kept per research stage
pub const DEFAULT_MAX_QUERIES: usize = 3;
/// Default number of snippets fetched per query
pub const DEFAULT_MAX_RESULTS: usize = 2;

/// Caller input for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    pub task: String,
    pub revision_number: i64,
    pub max_revisions: i64,
}

impl RunInput {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            revision_number: 1,
            max_revisions: 2,
        }
    }

    pub fn with_revision_number(mut self, revision_number: i64) -> Self {
        self.revision_number = revision_number;
        self
    }

    pub fn with_max_revisions(mut self, max_revisions: i64) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    /// Reject input before any stage runs
    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            return Err(LoopError::InvalidConfiguration(
                "task must not be empty".to_string(),
            ));
        }
        if self.revision_number < 0 {
            return Err(LoopError::InvalidConfiguration(format!(
                "revision_number must be non-negative, got {}",
                self.revision_number
            )));
        }
        // The counter ends one past the larger of its start and the ceiling
        if self.revision_number.max(self.max_revisions).checked_add(1).is_none() {
            return Err(LoopError::InvalidConfiguration(format!(
                "revision_number {} and max_revisions {} leave no room to count a revision",
                self.revision_number, self.max_revisions
            )));
        }
        Ok(())
    }
}

/// Research tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Queries kept from each structured-query call
    pub max_queries: usize,
    /// Snippets requested per query
    pub max_results: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_queries: DEFAULT_MAX_QUERIES,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl LoopConfig {
    pub fn with_max_queries(mut self, max: usize) -> Self {
        self.max_queries = max;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_queries == 0 {
            return Err(LoopError::InvalidConfiguration(
                "max_queries must be at least 1".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(LoopError::InvalidConfiguration(
                "max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// State of a single essay run
///
/// `research_notes` is append-only: the only way to change it is
/// [`TaskState::append_notes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    task: String,
    pub plan: Option<String>,
    pub draft: Option<String>,
    pub critique: Option<String>,
    research_notes: Vec<String>,
    revision_number: i64,
    max_revisions: i64,
    /// Starting value of `revision_number`
    starting_revision: i64,
    /// Drafting stages executed so far
    drafting_passes: u32,
}

impl TaskState {
    pub fn new(input: RunInput) -> Self {
        Self {
            task: input.task,
            plan: None,
            draft: None,
            critique: None,
            research_notes: Vec::new(),
            revision_number: input.revision_number,
            max_revisions: input.max_revisions,
            starting_revision: input.revision_number,
            drafting_passes: 0,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn research_notes(&self) -> &[String] {
        &self.research_notes
    }

    pub fn revision_number(&self) -> i64 {
        self.revision_number
    }

    pub fn max_revisions(&self) -> i64 {
        self.max_revisions
    }

    pub fn starting_revision(&self) -> i64 {
        self.starting_revision
    }

    pub fn drafting_passes(&self) -> u32 {
        self.drafting_passes
    }

    pub fn append_notes(&mut self, notes: impl IntoIterator<Item = String>) {
        self.research_notes.extend(notes);
    }

    /// Notes joined the way the drafter consumes them
    pub fn joined_notes(&self) -> String {
        self.research_notes.join("\n\n")
    }

    /// Store a finished draft and count the revision
    pub fn record_draft(&mut self, draft: String) -> Result<()> {
        let (Some(revision), Some(passes)) = (
            self.revision_number.checked_add(1),
            self.drafting_passes.checked_add(1),
        ) else {
            return Err(LoopError::InvalidConfiguration(format!(
                "revision counter overflow at {}",
                self.revision_number
            )));
        };
        self.draft = Some(draft);
        self.revision_number = revision;
        self.drafting_passes = passes;
        Ok(())
    }
}
