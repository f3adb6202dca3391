//! Error types for the revision loop

use thiserror::Error;

/// Result type for loop operations
pub type Result<T> = std::result::Result<T, LoopError>;

/// Errors that can occur while driving a run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// Model completion call failed
    #[error("Completion failed: {0}")]
    Completion(String),

    /// Structured query output could not be decoded
    #[error("Could not parse search queries: {0}")]
    QueryParse(String),

    /// Search call failed
    #[error("Search failed: {0}")]
    Search(String),

    /// Run input or loop settings rejected before the first stage
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Checkpoint store failed to save or load
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// No checkpoint exists for the requested run
    #[error("Run not found: {0}")]
    RunNotFound(String),
}

impl LoopError {
    /// Research stages tolerate these and carry on with the notes they have
    pub fn is_soft_research_failure(&self) -> bool {
        matches!(self, LoopError::QueryParse(_) | LoopError::Search(_))
    }
}
