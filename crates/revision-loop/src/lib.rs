//! revision-loop: plan → research → draft → critique → research → redraft
//!
//! Provides:
//! - Run state and the stage transition function
//! - Collaborator traits (completion, query generation, search) with
//!   Ollama and web search implementations
//! - Checkpoint stores for resumable runs
//! - The `RevisionLoop` driver

pub mod checkpoint;
pub mod collaborators;
pub mod driver;
pub mod error;
pub mod prompts;
pub mod roles;
pub mod stage;
pub mod state;

#[cfg(test)]
mod testing;

pub use checkpoint::{
    Checkpoint, CheckpointStore, CheckpointSummary, FileCheckpointStore, MemoryCheckpointStore,
};
pub use collaborators::{
    CompletionService, OllamaCompletion, OllamaQueries, QueryService, SearchService, WebSearch,
};
pub use driver::{RevisionLoop, Run, RunOutcome, Snapshot};
pub use error::{LoopError, Result};
pub use stage::{next_stage, should_stop, Stage};
pub use state::{LoopConfig, RunInput, TaskState};
