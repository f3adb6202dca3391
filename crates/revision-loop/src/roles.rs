//! The four roles a run moves through: planner, researcher, drafter, critic
//!
//! Each role reads what it needs from [`TaskState`] and writes its own field
//! back. None of them retry.

use llm_core::ChatMessage;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::{CompletionService, QueryService, SearchService};
use crate::error::{LoopError, Result};
use crate::prompts;
use crate::state::{LoopConfig, TaskState};

/// Which text drives a research stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchFocus {
    Task,
    Critique,
}

/// Write an outline for the task into `plan`
#[instrument(skip_all)]
pub async fn plan(completion: &dyn CompletionService, state: &mut TaskState) -> Result<()> {
    let messages = [ChatMessage::user(state.task())];
    let outline = completion.complete(prompts::PLAN_PROMPT, &messages).await?;
    debug!(plan_len = outline.len(), "Plan written");
    state.plan = Some(outline);
    Ok(())
}

/// Gather snippets for the task or the latest critique.
///
/// Returns the number of notes appended. Query-parse and search failures are
/// logged and skipped; a failed model call is returned as an error.
#[instrument(skip(queries, search, config, state))]
pub async fn research(
    queries: &dyn QueryService,
    search: &dyn SearchService,
    config: &LoopConfig,
    focus: ResearchFocus,
    state: &mut TaskState,
) -> Result<usize> {
    let (system, input) = match focus {
        ResearchFocus::Task => (prompts::RESEARCH_PLAN_PROMPT, state.task().to_string()),
        ResearchFocus::Critique => match state.critique.as_deref() {
            Some(critique) => (prompts::RESEARCH_CRITIQUE_PROMPT, critique.to_string()),
            None => {
                warn!("No critique to research yet, skipping");
                return Ok(0);
            }
        },
    };

    let generated = match queries.queries(system, &[ChatMessage::user(input)]).await {
        Ok(q) => q,
        Err(e) if e.is_soft_research_failure() => {
            warn!(error = %e, "Query generation failed, continuing without new notes");
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    let mut notes = Vec::new();
    for query in generated.iter().take(config.max_queries) {
        match search.search(query, config.max_results).await {
            Ok(hits) => {
                debug!(query = %query, hits = hits.len(), "Search returned");
                notes.extend(
                    hits.into_iter()
                        .take(config.max_results)
                        .map(|hit| hit.snippet),
                );
            }
            Err(e) if e.is_soft_research_failure() => {
                warn!(query = %query, error = %e, "Search failed, skipping query");
            }
            Err(e) => return Err(e),
        }
    }

    let added = notes.len();
    state.append_notes(notes);
    info!(
        queries = generated.len().min(config.max_queries),
        added,
        total = state.research_notes().len(),
        "Research complete"
    );
    Ok(added)
}

/// Messages for a drafting pass; feedback cycles also carry the previous
/// draft and the critique
fn draft_messages(state: &TaskState) -> Vec<ChatMessage> {
    let plan = state.plan.as_deref().unwrap_or_default();
    let mut messages = vec![ChatMessage::user(prompts::draft_request(state.task(), plan))];

    if let (Some(previous), Some(critique)) = (state.draft.as_deref(), state.critique.as_deref()) {
        messages.push(ChatMessage::assistant(previous));
        messages.push(ChatMessage::user(prompts::revision_request(critique)));
    }
    messages
}

/// Write (or rewrite) the essay and count the revision
#[instrument(skip_all, fields(revision = state.revision_number()))]
pub async fn draft(completion: &dyn CompletionService, state: &mut TaskState) -> Result<()> {
    let system = prompts::writer_prompt(&state.joined_notes());
    let messages = draft_messages(state);
    debug!(
        system_len = system.len(),
        notes = state.research_notes().len(),
        feedback = messages.len() > 1,
        "Drafting"
    );

    let essay = completion.complete(&system, &messages).await?;
    state.record_draft(essay)
}

/// Critique the current draft into `critique`
#[instrument(skip_all, fields(revision = state.revision_number()))]
pub async fn reflect(completion: &dyn CompletionService, state: &mut TaskState) -> Result<()> {
    let draft = state.draft.as_deref().ok_or_else(|| {
        LoopError::InvalidConfiguration("reflecting requires a draft".to_string())
    })?;

    let messages = [ChatMessage::user(draft)];
    let critique = completion
        .complete(prompts::REFLECTION_PROMPT, &messages)
        .await?;
    state.critique = Some(critique);
    Ok(())
}
