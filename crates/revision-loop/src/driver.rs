//! RevisionLoop: drives a run from Planning to Terminal

use std::sync::Arc;

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::collaborators::{CompletionService, QueryService, SearchService};
use crate::error::{LoopError, Result};
use crate::roles::{self, ResearchFocus};
use crate::stage::{next_stage, should_stop, Stage};
use crate::state::{LoopConfig, RunInput, TaskState};

/// State after one transition
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub run_id: String,
    /// Stage that just finished
    pub completed: Stage,
    /// Stage the run moves to
    pub next: Stage,
    pub state: TaskState,
}

/// Result of a run that reached Terminal
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub draft: String,
    pub state: TaskState,
}

/// The loop orchestrator. Collaborators are injected; cloning is cheap.
#[derive(Clone)]
pub struct RevisionLoop {
    completion: Arc<dyn CompletionService>,
    queries: Arc<dyn QueryService>,
    search: Arc<dyn SearchService>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    config: LoopConfig,
}

impl RevisionLoop {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        queries: Arc<dyn QueryService>,
        search: Arc<dyn SearchService>,
    ) -> Self {
        Self {
            completion,
            queries,
            search,
            checkpoints: None,
            config: LoopConfig::default(),
        }
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether runs from this loop can be resumed later
    pub fn has_checkpoints(&self) -> bool {
        self.checkpoints.is_some()
    }

    /// Validate input and create a run positioned at Planning
    #[instrument(skip(self, input), fields(task_len = input.task.len()))]
    pub async fn start(&self, input: RunInput) -> Result<Run> {
        self.config.validate()?;
        input.validate()?;

        let run = Run {
            driver: self.clone(),
            run_id: uuid::Uuid::new_v4().to_string(),
            stage: Stage::Planning,
            state: TaskState::new(input),
            created_at: Utc::now(),
        };
        info!(
            run_id = %run.run_id,
            revision_number = run.state.revision_number(),
            max_revisions = run.state.max_revisions(),
            "Starting run"
        );
        run.save_checkpoint().await?;
        Ok(run)
    }

    /// Continue a checkpointed run from the stage it had reached
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: &str) -> Result<Run> {
        self.config.validate()?;
        let store = self.checkpoints.as_ref().ok_or_else(|| {
            LoopError::InvalidConfiguration("resuming requires a checkpoint store".to_string())
        })?;
        let checkpoint = store
            .load(run_id)
            .await?
            .ok_or_else(|| LoopError::RunNotFound(run_id.to_string()))?;

        info!(run_id = %run_id, next = %checkpoint.next, "Resuming run");
        Ok(Run {
            driver: self.clone(),
            run_id: checkpoint.run_id,
            stage: checkpoint.next,
            state: checkpoint.state,
            created_at: checkpoint.created_at,
        })
    }

    /// Run to Terminal and return the final draft
    pub async fn run(&self, input: RunInput) -> Result<RunOutcome> {
        self.start(input).await?.finish().await
    }

    /// Snapshot after every transition; ends at Terminal or after the first
    /// error
    pub fn stream(&self, input: RunInput) -> BoxStream<'static, Result<Snapshot>> {
        let driver = self.clone();
        Box::pin(try_stream! {
            let mut snapshots = driver.start(input).await?.into_stream();
            while let Some(snapshot) = snapshots.next().await {
                yield snapshot?;
            }
        })
    }

    async fn execute(&self, stage: Stage, state: &mut TaskState) -> Result<()> {
        match stage {
            Stage::Planning => roles::plan(self.completion.as_ref(), state).await,
            Stage::ResearchingTask => self.research(ResearchFocus::Task, state).await,
            Stage::Drafting => roles::draft(self.completion.as_ref(), state).await,
            Stage::Reflecting => roles::reflect(self.completion.as_ref(), state).await,
            Stage::ResearchingCritique => self.research(ResearchFocus::Critique, state).await,
            Stage::Terminal => Ok(()),
        }
    }

    async fn research(&self, focus: ResearchFocus, state: &mut TaskState) -> Result<()> {
        roles::research(
            self.queries.as_ref(),
            self.search.as_ref(),
            &self.config,
            focus,
            state,
        )
        .await
        .map(|_| ())
    }
}

/// A single run. Owns its state exclusively; stepping needs `&mut self`.
pub struct Run {
    driver: RevisionLoop,
    run_id: String,
    stage: Stage,
    state: TaskState,
    created_at: DateTime<Utc>,
}

impl Run {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stage that the next `step` will execute
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Last consistent state, also after a failed step
    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Whether progress is saved after each step
    pub fn is_checkpointed(&self) -> bool {
        self.driver.has_checkpoints()
    }

    /// Execute the current stage and move to the next one.
    ///
    /// Returns `None` once the run is terminal. On error the run stays at
    /// the failed stage and already-written fields are kept.
    #[instrument(skip(self), fields(run_id = %self.run_id, stage = %self.stage))]
    pub async fn step(&mut self) -> Result<Option<Snapshot>> {
        if self.stage.is_terminal() {
            return Ok(None);
        }

        let completed = self.stage;
        if let Err(e) = self.driver.execute(completed, &mut self.state).await {
            warn!(error = %e, "Stage failed, halting run");
            return Err(e);
        }

        let stop = completed == Stage::Drafting && should_stop(&self.state);
        self.stage = next_stage(completed, stop);

        info!(
            from = %completed,
            to = %self.stage,
            revision_number = self.state.revision_number(),
            notes = self.state.research_notes().len(),
            "Stage complete"
        );

        self.save_checkpoint().await?;

        Ok(Some(Snapshot {
            run_id: self.run_id.clone(),
            completed,
            next: self.stage,
            state: self.state.clone(),
        }))
    }

    /// Step until Terminal
    pub async fn finish(mut self) -> Result<RunOutcome> {
        while self.step().await?.is_some() {}

        let draft = self.state.draft.clone().ok_or_else(|| {
            LoopError::InvalidConfiguration("run reached terminal without a draft".to_string())
        })?;
        info!(
            run_id = %self.run_id,
            drafting_passes = self.state.drafting_passes(),
            revision_number = self.state.revision_number(),
            "Run completed"
        );

        Ok(RunOutcome {
            run_id: self.run_id,
            draft,
            state: self.state,
        })
    }

    /// Snapshot stream over the remaining stages
    pub fn into_stream(mut self) -> BoxStream<'static, Result<Snapshot>> {
        Box::pin(try_stream! {
            while let Some(snapshot) = self.step().await? {
                yield snapshot;
            }
        })
    }

    async fn save_checkpoint(&self) -> Result<()> {
        let Some(store) = self.driver.checkpoints.as_ref() else {
            return Ok(());
        };

        let checkpoint = Checkpoint {
            run_id: self.run_id.clone(),
            next: self.stage,
            state: self.state.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        };
        store.save(&checkpoint).await
    }
}
