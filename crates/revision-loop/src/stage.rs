//! Stages of a run and the transition function between them

use serde::{Deserialize, Serialize};

use crate::state::TaskState;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    /// Research driven by the original task
    ResearchingTask,
    Drafting,
    Reflecting,
    /// Research driven by the latest critique
    ResearchingCritique,
    Terminal,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        self == Stage::Terminal
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Planning => "planning",
            Stage::ResearchingTask => "researching_task",
            Stage::Drafting => "drafting",
            Stage::Reflecting => "reflecting",
            Stage::ResearchingCritique => "researching_critique",
            Stage::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Stop predicate, checked only after a drafting pass.
///
/// A non-positive ceiling stops after the first draft regardless of the
/// starting revision number.
pub fn should_stop(state: &TaskState) -> bool {
    state.max_revisions() <= 0 || state.revision_number() > state.max_revisions()
}

/// Transition function. `stop` only matters when leaving `Drafting`.
pub fn next_stage(current: Stage, stop: bool) -> Stage {
    match current {
        Stage::Planning => Stage::ResearchingTask,
        Stage::ResearchingTask => Stage::Drafting,
        Stage::Drafting if stop => Stage::Terminal,
        Stage::Drafting => Stage::Reflecting,
        Stage::Reflecting => Stage::ResearchingCritique,
        Stage::ResearchingCritique => Stage::Drafting,
        Stage::Terminal => Stage::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RunInput;

    #[test]
    fn test_unconditional_edges_ignore_stop() {
        for stop in [false, true] {
            assert_eq!(next_stage(Stage::Planning, stop), Stage::ResearchingTask);
            assert_eq!(next_stage(Stage::ResearchingTask, stop), Stage::Drafting);
            assert_eq!(next_stage(Stage::Reflecting, stop), Stage::ResearchingCritique);
            assert_eq!(next_stage(Stage::ResearchingCritique, stop), Stage::Drafting);
            assert_eq!(next_stage(Stage::Terminal, stop), Stage::Terminal);
        }
    }

    #[test]
    fn test_drafting_branches() {
        assert_eq!(next_stage(Stage::Drafting, true), Stage::Terminal);
        assert_eq!(next_stage(Stage::Drafting, false), Stage::Reflecting);
    }

    #[test]
    fn test_should_stop_after_ceiling() {
        let mut state = TaskState::new(RunInput::new("t").with_max_revisions(1));
        assert!(!should_stop(&state));
        state.record_draft("d".to_string()).unwrap();
        assert!(should_stop(&state));
    }

    #[test]
    fn test_non_positive_ceiling_always_stops() {
        let state = TaskState::new(
            RunInput::new("t")
                .with_revision_number(0)
                .with_max_revisions(0),
        );
        assert!(should_stop(&state));

        let state = TaskState::new(RunInput::new("t").with_max_revisions(-3));
        assert!(should_stop(&state));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::ResearchingCritique.to_string(), "researching_critique");
        assert_eq!(
            serde_json::to_string(&Stage::ResearchingTask).unwrap(),
            "\"researching_task\""
        );
    }
}
