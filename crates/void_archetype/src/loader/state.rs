//! Loader state machine

use std::fmt;

use crate::observer::Category;

/// Loader phases, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoaderState {
    Initializing,
    CollectingSources,
    CollectingCandidateTypes,
    LoadingSource { source: String, category: Category },
    RetryPasses { pass: usize },
    RunningModifications,
    FinishingTypes,
    BuildingTestModels,
    Finalizing,
    Sealed,
    /// Loading stopped before sealing
    Failed,
}

impl LoaderState {
    /// Whether no further transitions happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoaderState::Sealed | LoaderState::Failed)
    }
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderState::Initializing => f.write_str("initializing"),
            LoaderState::CollectingSources => f.write_str("collecting sources"),
            LoaderState::CollectingCandidateTypes => f.write_str("collecting candidate types"),
            LoaderState::LoadingSource { source, category } => {
                write!(f, "loading {}s from '{}'", category, source)
            }
            LoaderState::RetryPasses { pass } => write!(f, "retry pass {}", pass),
            LoaderState::RunningModifications => f.write_str("running modifications"),
            LoaderState::FinishingTypes => f.write_str("finishing types"),
            LoaderState::BuildingTestModels => f.write_str("building test models"),
            LoaderState::Finalizing => f.write_str("finalizing"),
            LoaderState::Sealed => f.write_str("sealed"),
            LoaderState::Failed => f.write_str("failed"),
        }
    }
}
