//! Load report

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;
use crate::loader::LoaderState;
use crate::observer::Category;

/// One item that failed to initialize, with its cause
#[derive(Clone, Debug)]
pub struct LoadFailure {
    pub category: Category,
    pub item: String,
    pub source_id: Option<String>,
    pub error: Error,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_id {
            Some(source) => write!(f, "{} {} (from '{}'): {}", self.category, self.item, source, self.error),
            None => write!(f, "{} {}: {}", self.category, self.item, self.error),
        }
    }
}

/// An item the loader deliberately did not build
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedItem {
    pub category: Category,
    pub item: String,
    pub reason: String,
}

/// Outcome of one loader run
#[derive(Clone, Debug)]
pub struct LoadReport {
    pub state: LoaderState,
    /// Source ids in load order
    pub sources: Vec<String>,
    pub initialized: BTreeMap<Category, usize>,
    pub skipped: Vec<SkippedItem>,
    /// Items that failed for a reason other than a missing dependency
    pub failures: Vec<LoadFailure>,
    /// Items still waiting on a dependency at the fixpoint
    pub unresolved: Vec<LoadFailure>,
    pub modification_failures: Vec<LoadFailure>,
    pub finish_failures: Vec<LoadFailure>,
    pub test_failures: Vec<LoadFailure>,
    pub retry_passes: usize,
    pub test_builds: usize,
}

impl LoadReport {
    pub(crate) fn new() -> Self {
        Self {
            state: LoaderState::Initializing,
            sources: Vec::new(),
            initialized: BTreeMap::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            unresolved: Vec::new(),
            modification_failures: Vec::new(),
            finish_failures: Vec::new(),
            test_failures: Vec::new(),
            retry_passes: 0,
            test_builds: 0,
        }
    }

    pub(crate) fn record_success(&mut self, category: Category) {
        *self.initialized.entry(category).or_default() += 1;
    }

    /// Number of initialized items of a category
    pub fn initialized(&self, category: Category) -> usize {
        self.initialized.get(&category).copied().unwrap_or(0)
    }

    /// Number of initialized items across all categories
    pub fn total_initialized(&self) -> usize {
        self.initialized.values().sum()
    }

    /// Whether every item resolved and every hook and test build passed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.unresolved.is_empty()
            && self.modification_failures.is_empty()
            && self.finish_failures.is_empty()
            && self.test_failures.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} initialized, {} skipped, {} failed, {} unresolved, {} retry pass(es)",
            self.state,
            self.total_initialized(),
            self.skipped.len(),
            self.failures.len(),
            self.unresolved.len(),
            self.retry_passes
        )?;
        for failure in self.failures.iter().chain(&self.unresolved) {
            writeln!(f, "  {}", failure)?;
        }
        Ok(())
    }
}
