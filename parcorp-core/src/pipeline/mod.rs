pub mod config;
pub mod labeler;
pub mod triage;

use std::fmt;

/// Where an orchestrator currently is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Initializing,
    Iterating,
    Detecting,
    Matching,
    Cropping,
    ClassifyOrExtract,
    Checkpointed,
    BudgetExceeded,
    WorklistExhausted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a run stopped. Both are normal terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    WorklistExhausted,
    BudgetExceeded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Items processed and checkpointed in this run.
    pub visited: usize,
    /// Items already present in the result store.
    pub skipped: usize,
    /// Items dropped after a per-item error.
    pub failed: usize,
    /// Text pairs or extractions written in this run.
    pub extracted: usize,
    /// Spend of this run, in USD.
    pub cost: f64,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            outcome: RunOutcome::WorklistExhausted,
            visited: 0,
            skipped: 0,
            failed: 0,
            extracted: 0,
            cost: 0.0,
        }
    }
}

/// Result of one worklist item that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Checkpointed { extracted: usize },
    BudgetExceeded,
}
