pub mod analysis;
pub mod consts;
pub mod error;
pub mod inference;
pub mod layout;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod utils;

pub use pipeline::{
    RunOutcome, RunSummary, Stage,
    config::{LabelerConfig, Side, TriageConfig},
    labeler::LabelingOrchestrator,
    triage::PageTriage,
};
