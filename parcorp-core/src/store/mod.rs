pub mod metadata;
pub mod pairs;
pub mod triage;
