use derive_builder::Builder;

use crate::{
    analysis::labels::{Label, LabelSet},
    consts::{DEFAULT_COST_CEILING, DEFAULT_DISTANCE_THRESHOLD},
    error::CorpusError,
    llm::retry::RetryPolicy,
};

/// Which half of a spread holds the Spanish text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Left,
    Right,
}

/// Crop-pair labeling run settings.
#[derive(Debug, Clone, Builder)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct LabelerConfig {
    pub distance_threshold: f32,
    /// Classes dropped from detector output on both halves.
    pub excluded: LabelSet,
    /// Ask the classifier about the whole page before cropping.
    pub classify_pages: bool,
    pub source_side: Side,
    pub retry: RetryPolicy,
    pub cost_ceiling: f64,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            excluded: LabelSet::new([Label::Picture]),
            classify_pages: true,
            source_side: Side::Left,
            retry: RetryPolicy::default(),
            cost_ceiling: DEFAULT_COST_CEILING,
        }
    }
}

/// Whole-page triage run settings.
#[derive(Debug, Clone, Builder)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct TriageConfig {
    pub retry: RetryPolicy,
    pub cost_ceiling: f64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cost_ceiling: DEFAULT_COST_CEILING,
        }
    }
}

fn check_ceiling(ceiling: Option<f64>) -> Result<(), String> {
    match ceiling {
        Some(value) if !(value.is_finite() && value >= 0.0) => {
            Err(format!("cost ceiling must be a non-negative amount, got {value}"))
        }
        _ => Ok(()),
    }
}

impl LabelerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(threshold) = self.distance_threshold {
            if !(threshold.is_finite() && threshold >= 0.0) {
                return Err(format!(
                    "distance threshold must be a non-negative distance, got {threshold}"
                ));
            }
        }
        check_ceiling(self.cost_ceiling)
    }
}

impl TriageConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check_ceiling(self.cost_ceiling)
    }
}

impl From<LabelerConfigBuilderError> for CorpusError {
    fn from(err: LabelerConfigBuilderError) -> Self {
        CorpusError::Config {
            stage: "labeler".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<TriageConfigBuilderError> for CorpusError {
    fn from(err: TriageConfigBuilderError) -> Self {
        CorpusError::Config {
            stage: "triage".to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() -> Result<(), CorpusError> {
        let config = LabelerConfigBuilder::default().build()?;
        assert_eq!(config.distance_threshold, DEFAULT_DISTANCE_THRESHOLD);
        assert_eq!(config.source_side, Side::Left);
        assert!(config.classify_pages);
        assert!(config.excluded.contains(Label::Picture));
        Ok(())
    }

    #[test]
    fn test_negative_ceiling_is_config_error() {
        let err: CorpusError = TriageConfigBuilder::default()
            .cost_ceiling(-1.0)
            .build()
            .unwrap_err()
            .into();

        match &err {
            CorpusError::Config { stage, message } => {
                assert_eq!(stage, "triage");
                assert!(message.contains("cost ceiling"));
            }
            _ => panic!("expected a config error"),
        }
        assert!(err.is_config());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_nan_threshold_is_config_error() {
        let err: CorpusError = LabelerConfigBuilder::default()
            .distance_threshold(f32::NAN)
            .build()
            .unwrap_err()
            .into();

        assert!(matches!(err, CorpusError::Config { ref stage, .. } if stage == "labeler"));
    }
}
