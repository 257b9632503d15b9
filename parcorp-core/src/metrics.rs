use std::{collections::BTreeMap, fmt};

use crate::{
    consts::{CANDIDATE, GROUND_TRUTH_SOURCE, NO_CANDIDATE, SAMPLED_SOURCE},
    store::triage::TriageRecord,
};

/// Label every page from `source` is expected to get.
pub fn expected_label(source: &str) -> Option<&'static str> {
    match source {
        GROUND_TRUTH_SOURCE => Some(CANDIDATE),
        SAMPLED_SOURCE => Some(NO_CANDIDATE),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMetrics {
    pub total: usize,
    pub correct: usize,
}

impl SourceMetrics {
    /// 0 when nothing was counted.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Classifier accuracy per worklist source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriageMetrics {
    pub per_source: BTreeMap<String, SourceMetrics>,
}

impl TriageMetrics {
    /// Counts rows from sources with a known expected label; others are ignored.
    pub fn compute(records: &[TriageRecord]) -> Self {
        let mut per_source = BTreeMap::from([
            (GROUND_TRUTH_SOURCE.to_string(), SourceMetrics::default()),
            (SAMPLED_SOURCE.to_string(), SourceMetrics::default()),
        ]);

        for record in records {
            let Some(expected) = expected_label(&record.source) else {
                continue;
            };
            let metrics = per_source.entry(record.source.clone()).or_default();
            metrics.total += 1;
            if record.candidate_label == expected {
                metrics.correct += 1;
            }
        }

        Self { per_source }
    }

    pub fn overall(&self) -> SourceMetrics {
        self.per_source
            .values()
            .fold(SourceMetrics::default(), |acc, m| SourceMetrics {
                total: acc.total + m.total,
                correct: acc.correct + m.correct,
            })
    }
}

impl fmt::Display for TriageMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (source, metrics) in &self.per_source {
            writeln!(
                f,
                "{source}: {}/{} correct ({:.2}%)",
                metrics.correct,
                metrics.total,
                metrics.accuracy() * 100.0
            )?;
        }
        let overall = self.overall();
        write!(
            f,
            "overall: {}/{} correct ({:.2}%)",
            overall.correct,
            overall.total,
            overall.accuracy() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: &str, label: &str) -> TriageRecord {
        TriageRecord {
            image: "x.png".to_string(),
            candidate_label: label.to_string(),
            extracted_json: String::new(),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_metrics_per_source_and_overall() {
        let records = vec![
            record(GROUND_TRUTH_SOURCE, CANDIDATE),
            record(GROUND_TRUTH_SOURCE, NO_CANDIDATE),
            record(SAMPLED_SOURCE, NO_CANDIDATE),
            record(SAMPLED_SOURCE, NO_CANDIDATE),
            record(SAMPLED_SOURCE, ""),
            record("elsewhere", CANDIDATE),
        ];

        let metrics = TriageMetrics::compute(&records);

        let gt = metrics.per_source[GROUND_TRUTH_SOURCE];
        assert_eq!((gt.total, gt.correct), (2, 1));
        assert_eq!(gt.accuracy(), 0.5);

        let sampled = metrics.per_source[SAMPLED_SOURCE];
        assert_eq!((sampled.total, sampled.correct), (3, 2));

        assert!(!metrics.per_source.contains_key("elsewhere"));
        assert_eq!(metrics.overall(), SourceMetrics { total: 5, correct: 3 });
        assert!(metrics.to_string().ends_with("overall: 3/5 correct (60.00%)"));
    }

    #[test]
    fn test_metrics_empty() {
        let metrics = TriageMetrics::compute(&[]);
        assert_eq!(metrics.overall().accuracy(), 0.0);
        assert_eq!(metrics.per_source.len(), 2);
    }
}
