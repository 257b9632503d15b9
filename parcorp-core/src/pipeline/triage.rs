use snafu::OptionExt;
use tracing::{debug, info, warn};

use crate::{
    consts::CANDIDATE,
    error::*,
    llm::{
        client::{InferenceClient, VisionBackend},
        cost::Budget,
        prompts::JSON_EXTRACTOR_PROMPT,
    },
    pipeline::{ItemOutcome, RunOutcome, RunSummary, Stage, config::TriageConfig},
    store::{
        metadata::MetadataStore,
        triage::{TriageRecord, TriageStore},
    },
    utils::{image::PageImage, worklist::WorkItem},
};

/// Classifies whole pages and extracts JSON pairs from the candidates.
///
/// Each page is normalized from its metadata record first. Every visited page
/// gets one row in the [`TriageStore`], negatives included.
pub struct PageTriage<B: VisionBackend, M: MetadataStore> {
    client: InferenceClient<B>,
    metadata: M,
    store: TriageStore,
    config: TriageConfig,
    budget: Budget,
    stage: Stage,
}

impl<B: VisionBackend, M: MetadataStore> PageTriage<B, M> {
    pub fn new(
        client: InferenceClient<B>,
        metadata: M,
        store: TriageStore,
        config: TriageConfig,
    ) -> Self {
        Self {
            budget: Budget::new(config.cost_ceiling),
            client,
            metadata,
            store,
            config,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn client(&self) -> &InferenceClient<B> {
        &self.client
    }

    pub fn store(&self) -> &TriageStore {
        &self.store
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "triage stage");
        self.stage = stage;
    }

    pub async fn run(&mut self, worklist: &[WorkItem]) -> Result<RunSummary, CorpusError> {
        self.enter(Stage::Initializing);
        self.client.set_prompt(JSON_EXTRACTOR_PROMPT)?;
        self.client.restore_default_prompt();

        let spent_before = self.budget.spent();
        let mut summary = RunSummary::new();

        for item in worklist {
            self.enter(Stage::Iterating);
            let name = item.name();

            if self.store.contains(&name) {
                debug!(image = %name, "already triaged, skipping");
                summary.skipped += 1;
                continue;
            }

            if self.budget.is_exceeded() {
                summary.outcome = RunOutcome::BudgetExceeded;
                break;
            }

            match self.process(item, &name).await {
                Ok(ItemOutcome::Checkpointed { extracted }) => {
                    self.enter(Stage::Checkpointed);
                    summary.visited += 1;
                    summary.extracted += extracted;
                }
                Ok(ItemOutcome::BudgetExceeded) => {
                    summary.outcome = RunOutcome::BudgetExceeded;
                    break;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    self.client.restore_default_prompt();
                    warn!(image = %name, error = %err, "skipping page");
                    summary.failed += 1;
                }
            }
        }

        match summary.outcome {
            RunOutcome::BudgetExceeded => self.enter(Stage::BudgetExceeded),
            RunOutcome::WorklistExhausted => self.enter(Stage::WorklistExhausted),
        }
        summary.cost = self.budget.spent() - spent_before;

        info!(
            outcome = ?summary.outcome,
            visited = summary.visited,
            skipped = summary.skipped,
            failed = summary.failed,
            extracted = summary.extracted,
            cost = summary.cost,
            "triage finished"
        );
        Ok(summary)
    }

    async fn process(&mut self, item: &WorkItem, name: &str) -> Result<ItemOutcome, CorpusError> {
        let metadata = self
            .metadata
            .lookup(name)
            .context(MetadataNotFoundSnafu { name })?;
        let payload = PageImage::open(&item.path)?
            .rotate(metadata.rotation)
            .crop_to_quad(&metadata.corners)?
            .resize_to_aspect()
            .to_payload()?;

        self.enter(Stage::ClassifyOrExtract);
        let label = self
            .client
            .run_inference(&payload, &self.config.retry)
            .await;
        if self.charge() {
            return Ok(ItemOutcome::BudgetExceeded);
        }
        let label = label.context(InferenceExhaustedSnafu { image: name })?;

        let mut extracted_json = String::new();
        if label == CANDIDATE {
            self.client.set_prompt(JSON_EXTRACTOR_PROMPT)?;
            let extracted = self
                .client
                .run_inference(&payload, &self.config.retry)
                .await;
            self.client.restore_default_prompt();
            if self.charge() {
                return Ok(ItemOutcome::BudgetExceeded);
            }
            // a failed extraction still records the classification
            extracted_json = extracted.unwrap_or_default();
        }

        info!(image = name, label = %label, source = %item.source, "page triaged");
        let extracted = usize::from(!extracted_json.is_empty());
        self.store.append(&TriageRecord {
            image: name.to_string(),
            candidate_label: label,
            extracted_json,
            source: item.source.clone(),
        })?;

        Ok(ItemOutcome::Checkpointed { extracted })
    }

    fn charge(&mut self) -> bool {
        let cost = self.client.calculate_cost();
        let exceeded = self.budget.charge(cost);
        if exceeded {
            warn!(
                spent = self.budget.spent(),
                ceiling = self.budget.ceiling(),
                "cost ceiling exceeded, stopping"
            );
        }
        exceeded
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use image::DynamicImage;

    use super::*;
    use crate::{
        consts::{GROUND_TRUTH_SOURCE, NO_CANDIDATE, SAMPLED_SOURCE},
        llm::{
            prompts::{
                CLASSIFIER_PROMPT, EXTRACT_JSON_TOOL, PromptRegistry, PromptSet, ToolRegistry,
            },
            scripted::{Reply, ScriptedBackend},
        },
        pipeline::config::TriageConfigBuilder,
        store::{metadata::JsonMetadataStore, triage::read_records},
    };

    const METADATA: &str = r#"[
        {
            "blob_filename": "p1.png",
            "best_metadata": {"rotation": "r", "corners": "c"},
            "detections_history": {
                "r": {"rotation": 90.0},
                "c": {"corners": [0.1, 0.1, 0.9, 0.1, 0.9, 0.9, 0.1, 0.9]}
            }
        },
        {
            "blob_filename": "p2.png",
            "best_metadata": {"rotation": "r", "corners": "c"},
            "detections_history": {
                "r": {"rotation": 0.0},
                "c": {"corners": [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]}
            }
        }
    ]"#;

    fn page(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::new_rgb8(120, 80).save(&path).unwrap();
        path
    }

    fn triage(
        replies: Vec<Reply>,
        store: TriageStore,
        config: TriageConfig,
    ) -> PageTriage<ScriptedBackend, JsonMetadataStore> {
        let mut client = InferenceClient::new(
            ScriptedBackend::new(replies),
            PromptRegistry::new(PromptSet::Rapanui),
            ToolRegistry::new(PromptSet::Rapanui),
            CLASSIFIER_PROMPT,
        )
        .unwrap();
        client.set_tool(EXTRACT_JSON_TOOL).unwrap();
        let metadata = JsonMetadataStore::from_json(METADATA).unwrap();
        PageTriage::new(client, metadata, store, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_candidate_is_extracted_and_negative_recorded() -> Result<(), CorpusError> {
        let dir = tempfile::tempdir().unwrap();
        let first = page(dir.path(), "p1.png");
        let second = page(dir.path(), "p2.png");
        let csv = dir.path().join("triage.csv");

        let mut triage = triage(
            vec![
                Reply::text("Candidate", 10, 1),
                Reply::text(r#"[{"spanish": "hola", "rapanui": "iorana"}]"#, 10, 20),
                Reply::text("No Candidate", 10, 1),
            ],
            TriageStore::open(&csv)?,
            TriageConfig::default(),
        );
        let summary = triage
            .run(&[
                WorkItem::new(&first, GROUND_TRUTH_SOURCE),
                WorkItem::new(&second, SAMPLED_SOURCE),
            ])
            .await?;

        assert_eq!(summary.visited, 2);
        assert_eq!(summary.extracted, 1);
        assert_eq!(
            triage.client().backend().prompts(),
            vec![CLASSIFIER_PROMPT, JSON_EXTRACTOR_PROMPT, CLASSIFIER_PROMPT]
        );
        assert_eq!(triage.client().active_prompt().name, CLASSIFIER_PROMPT);

        let records = read_records(&csv)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image, "p1.png");
        assert_eq!(records[0].candidate_label, CANDIDATE);
        assert_eq!(
            records[0].extracted_json,
            r#"[{"spanish": "hola", "rapanui": "iorana"}]"#
        );
        assert_eq!(records[0].source, GROUND_TRUTH_SOURCE);
        assert_eq!(records[1].candidate_label, NO_CANDIDATE);
        assert_eq!(records[1].extracted_json, "");
        assert_eq!(records[1].source, SAMPLED_SOURCE);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_rows_already_written() -> Result<(), CorpusError> {
        let dir = tempfile::tempdir().unwrap();
        let first = page(dir.path(), "p1.png");
        let csv = dir.path().join("triage.csv");

        let mut store = TriageStore::open(&csv)?;
        store.append(&TriageRecord {
            image: "p1.png".to_string(),
            candidate_label: NO_CANDIDATE.to_string(),
            extracted_json: String::new(),
            source: SAMPLED_SOURCE.to_string(),
        })?;

        let mut triage = triage(Vec::new(), TriageStore::open(&csv)?, TriageConfig::default());
        let summary = triage.run(&[WorkItem::new(&first, SAMPLED_SOURCE)]).await?;

        assert_eq!(summary.skipped, 1);
        assert_eq!(triage.client().backend().calls(), 0);
        assert_eq!(read_records(&csv)?.len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_without_metadata_is_skipped() -> Result<(), CorpusError> {
        let dir = tempfile::tempdir().unwrap();
        let unknown = page(dir.path(), "p9.png");
        let second = page(dir.path(), "p2.png");
        let csv = dir.path().join("triage.csv");

        let mut triage = triage(
            vec![Reply::text("No Candidate", 10, 1)],
            TriageStore::open(&csv)?,
            TriageConfig::default(),
        );
        let summary = triage
            .run(&[
                WorkItem::new(&unknown, SAMPLED_SOURCE),
                WorkItem::new(&second, SAMPLED_SOURCE),
            ])
            .await?;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.visited, 1);
        assert_eq!(triage.client().backend().calls(), 1);
        assert!(!triage.store().contains("p9.png"));
        assert!(triage.store().contains("p2.png"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_stop_keeps_page_unwritten() -> Result<(), CorpusError> {
        let dir = tempfile::tempdir().unwrap();
        let first = page(dir.path(), "p1.png");
        let second = page(dir.path(), "p2.png");
        let csv = dir.path().join("triage.csv");
        let config = TriageConfigBuilder::default()
            .cost_ceiling(0.0001)
            .build()
            .unwrap();

        let mut triage = triage(
            vec![
                Reply::text("Candidate", 10, 1),
                Reply::text("[]", 100, 10),
            ],
            TriageStore::open(&csv)?,
            config,
        );
        let summary = triage
            .run(&[
                WorkItem::new(&first, GROUND_TRUTH_SOURCE),
                WorkItem::new(&second, SAMPLED_SOURCE),
            ])
            .await?;

        assert_eq!(summary.outcome, RunOutcome::BudgetExceeded);
        assert_eq!(triage.stage(), Stage::BudgetExceeded);
        assert_eq!(triage.client().backend().calls(), 2);
        assert!(triage.store().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_classification_is_not_recorded() -> Result<(), CorpusError> {
        let dir = tempfile::tempdir().unwrap();
        let first = page(dir.path(), "p1.png");
        let csv = dir.path().join("triage.csv");

        // an empty script fails every attempt
        let mut triage = triage(Vec::new(), TriageStore::open(&csv)?, TriageConfig::default());
        let summary = triage.run(&[WorkItem::new(&first, SAMPLED_SOURCE)]).await?;

        assert_eq!(summary.failed, 1);
        assert!(triage.store().is_empty());
        assert_eq!(triage.client().active_prompt().name, CLASSIFIER_PROMPT);
        Ok(())
    }
}
