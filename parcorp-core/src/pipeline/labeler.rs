use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use snafu::OptionExt;
use tracing::{debug, info, warn};

use crate::{
    analysis::{annotate::Annotator, cropper::BoxCropper, matcher::BoxMatcher},
    consts::CANDIDATE,
    error::*,
    inference::detector::Detector,
    layout::element::{Detection, filter_excluded},
    llm::{
        client::{InferenceClient, VisionBackend},
        cost::Budget,
        prompts::{SPANISH_TEXT_PROMPT, TARGET_TEXT_PROMPT},
    },
    pipeline::{
        ItemOutcome, RunOutcome, RunSummary, Stage,
        config::{LabelerConfig, Side},
    },
    store::{
        metadata::MetadataStore,
        pairs::{PairStore, TextPair},
    },
    utils::{
        image::{ImagePayload, PageImage},
        worklist::WorkItem,
    },
};

/// Drives the crop-pair path over a worklist: detect on both halves of a
/// spread, match and crop the regions, then transcribe each side.
///
/// Every page is checkpointed into the [`PairStore`], so a rerun over the same
/// worklist resumes where the last one stopped.
pub struct LabelingOrchestrator<B: VisionBackend, D: Detector, M: MetadataStore> {
    client: InferenceClient<B>,
    detector: D,
    metadata: Option<M>,
    store: PairStore,
    config: LabelerConfig,
    matcher: BoxMatcher,
    cropper: BoxCropper,
    budget: Budget,
    annotations: Option<(Annotator, PathBuf)>,
    stage: Stage,
}

impl<B: VisionBackend, D: Detector, M: MetadataStore> LabelingOrchestrator<B, D, M> {
    pub fn new(
        client: InferenceClient<B>,
        detector: D,
        store: PairStore,
        config: LabelerConfig,
    ) -> Self {
        Self {
            matcher: BoxMatcher::new(config.distance_threshold),
            cropper: BoxCropper,
            budget: Budget::new(config.cost_ceiling),
            client,
            detector,
            metadata: None,
            store,
            config,
            annotations: None,
            stage: Stage::Idle,
        }
    }

    /// Rotates and crops every page with its metadata record before splitting.
    pub fn with_metadata(mut self, metadata: M) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Saves detector output drawn over each half into `dir`.
    pub fn with_annotations<P: AsRef<Path>>(mut self, annotator: Annotator, dir: P) -> Self {
        self.annotations = Some((annotator, dir.as_ref().to_path_buf()));
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn client(&self) -> &InferenceClient<B> {
        &self.client
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn store(&self) -> &PairStore {
        &self.store
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    fn enter(&mut self, stage: Stage) {
        debug!(from = %self.stage, to = %stage, "labeler stage");
        self.stage = stage;
    }

    /// Processes `worklist` in order until it is exhausted or the cost ceiling
    /// is passed.
    ///
    /// Per-page failures are logged and skipped. Configuration errors and
    /// failed checkpoint writes abort the run.
    pub async fn run(&mut self, worklist: &[WorkItem]) -> Result<RunSummary, CorpusError> {
        self.enter(Stage::Initializing);
        for name in [SPANISH_TEXT_PROMPT, TARGET_TEXT_PROMPT] {
            self.client.set_prompt(name)?;
        }
        self.client.restore_default_prompt();

        let spent_before = self.budget.spent();
        let mut summary = RunSummary::new();

        for item in worklist {
            self.enter(Stage::Iterating);
            let name = item.name();

            if self.store.contains(&name) {
                debug!(image = %name, "already labeled, skipping");
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
                    info!(image = %name, pairs = extracted, spent = self.budget.spent(), "page labeled");
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
            pairs = summary.extracted,
            cost = summary.cost,
            "labeling finished"
        );
        Ok(summary)
    }

    async fn process(&mut self, item: &WorkItem, name: &str) -> Result<ItemOutcome, CorpusError> {
        let page = self.load_page(item, name)?;

        if self.config.classify_pages {
            self.enter(Stage::ClassifyOrExtract);
            let payload = page.clone().resize_to_aspect().to_payload()?;
            let answer = self
                .client
                .run_inference(&payload, &self.config.retry)
                .await;
            if self.charge() {
                return Ok(ItemOutcome::BudgetExceeded);
            }
            let answer = answer.context(InferenceExhaustedSnafu { image: name })?;

            if answer != CANDIDATE {
                debug!(image = name, answer = %answer, "not a parallel page");
                self.store.commit(name, Vec::new())?;
                return Ok(ItemOutcome::Checkpointed { extracted: 0 });
            }
        }

        self.enter(Stage::Detecting);
        let (left_image, right_image) = page.split();
        let left = filter_excluded(self.detector.detect(&left_image)?, &self.config.excluded);
        let right = filter_excluded(self.detector.detect(&right_image)?, &self.config.excluded);
        self.annotate(name, &left_image, &left, &right_image, &right);

        self.enter(Stage::Matching);
        let matches = self.matcher.match_boxes(&left, &right);

        self.enter(Stage::Cropping);
        let crops = self
            .cropper
            .crop_and_pair(&left_image, &right_image, &matches, &left, &right);
        debug!(
            image = name,
            left = left.len(),
            right = right.len(),
            crops = crops.len(),
            "regions paired"
        );

        self.enter(Stage::ClassifyOrExtract);
        // nothing is written until the whole page is transcribed
        let mut pairs = Vec::new();
        for crop in &crops {
            if crop.is_degenerate() {
                debug!(image = name, label = %crop.label, "empty crop, skipping");
                continue;
            }

            let (source_crop, target_crop) = match self.config.source_side {
                Side::Left => (&crop.left, &crop.right),
                Side::Right => (&crop.right, &crop.left),
            };
            let source_payload = ImagePayload::encode(source_crop, ImageFormat::Png, &item.path)?;
            let target_payload = ImagePayload::encode(target_crop, ImageFormat::Png, &item.path)?;

            self.client.set_prompt(SPANISH_TEXT_PROMPT)?;
            let source = self
                .client
                .run_inference(&source_payload, &self.config.retry)
                .await;
            if self.charge() {
                self.client.restore_default_prompt();
                return Ok(ItemOutcome::BudgetExceeded);
            }
            let Some(source) = source else {
                self.client.restore_default_prompt();
                warn!(image = name, label = %crop.label, "source transcription failed, skipping pair");
                continue;
            };

            self.client.set_prompt(TARGET_TEXT_PROMPT)?;
            let target = self
                .client
                .run_inference(&target_payload, &self.config.retry)
                .await;
            self.client.restore_default_prompt();
            if self.charge() {
                return Ok(ItemOutcome::BudgetExceeded);
            }
            let Some(target) = target else {
                warn!(image = name, label = %crop.label, "target transcription failed, skipping pair");
                continue;
            };

            pairs.push(TextPair { source, target });
        }

        let extracted = pairs.len();
        self.store.commit(name, pairs)?;
        Ok(ItemOutcome::Checkpointed { extracted })
    }

    fn load_page(&self, item: &WorkItem, name: &str) -> Result<PageImage, CorpusError> {
        let page = PageImage::open(&item.path)?;
        let Some(metadata) = &self.metadata else {
            return Ok(page);
        };
        let record = metadata
            .lookup(name)
            .context(MetadataNotFoundSnafu { name })?;
        page.rotate(record.rotation).crop_to_quad(&record.corners)
    }

    /// Charges the last call against the budget; true once it is exceeded.
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

    fn annotate(
        &self,
        name: &str,
        left_image: &DynamicImage,
        left: &[Detection],
        right_image: &DynamicImage,
        right: &[Detection],
    ) {
        let Some((annotator, dir)) = &self.annotations else {
            return;
        };
        let stem = Path::new(name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());

        for (side, image, detections) in [("left", left_image, left), ("right", right_image, right)] {
            let output = dir.join(format!("{stem}_{side}.png"));
            if let Err(err) = annotator.draw_to(&output, image, detections) {
                warn!(image = name, error = %err, "annotation failed");
            }
        }
    }
}
