use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{Instrument, info, info_span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use parcorp_core::{
    LabelerConfig, LabelingOrchestrator, Side,
    analysis::{annotate::Annotator, labels::LabelSet},
    consts::{DEFAULT_COST_CEILING, DEFAULT_DISTANCE_THRESHOLD},
    error::CorpusError,
    inference::{
        model::session_builder,
        yolov12::{model::Yolov12, session::YoloSession},
    },
    llm::{
        anthropic::AnthropicBackend,
        client::{InferenceClient, VisionBackend},
        openai::OpenAiBackend,
        prompts::{CLASSIFIER_PROMPT, PromptRegistry, PromptSet, ToolRegistry},
        retry::RetryPolicy,
    },
    pipeline::config::LabelerConfigBuilder,
    store::{metadata::JsonMetadataStore, pairs::PairStore},
    utils::worklist::{WorkItem, list_images},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelChoice {
    Sonnet,
    Gpt,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceSide {
    Left,
    Right,
}

#[derive(Parser)]
#[command(name = "label")]
#[command(about = "Transcribe aligned regions of two-page spreads into text pairs")]
struct Args {
    #[arg(help = "Folder of page scans")]
    dataset: PathBuf,

    #[arg(short, long, default_value = "pairs.json", help = "Pair store JSON")]
    output: PathBuf,

    #[arg(long, default_value = "yolov12s-doclaynet.onnx", help = "Layout model path")]
    detector: PathBuf,

    #[arg(short, long, value_enum, default_value = "sonnet")]
    model: ModelChoice,

    #[arg(long, default_value = "nahuatl", help = "Target language prompt set")]
    prompt_type: String,

    #[arg(long, help = "Metadata JSON used to rotate and crop each page")]
    metadata: Option<PathBuf>,

    #[arg(long, default_value = "Picture", help = "Comma separated classes to ignore")]
    exclude: String,

    #[arg(long, default_value_t = DEFAULT_DISTANCE_THRESHOLD)]
    distance_threshold: f32,

    #[arg(long, value_enum, default_value = "left", help = "Half holding the Spanish text")]
    source_side: SourceSide,

    #[arg(long, help = "Skip the whole-page classification gate")]
    no_classify: bool,

    #[arg(long, default_value_t = DEFAULT_COST_CEILING, help = "Spend ceiling in USD")]
    max_cost: f64,

    #[arg(long, help = "Process at most this many pages")]
    limit: Option<usize>,

    #[arg(long, help = "Write annotated halves into this folder")]
    annotate: Option<PathBuf>,

    #[arg(long, default_value = "fonts/Arial.ttf", help = "Font for annotations")]
    font: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parcorp_core=info,label=info")),
        )
        .init();

    let args = Args::parse();
    let run_id = Uuid::new_v4();

    match args.model {
        ModelChoice::Sonnet => {
            run(AnthropicBackend::from_env()?, args)
                .instrument(info_span!("label", %run_id))
                .await
        }
        ModelChoice::Gpt => {
            run(OpenAiBackend::from_env()?, args)
                .instrument(info_span!("label", %run_id))
                .await
        }
    }
}

async fn run<B: VisionBackend>(backend: B, args: Args) -> anyhow::Result<()> {
    let prompt_set: PromptSet = args.prompt_type.parse()?;
    let client = InferenceClient::new(
        backend,
        PromptRegistry::new(prompt_set),
        ToolRegistry::new(prompt_set),
        CLASSIFIER_PROMPT,
    )?;

    let config: LabelerConfig = LabelerConfigBuilder::default()
        .distance_threshold(args.distance_threshold)
        .excluded(args.exclude.parse::<LabelSet>()?)
        .classify_pages(!args.no_classify)
        .source_side(match args.source_side {
            SourceSide::Left => Side::Left,
            SourceSide::Right => Side::Right,
        })
        .retry(RetryPolicy::default())
        .cost_ceiling(args.max_cost)
        .build()
        .map_err(CorpusError::from)?;

    let detector = YoloSession::new(session_builder()?, Yolov12::new(&args.detector))?;
    let store = PairStore::open(&args.output, prompt_set.target_key())?;
    info!(
        output = %args.output.display(),
        recorded = store.len(),
        excluded = %config.excluded,
        "pair store ready"
    );

    let mut orchestrator: LabelingOrchestrator<_, _, JsonMetadataStore> =
        LabelingOrchestrator::new(client, detector, store, config);
    if let Some(path) = &args.metadata {
        orchestrator = orchestrator.with_metadata(JsonMetadataStore::open(path)?);
    }
    if let Some(dir) = &args.annotate {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create annotation folder {}", dir.display()))?;
        orchestrator = orchestrator.with_annotations(Annotator::from_font_file(&args.font)?, dir);
    }

    let worklist = list_images(&args.dataset)?
        .into_iter()
        .take(args.limit.unwrap_or(usize::MAX))
        .map(|path| WorkItem::new(path, "dataset"))
        .collect::<Vec<_>>();
    info!(pages = worklist.len(), dataset = %args.dataset.display(), "worklist assembled");

    let summary = orchestrator.run(&worklist).await?;
    info!(
        outcome = ?summary.outcome,
        spent = orchestrator.client().total_cost(),
        "run complete"
    );
    Ok(())
}
