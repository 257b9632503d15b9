use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{Instrument, info, info_span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use parcorp_core::{
    PageTriage, TriageConfig,
    consts::DEFAULT_COST_CEILING,
    error::CorpusError,
    llm::{
        anthropic::AnthropicBackend,
        client::{InferenceClient, VisionBackend},
        openai::OpenAiBackend,
        prompts::{CLASSIFIER_PROMPT, EXTRACT_JSON_TOOL, PromptRegistry, PromptSet, ToolRegistry},
        retry::RetryPolicy,
    },
    metrics::TriageMetrics,
    pipeline::config::TriageConfigBuilder,
    store::{
        metadata::JsonMetadataStore,
        triage::{TriageStore, read_records},
    },
    utils::worklist::{assemble, list_images, read_ground_truth},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelChoice {
    Sonnet,
    Gpt,
}

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Classify page scans and extract parallel text from candidates")]
struct Args {
    #[arg(help = "Folder of source page scans to sample from")]
    dataset: PathBuf,

    #[arg(short, long, default_value = "triage.csv", help = "Result CSV")]
    output: PathBuf,

    #[arg(long, help = "Metadata JSON with rotation and corners per page")]
    metadata: PathBuf,

    #[arg(long, help = "CSV of known parallel pages, `image` column")]
    ground_truth: Option<PathBuf>,

    #[arg(long, help = "Folder the ground-truth images live in")]
    ground_truth_root: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "sonnet")]
    model: ModelChoice,

    #[arg(long, default_value = "nahuatl", help = "Target language prompt set")]
    prompt_type: String,

    #[arg(long, default_value_t = DEFAULT_COST_CEILING, help = "Spend ceiling in USD")]
    max_cost: f64,

    #[arg(long, help = "Sample at most this many source pages")]
    limit: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parcorp_core=info,triage=info")),
        )
        .init();

    let args = Args::parse();
    let run_id = Uuid::new_v4();

    match args.model {
        ModelChoice::Sonnet => {
            run(AnthropicBackend::from_env()?, args)
                .instrument(info_span!("triage", %run_id))
                .await
        }
        ModelChoice::Gpt => {
            run(OpenAiBackend::from_env()?, args)
                .instrument(info_span!("triage", %run_id))
                .await
        }
    }
}

async fn run<B: VisionBackend>(backend: B, args: Args) -> anyhow::Result<()> {
    let prompt_set: PromptSet = args.prompt_type.parse()?;
    let mut client = InferenceClient::new(
        backend,
        PromptRegistry::new(prompt_set),
        ToolRegistry::new(prompt_set),
        CLASSIFIER_PROMPT,
    )?;
    client.set_tool(EXTRACT_JSON_TOOL)?;

    let config: TriageConfig = TriageConfigBuilder::default()
        .retry(RetryPolicy::default())
        .cost_ceiling(args.max_cost)
        .build()
        .map_err(CorpusError::from)?;

    let metadata = JsonMetadataStore::open(&args.metadata)?;
    let store = TriageStore::open(&args.output)?;
    info!(
        documents = metadata.len(),
        recorded = store.len(),
        "stores ready"
    );

    let ground_truth = match &args.ground_truth {
        Some(csv) => {
            let root = args
                .ground_truth_root
                .clone()
                .or_else(|| csv.parent().map(PathBuf::from))
                .unwrap_or_default();
            read_ground_truth(csv, root)?
        }
        None => Vec::new(),
    };
    let worklist = assemble(ground_truth, list_images(&args.dataset)?, args.limit);
    info!(pages = worklist.len(), "worklist assembled");

    let mut triage = PageTriage::new(client, metadata, store, config);
    let summary = triage.run(&worklist).await?;
    info!(outcome = ?summary.outcome, spent = summary.cost, "run complete");

    let records = read_records(&args.output)?;
    let metrics = TriageMetrics::compute(&records);
    info!("classification metrics\n{metrics}");
    Ok(())
}
