use crate::analysis::labels::Label;

/// The number of values representing bounding box coordinates in YOLO format.
///
/// YOLO format uses 4 values: [center_x, center_y, width, height]
/// This constant defines the offset where class probability data begins
/// in the model output tensor.
pub const CXYWH_OFFSET: usize = 4;

/// The number of DocLayNet classes the layout model can detect.
pub const LABEL_SIZE: usize = Label::label_size();

/// The total size of each detection vector in the model output.
pub const LABEL_PROBA_SIZE: usize = CXYWH_OFFSET + LABEL_SIZE;

/// The expected output tensor shape from the YOLOv12 model.
///
/// Format: [batch_size, feature_size, num_detections]
pub const OUTPUT_SIZE: [usize; 3] = [1, LABEL_PROBA_SIZE, 21504];

/// Minimum confidence for keeping a layout detection.
pub const PROBA_THRESHOLD: f32 = 0.25;

/// Overlap ratio above which two detections are merged.
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Two detections whose centers differ by less than this many pixels
/// vertically are considered to sit on the same line when ordering output.
pub const Y_TOLERANCE_THRESHOLD: f32 = 10.0;

/// Required input width for the YOLOv12 model.
pub const REQUIRED_WIDTH: u32 = 1024;

/// Required input height for the YOLOv12 model.
pub const REQUIRED_HEIGHT: u32 = 1024;

/// Background fill value for letterboxed model input (144/255).
pub const BACKGROUND_FILL_VALUE: f32 = 144.0 / 255.0;

/// Maximum center distance, in pixels, for pairing two boxes across halves.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 50.0;

/// Fraction of the page width dropped around the vertical center line when
/// splitting a spread into its two halves.
pub const CENTER_GAP_RATIO: f32 = 0.02;

/// Target canvases accepted by the vision model, as `(name, width, height)`.
///
/// Page images are shrunk to fit the canvas whose width/height ratio is the
/// closest to their own.
pub const TARGET_ASPECT_RATIOS: [(&str, u32, u32); 5] = [
    ("1:1", 1092, 1092),
    ("3:4", 951, 1268),
    ("2:3", 896, 1344),
    ("9:16", 819, 1456),
    ("1:2", 784, 1568),
];

/// Image file extensions picked up when listing a source folder.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "gif", "tiff", "webp"];

/// Retries after the first attempt for a single inference call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wall-clock limit for one inference attempt, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// First backoff delay between inference attempts, in milliseconds.
pub const DEFAULT_BACKOFF_MIN_MS: u64 = 500;

/// Upper bound for a single backoff delay, in milliseconds.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 8_000;

/// Session spend, in USD, after which no further model calls are made.
pub const DEFAULT_COST_CEILING: f64 = 10.0;

/// Token limit for every completion request.
pub const MAX_OUTPUT_TOKENS: u32 = 1024;

pub const ANTHROPIC_API_KEY_ENV_NAME: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const CLAUDE_SONNET_MODEL: &str = "claude-3-5-sonnet-20241022";
/// USD per input token for Claude 3.5 Sonnet.
pub const CLAUDE_INPUT_COST: f64 = 0.000003;
/// USD per output token for Claude 3.5 Sonnet.
pub const CLAUDE_OUTPUT_COST: f64 = 0.000015;

pub const OPENAI_API_KEY_ENV_NAME: &str = "OPENAI_API_KEY";

/// Classification answers produced by the classifier prompt.
pub const CANDIDATE: &str = "Candidate";
pub const NO_CANDIDATE: &str = "No Candidate";

/// Worklist source tags written into the `type` column of the triage CSV.
pub const GROUND_TRUTH_SOURCE: &str = "pairs_candidates";
pub const SAMPLED_SOURCE: &str = "sources_traductor";
