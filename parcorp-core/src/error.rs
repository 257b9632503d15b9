use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CorpusError {
    #[snafu(display("Ort Session init stage `{}` error: {}", stage, source))]
    OrtInit {
        source: ort::error::Error,
        stage: String,
    },
    #[snafu(display("Build Tensor for `{}` error: {}", stage, source))]
    Tensor {
        source: ort::error::Error,
        stage: String,
    },
    #[snafu(display("Onnx Inference error: {}", source))]
    Inference { source: ort::error::Error },
    #[snafu(display("Onnx Output can not found {}", output_name))]
    NotFoundOutput { output_name: String },
    #[snafu(display("Ndarray Shape error at stage `{}`: {}", stage, source))]
    Shape {
        source: ndarray::ShapeError,
        stage: String,
    },
    #[snafu(display("Load Font `{}` error: {}", path, source))]
    Font {
        source: ab_glyph::InvalidFont,
        path: String,
    },
    #[snafu(display("Image `{}` error at stage `{}`: {}", path, stage, source))]
    Image {
        source: image::ImageError,
        stage: String,
        path: String,
    },
    #[snafu(display("Read `{}` error: {}", path, source))]
    IoRead {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Write `{}` error: {}", path, source))]
    IoWrite {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Json `{}` error: {}", path, source))]
    Json {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Csv `{}` error: {}", path, source))]
    Csv { source: csv::Error, path: String },
    #[snafu(display("Environment `{}` Not Found, error {}", name, source))]
    EnvNotFound {
        source: std::env::VarError,
        name: String,
    },
    #[snafu(display("Http request to `{}` error: {}", backend, source))]
    Http {
        source: reqwest::Error,
        backend: String,
    },
    #[snafu(display("`{}` returned status {}: {}", backend, status, body))]
    ApiStatus {
        backend: String,
        status: u16,
        body: String,
    },
    #[snafu(display("`{}` returned a malformed response: {}", backend, message))]
    MalformedResponse { backend: String, message: String },
    #[snafu(display("Attempt timed out after {:.1}s", seconds))]
    AttemptTimeout { seconds: f64 },
    #[snafu(display(
        "Invalid prompt type: {}. Available types are: {}",
        name,
        available
    ))]
    UnknownPrompt { name: String, available: String },
    #[snafu(display("Invalid tool: {}. Available tools are: {}", name, available))]
    UnknownTool { name: String, available: String },
    #[snafu(display("Unknown label `{}`", name))]
    UnknownLabel { name: String },
    #[snafu(display("Backend `{}` lacks capability `{}`", backend, capability))]
    CapabilityMismatch {
        backend: String,
        capability: String,
    },
    #[snafu(display("Image source `{}` is missing", path))]
    MissingImageSource { path: String },
    #[snafu(display("Image `{}` has unusable geometry: {}", path, message))]
    Geometry { path: String, message: String },
    #[snafu(display("Image `{}` not found in metadata store", name))]
    MetadataNotFound { name: String },
    #[snafu(display("All inference attempts for `{}` failed", image))]
    InferenceExhausted { image: String },
    #[snafu(display("Config `{}` error: {}", stage, message))]
    Config { stage: String, message: String },
}

impl CorpusError {
    /// Errors that indicate a setup mistake and must abort the whole run.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CorpusError::UnknownPrompt { .. }
                | CorpusError::UnknownTool { .. }
                | CorpusError::UnknownLabel { .. }
                | CorpusError::CapabilityMismatch { .. }
                | CorpusError::MissingImageSource { .. }
                | CorpusError::EnvNotFound { .. }
                | CorpusError::Config { .. }
        )
    }

    /// Errors that end a run: configuration mistakes and failed checkpoint writes.
    pub fn is_fatal(&self) -> bool {
        self.is_config()
            || matches!(
                self,
                CorpusError::IoWrite { .. } | CorpusError::Json { .. } | CorpusError::Csv { .. }
            )
    }

    /// Errors worth another attempt against the model backend.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CorpusError::Http { .. }
                | CorpusError::ApiStatus { .. }
                | CorpusError::MalformedResponse { .. }
                | CorpusError::AttemptTimeout { .. }
        )
    }
}
