use snafu::ResultExt;

use crate::{
    consts::OPENAI_API_KEY_ENV_NAME,
    error::*,
    llm::{
        client::{Capabilities, Completion, CompletionRequest, VisionBackend},
        cost::TokenRates,
    },
};

const BACKEND_NAME: &str = "openai";

/// A text-only chat model. It never sees the image, so the inference
/// client refuses to run with it and every completion fails.
#[derive(Debug, Clone, Default)]
pub struct OpenAiBackend;

impl OpenAiBackend {
    pub fn new() -> Self {
        Self
    }

    /// Requires `OPENAI_API_KEY` to be set, same as the vision backends.
    pub fn from_env() -> Result<Self, CorpusError> {
        std::env::var(OPENAI_API_KEY_ENV_NAME).context(EnvNotFoundSnafu {
            name: OPENAI_API_KEY_ENV_NAME,
        })?;
        Ok(Self::new())
    }
}

impl VisionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            vision: false,
            tools: false,
        }
    }

    fn rates(&self) -> TokenRates {
        TokenRates::new(0.0, 0.0)
    }

    async fn complete(&self, _request: &CompletionRequest<'_>) -> Result<Completion, CorpusError> {
        CapabilityMismatchSnafu {
            backend: BACKEND_NAME,
            capability: "vision",
        }
        .fail()
    }
}
