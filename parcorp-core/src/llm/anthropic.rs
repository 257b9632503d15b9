use std::env::VarError;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    consts::{
        ANTHROPIC_API_KEY_ENV_NAME, ANTHROPIC_MESSAGES_URL, ANTHROPIC_VERSION, CLAUDE_INPUT_COST,
        CLAUDE_OUTPUT_COST, CLAUDE_SONNET_MODEL,
    },
    error::*,
    llm::{
        client::{Capabilities, Completion, CompletionRequest, VisionBackend},
        cost::{TokenRates, Usage},
        prompts::ToolDefinition,
    },
};

const BACKEND_NAME: &str = "anthropic";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<&'a ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Content<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    r#type: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    r#type: &'static str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse { input: serde_json::Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Claude through the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    model: String,
    rates: TokenRates,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: CLAUDE_SONNET_MODEL.to_string(),
            rates: TokenRates::new(CLAUDE_INPUT_COST, CLAUDE_OUTPUT_COST),
        }
    }

    /// Reads the API key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, CorpusError> {
        Self::from_var(std::env::var(ANTHROPIC_API_KEY_ENV_NAME))
    }

    fn from_var(var: Result<String, VarError>) -> Result<Self, CorpusError> {
        let api_key = var.context(EnvNotFoundSnafu {
            name: ANTHROPIC_API_KEY_ENV_NAME,
        })?;
        Ok(Self::new(api_key))
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest<'a>) -> MessagesRequest<'a> {
        let content = vec![
            Content::Image {
                source: ImageSource {
                    r#type: "base64",
                    media_type: request.image.media_type,
                    data: request.image.base64(),
                },
            },
            Content::Text {
                text: &request.prompt.text,
            },
        ];

        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: request.tool.into_iter().collect(),
            tool_choice: request.tool.map(|tool| ToolChoice {
                r#type: "tool",
                name: &tool.name,
            }),
        }
    }
}

/// Turns a response into text: the first tool input if any, else the
/// concatenated text blocks.
fn into_completion(response: MessagesResponse) -> Result<Completion, CorpusError> {
    let usage = Usage {
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    };

    let mut texts = Vec::new();
    for block in response.content {
        match block {
            ResponseBlock::ToolUse { input } => {
                // the pair list is wrapped in an object to satisfy the tool schema
                let value = match input {
                    serde_json::Value::Object(mut map) if map.contains_key("pairs") => {
                        map.remove("pairs").unwrap_or_default()
                    }
                    other => other,
                };
                return Ok(Completion {
                    text: value.to_string(),
                    usage,
                });
            }
            ResponseBlock::Text { text } => texts.push(text),
            ResponseBlock::Other => {}
        }
    }

    if texts.is_empty() {
        return MalformedResponseSnafu {
            backend: BACKEND_NAME,
            message: "response has no text or tool_use block",
        }
        .fail();
    }

    Ok(Completion {
        text: texts.join("\n"),
        usage,
    })
}

impl VisionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            vision: true,
            tools: true,
        }
    }

    fn rates(&self) -> TokenRates {
        self.rates
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CorpusError> {
        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.body(request))
            .send()
            .await
            .context(HttpSnafu {
                backend: BACKEND_NAME,
            })?;

        let status = response.status();
        let body = response.text().await.context(HttpSnafu {
            backend: BACKEND_NAME,
        })?;

        if !status.is_success() {
            return ApiStatusSnafu {
                backend: BACKEND_NAME,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|err| CorpusError::MalformedResponse {
                backend: BACKEND_NAME.to_string(),
                message: err.to_string(),
            })?;

        into_completion(parsed)
    }
}
