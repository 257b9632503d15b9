use std::{future::Future, time::Duration};

use backon::Retryable;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::{
    consts::{CANDIDATE, MAX_OUTPUT_TOKENS, NO_CANDIDATE},
    error::*,
    llm::{
        cost::{TokenRates, Usage},
        prompts::{Prompt, PromptKind, PromptRegistry, ToolDefinition, ToolRegistry},
        retry::RetryPolicy,
    },
    utils::image::ImagePayload,
};

/// What a backend can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub vision: bool,
    pub tools: bool,
}

/// One attempt's worth of input for a backend.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a Prompt,
    pub image: &'a ImagePayload,
    pub tool: Option<&'a ToolDefinition>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// A hosted model that answers a prompt about an image.
pub trait VisionBackend {
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn rates(&self) -> TokenRates;

    /// Sends a single request. Retrying and timeouts are up to the caller.
    fn complete(
        &self,
        request: &CompletionRequest<'_>,
    ) -> impl Future<Output = Result<Completion, CorpusError>>;
}

/// Runs prompts against a backend with retry, output cleaning and cost
/// accounting.
///
/// The active prompt is switched with [`InferenceClient::set_prompt`] and put
/// back with [`InferenceClient::restore_default_prompt`].
pub struct InferenceClient<B: VisionBackend> {
    backend: B,
    prompts: PromptRegistry,
    tools: ToolRegistry,
    default_prompt: Prompt,
    active: Prompt,
    tool: Option<ToolDefinition>,
    last_usage: Option<Usage>,
    total_cost: f64,
}

impl<B: VisionBackend> InferenceClient<B> {
    /// Fails if the backend cannot read images or `default_prompt` is unknown.
    pub fn new(
        backend: B,
        prompts: PromptRegistry,
        tools: ToolRegistry,
        default_prompt: &str,
    ) -> Result<Self, CorpusError> {
        if !backend.capabilities().vision {
            return CapabilityMismatchSnafu {
                backend: backend.name(),
                capability: "vision",
            }
            .fail();
        }

        let default_prompt = prompts.get(default_prompt)?.clone();

        Ok(Self {
            backend,
            prompts,
            tools,
            active: default_prompt.clone(),
            default_prompt,
            tool: None,
            last_usage: None,
            total_cost: 0.0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn active_prompt(&self) -> &Prompt {
        &self.active
    }

    pub fn set_prompt(&mut self, name: &str) -> Result<(), CorpusError> {
        self.active = self.prompts.get(name)?.clone();
        debug!(prompt = name, "active prompt switched");
        Ok(())
    }

    pub fn restore_default_prompt(&mut self) {
        self.active = self.default_prompt.clone();
    }

    /// Selects a tool definition, sent with every JSON-array prompt.
    pub fn set_tool(&mut self, name: &str) -> Result<(), CorpusError> {
        let tool = self.tools.get(name)?.clone();
        if !self.backend.capabilities().tools {
            return CapabilityMismatchSnafu {
                backend: self.backend.name(),
                capability: "tools",
            }
            .fail();
        }
        self.tool = Some(tool);
        Ok(())
    }

    pub fn tool(&self) -> Option<&ToolDefinition> {
        self.tool.as_ref()
    }

    /// Runs the active prompt on `image`.
    ///
    /// Makes up to `policy.max_retries + 1` attempts, each bounded by
    /// `policy.timeout`, with exponential backoff between transient failures.
    /// Returns `None` once every attempt has failed.
    pub async fn run_inference(
        &mut self,
        image: &ImagePayload,
        policy: &RetryPolicy,
    ) -> Option<String> {
        let tool = match self.active.kind {
            PromptKind::JsonArray => self.tool.as_ref(),
            _ => None,
        };
        let request = CompletionRequest {
            prompt: &self.active,
            image,
            tool,
            max_tokens: MAX_OUTPUT_TOKENS,
        };
        let backend = &self.backend;
        let request = &request;
        let attempt_timeout = policy.timeout;

        let attempt = || async move {
            match timeout(attempt_timeout, backend.complete(request)).await {
                Ok(outcome) => outcome,
                Err(_) => AttemptTimeoutSnafu {
                    seconds: attempt_timeout.as_secs_f64(),
                }
                .fail(),
            }
        };

        let outcome = attempt
            .retry(policy.backoff())
            .when(CorpusError::is_transient)
            .notify(|err: &CorpusError, delay: Duration| {
                warn!(
                    backend = backend.name(),
                    prompt = %request.prompt.name,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "inference attempt failed"
                );
            })
            .await;

        match outcome {
            Ok(completion) => {
                self.last_usage = Some(completion.usage);
                Some(self.clean_output(&completion.text))
            }
            Err(err) => {
                error!(
                    image = %image.source.display(),
                    error = %err,
                    "all inference attempts failed"
                );
                None
            }
        }
    }

    /// Charges the most recent successful call and returns its cost.
    ///
    /// Each call is charged once; without a new call this returns 0.
    pub fn calculate_cost(&mut self) -> f64 {
        let Some(usage) = self.last_usage.take() else {
            return 0.0;
        };
        let cost = self.backend.rates().cost(&usage);
        self.total_cost += cost;
        cost
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn reset_cost(&mut self) {
        self.total_cost = 0.0;
    }

    /// Normalizes a raw model answer for the active prompt.
    pub fn clean_output(&self, raw: &str) -> String {
        if self.active.kind == PromptKind::PlainText {
            return raw.trim().to_string();
        }

        if self.active.kind == PromptKind::Classification || self.tool.is_some() {
            if let Some(label) = classification_label(raw) {
                return label.to_string();
            }
        }

        json_array_span(raw).unwrap_or(raw).to_string()
    }
}

/// `No Candidate` wins over `Candidate` when both lines are present.
fn classification_label(raw: &str) -> Option<&'static str> {
    let lines = raw
        .lines()
        .map(|line| line.trim().to_lowercase())
        .collect::<Vec<_>>();

    if lines.iter().any(|line| line == "no candidate") {
        Some(NO_CANDIDATE)
    } else if lines.iter().any(|line| line == "candidate") {
        Some(CANDIDATE)
    } else {
        None
    }
}

/// Substring from the first `[` to the last `]`, inclusive.
fn json_array_span(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| raw[start..=end].trim())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::{
        prompts::{
            CLASSIFIER_PROMPT, EXTRACT_JSON_TOOL, JSON_EXTRACTOR_PROMPT, PromptSet,
            TARGET_TEXT_PROMPT,
        },
        retry::RetryPolicyBuilder,
        scripted::{Reply, ScriptedBackend},
    };

    fn client(backend: ScriptedBackend) -> InferenceClient<ScriptedBackend> {
        InferenceClient::new(
            backend,
            PromptRegistry::new(PromptSet::Rapanui),
            ToolRegistry::new(PromptSet::Rapanui),
            CLASSIFIER_PROMPT,
        )
        .unwrap()
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicyBuilder::default()
            .max_retries(max_retries)
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap()
    }

    #[test]
    fn test_clean_output_classification_in_tool_mode() -> Result<(), CorpusError> {
        let mut client = client(ScriptedBackend::default());
        client.set_tool(EXTRACT_JSON_TOOL)?;

        assert_eq!(client.clean_output("No Candidate"), NO_CANDIDATE);
        assert_eq!(client.clean_output("  no CANDIDATE \n"), NO_CANDIDATE);
        assert_eq!(client.clean_output("Answer:\nCandidate\n"), CANDIDATE);
        // both present
        assert_eq!(client.clean_output("candidate\nno candidate"), NO_CANDIDATE);
        Ok(())
    }

    #[test]
    fn test_clean_output_extracts_json_span() -> Result<(), CorpusError> {
        let mut client = client(ScriptedBackend::default());
        client.set_tool(EXTRACT_JSON_TOOL)?;
        client.set_prompt(JSON_EXTRACTOR_PROMPT)?;

        let raw = r#"Sure, here it is: [ {"spanish":"a","rapanui":"b"} ] done"#;
        assert_eq!(
            client.clean_output(raw),
            r#"[ {"spanish":"a","rapanui":"b"} ]"#
        );

        // no well ordered brackets
        assert_eq!(client.clean_output("] nothing ["), "] nothing [");
        assert_eq!(client.clean_output("no pairs"), "no pairs");
        Ok(())
    }

    #[test]
    fn test_clean_output_plain_text_is_trimmed() -> Result<(), CorpusError> {
        let mut client = client(ScriptedBackend::default());
        client.set_tool(EXTRACT_JSON_TOOL)?;
        client.set_prompt(TARGET_TEXT_PROMPT)?;

        assert_eq!(client.clean_output("  Candidate [1]\n"), "Candidate [1]");
        Ok(())
    }

    #[test]
    fn test_set_prompt_unknown_keeps_active() {
        let mut client = client(ScriptedBackend::default());
        let err = client.set_prompt("Translator").unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("Available types are"));
        assert_eq!(client.active_prompt().name, CLASSIFIER_PROMPT);
    }

    #[test]
    fn test_prompt_switch_and_restore() -> Result<(), CorpusError> {
        let mut client = client(ScriptedBackend::default());
        client.set_prompt(JSON_EXTRACTOR_PROMPT)?;
        assert_eq!(client.active_prompt().name, JSON_EXTRACTOR_PROMPT);
        client.restore_default_prompt();
        assert_eq!(client.active_prompt().name, CLASSIFIER_PROMPT);
        Ok(())
    }

    #[test]
    fn test_text_only_backend_is_rejected() {
        let backend = ScriptedBackend::default().without_vision();
        let result = InferenceClient::new(
            backend,
            PromptRegistry::new(PromptSet::Rapanui),
            ToolRegistry::new(PromptSet::Rapanui),
            CLASSIFIER_PROMPT,
        );

        let err = result.err().unwrap();
        assert!(matches!(err, CorpusError::CapabilityMismatch { .. }));
        assert!(err.is_config());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_inference_retries_then_succeeds() {
        let backend = ScriptedBackend::new([
            Reply::Fail,
            Reply::Fail,
            Reply::text("Candidate", 100, 10),
        ]);
        let mut client = client(backend);

        let answer = client.run_inference(&ScriptedBackend::payload(), &policy(3)).await;

        assert_eq!(answer.as_deref(), Some(CANDIDATE));
        assert_eq!(client.backend().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_inference_exhaustion_returns_none() {
        let backend = ScriptedBackend::new([Reply::Fail, Reply::Fail, Reply::Fail]);
        let mut client = client(backend);

        let answer = client.run_inference(&ScriptedBackend::payload(), &policy(2)).await;

        assert_eq!(answer, None);
        assert_eq!(client.backend().calls(), 3);
        // failed attempts are never charged
        assert_eq!(client.calculate_cost(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_inference_times_out_every_mode() -> Result<(), CorpusError> {
        let backend = ScriptedBackend::new([
            Reply::Hang,
            Reply::text(r#"[{"spanish":"a","rapanui":"b"}]"#, 10, 10),
        ]);
        let mut client = client(backend);
        client.set_tool(EXTRACT_JSON_TOOL)?;
        client.set_prompt(JSON_EXTRACTOR_PROMPT)?;

        let answer = client.run_inference(&ScriptedBackend::payload(), &policy(1)).await;

        assert_eq!(answer.as_deref(), Some(r#"[{"spanish":"a","rapanui":"b"}]"#));
        assert_eq!(client.backend().calls(), 2);
        // the tool travels only with JSON-array prompts
        assert!(client.backend().last_tool_sent());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_inference_stops_at_elapsed_ceiling() {
        let backend = ScriptedBackend::new([Reply::Fail, Reply::Fail, Reply::Fail]);
        let mut client = client(backend);
        let policy = RetryPolicyBuilder::default()
            .max_retries(5)
            .min_delay(Duration::from_secs(1))
            .max_elapsed(Duration::from_millis(1500))
            .build()
            .unwrap();

        // the second sleep would take the backoff total to 3s
        assert_eq!(client.run_inference(&ScriptedBackend::payload(), &policy).await, None);
        assert_eq!(client.backend().calls(), 2);
    }

    #[tokio::test]
    async fn test_calculate_cost_sums_increments() {
        let backend = ScriptedBackend::new([
            Reply::text("Candidate", 1000, 100),
            Reply::text("No Candidate", 2000, 50),
        ]);
        let mut client = client(backend);
        let payload = ScriptedBackend::payload();
        let policy = policy(0);

        assert_eq!(client.calculate_cost(), 0.0);

        client.run_inference(&payload, &policy).await;
        let first = client.calculate_cost();
        // consumed, so a second call adds nothing
        assert_eq!(client.calculate_cost(), 0.0);

        client.run_inference(&payload, &policy).await;
        let second = client.calculate_cost();

        assert!((first - (1000.0 * 0.000003 + 100.0 * 0.000015)).abs() < 1e-12);
        assert!(second > 0.0);
        assert!((client.total_cost() - (first + second)).abs() < 1e-12);

        client.reset_cost();
        assert_eq!(client.total_cost(), 0.0);
    }
}
