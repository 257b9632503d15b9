//! A backend that replays canned replies, for tests.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    path::PathBuf,
};

use bytes::Bytes;

use crate::{
    error::CorpusError,
    llm::{
        client::{Capabilities, Completion, CompletionRequest, VisionBackend},
        cost::{TokenRates, Usage},
    },
    utils::image::ImagePayload,
};

pub enum Reply {
    Text(Completion),
    /// A transient failure, as if the API answered 529.
    Fail,
    /// Never answers.
    Hang,
}

impl Reply {
    pub fn text(text: &str, input_tokens: u64, output_tokens: u64) -> Self {
        Reply::Text(Completion {
            text: text.to_string(),
            usage: Usage {
                input_tokens,
                output_tokens,
            },
        })
    }
}

pub struct ScriptedBackend {
    replies: RefCell<VecDeque<Reply>>,
    prompts: RefCell<Vec<String>>,
    calls: Cell<usize>,
    tool_sent: Cell<bool>,
    vision: bool,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new([])
    }
}

impl ScriptedBackend {
    pub fn new<I: IntoIterator<Item = Reply>>(replies: I) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
            calls: Cell::new(0),
            tool_sent: Cell::new(false),
            vision: true,
        }
    }

    pub fn without_vision(mut self) -> Self {
        self.vision = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Prompt names in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn last_tool_sent(&self) -> bool {
        self.tool_sent.get()
    }

    pub fn payload() -> ImagePayload {
        ImagePayload {
            media_type: "image/png",
            data: Bytes::from_static(b"png"),
            source: PathBuf::from("page.png"),
        }
    }
}

impl VisionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            vision: self.vision,
            tools: true,
        }
    }

    fn rates(&self) -> TokenRates {
        TokenRates::new(0.000003, 0.000015)
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<Completion, CorpusError> {
        self.calls.set(self.calls.get() + 1);
        self.tool_sent.set(request.tool.is_some());
        self.prompts.borrow_mut().push(request.prompt.name.clone());

        let reply = self.replies.borrow_mut().pop_front();
        match reply {
            Some(Reply::Text(completion)) => Ok(completion),
            Some(Reply::Fail) => Err(CorpusError::ApiStatus {
                backend: "scripted".to_string(),
                status: 529,
                body: "overloaded".to_string(),
            }),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(CorpusError::MalformedResponse {
                backend: "scripted".to_string(),
                message: "script exhausted".to_string(),
            }),
        }
    }
}
