//! One request/response cycle against the upstream model.
//!
//! The assembler turns a transcript window plus a new prompt into a request,
//! consumes the answer (whole or streamed) and produces the finalized model
//! [`Turn`]. It never touches the transcript itself; see [`crate::Session`].

use crate::citations::CitationSet;
use crate::transcript::{Transcript, Turn};
use config::Settings;
use futures::StreamExt;
use llm::{ChatChunk, ChatMessage, ChatModel, ChatRequest, ChatResponse, GenerationOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Past exchanges sent upstream with each new prompt.
pub const MAX_TURNS: usize = 10;

/// Trailing marker shown while a streamed answer is still arriving.
pub const CURSOR: &str = "▌";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// One call, one complete response.
    Sync,
    #[default]
    Stream,
}

/// Receives the answer as it should currently be displayed.
pub trait RenderSink {
    fn render(&mut self, markdown: &str);
}

impl<F: FnMut(&str)> RenderSink for F {
    fn render(&mut self, markdown: &str) {
        self(markdown)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("{0:#}")]
    Upstream(anyhow::Error),

    #[error("no answer from the model within {0:?}")]
    Timeout(Duration),

    #[error("interaction cancelled")]
    Cancelled,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on a synchronous call.
    pub request: Duration,
    /// Bound on opening and fully consuming a stream.
    pub stream: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            request: Duration::from_secs(60),
            stream: Duration::from_secs(120),
        }
    }
}

/// Folds streamed fragments into the text and sources of one answer.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    citations: CitationSet,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the fragment extended the text.
    pub fn push(&mut self, chunk: ChatChunk) -> bool {
        self.citations.extend(chunk.sources);
        match chunk.text {
            Some(delta) if !delta.is_empty() => {
                self.text.push_str(&delta);
                true
            }
            _ => false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Partial text with the streaming cursor appended.
    pub fn with_cursor(&self) -> String {
        format!("{}{}", self.text, CURSOR)
    }

    pub fn finish(self) -> Turn {
        Turn::model_with_citations(self.text, self.citations.into_citations())
    }
}

impl From<ChatResponse> for Turn {
    fn from(response: ChatResponse) -> Self {
        let mut accumulator = StreamAccumulator::new();
        accumulator.push(ChatChunk {
            text: response.text,
            sources: response.sources,
        });
        accumulator.finish()
    }
}

pub struct ResponseAssembler {
    model: Arc<dyn ChatModel + Send + Sync>,
    options: GenerationOptions,
    max_turns: usize,
    timeouts: Timeouts,
}

impl ResponseAssembler {
    pub fn new(model: Arc<dyn ChatModel + Send + Sync>) -> Self {
        ResponseAssembler {
            model,
            options: GenerationOptions::default(),
            max_turns: MAX_TURNS,
            timeouts: Timeouts::default(),
        }
    }

    pub fn from_settings(model: Arc<dyn ChatModel + Send + Sync>, settings: &Settings) -> Self {
        Self::new(model)
            .with_options(GenerationOptions::with_temperature(settings.temperature))
            .with_max_turns(settings.max_turns)
            .with_timeouts(Timeouts {
                request: settings.request_timeout(),
                stream: settings.stream_timeout(),
            })
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn set_model(&mut self, model: Arc<dyn ChatModel + Send + Sync>) {
        self.model = model;
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Windowed history followed by the new user prompt.
    ///
    /// `history` must not already contain the prompt.
    pub fn build_request(&self, history: &Transcript, prompt: &str) -> ChatRequest {
        let mut messages: Vec<ChatMessage> = history
            .window(self.max_turns)
            .iter()
            .map(ChatMessage::from)
            .collect();
        messages.push(ChatMessage::user(prompt));
        ChatRequest::with_options(messages, self.options.clone())
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(model = self.model.name(), mode = ?mode, messages = request.messages.len())
    )]
    pub async fn run(
        &self,
        request: &ChatRequest,
        mode: Mode,
        sink: &mut impl RenderSink,
        cancel: &CancellationToken,
    ) -> Result<Turn, AssembleError> {
        match mode {
            Mode::Sync => self.run_sync(request, sink, cancel).await,
            Mode::Stream => self.run_stream(request, sink, cancel).await,
        }
    }

    async fn run_sync(
        &self,
        request: &ChatRequest,
        sink: &mut impl RenderSink,
        cancel: &CancellationToken,
    ) -> Result<Turn, AssembleError> {
        let limit = self.timeouts.request;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AssembleError::Cancelled),
            result = tokio::time::timeout(limit, self.model.chat(request)) => {
                result
                    .map_err(|_| AssembleError::Timeout(limit))?
                    .map_err(AssembleError::Upstream)?
            }
        };

        let turn = Turn::from(response);
        sink.render(&turn.content);
        Ok(turn)
    }

    async fn run_stream(
        &self,
        request: &ChatRequest,
        sink: &mut impl RenderSink,
        cancel: &CancellationToken,
    ) -> Result<Turn, AssembleError> {
        let limit = self.timeouts.stream;
        let deadline = Instant::now() + limit;

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AssembleError::Cancelled),
            result = tokio::time::timeout_at(deadline, self.model.stream_chat(request)) => {
                result
                    .map_err(|_| AssembleError::Timeout(limit))?
                    .map_err(AssembleError::Upstream)?
            }
        };

        let mut accumulator = StreamAccumulator::new();
        let mut fragments = 0usize;
        // Returning early drops `stream`, which closes the connection.
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AssembleError::Cancelled),
                next = tokio::time::timeout_at(deadline, stream.next()) => {
                    next.map_err(|_| AssembleError::Timeout(limit))?
                }
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(AssembleError::Upstream)?;
            fragments += 1;

            if accumulator.push(chunk) {
                sink.render(&accumulator.with_cursor());
            }
        }

        debug!(fragments, chars = accumulator.text().len(), "Stream exhausted");
        let turn = accumulator.finish();
        sink.render(&turn.content);
        Ok(turn)
    }
}
