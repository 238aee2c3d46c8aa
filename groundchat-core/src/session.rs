//! The conversation as the user sees it.

use crate::assembler::{AssembleError, Mode, RenderSink, ResponseAssembler};
use crate::transcript::{Transcript, Turn};
use llm::ChatRequest;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Nothing to send: the message is empty")]
    EmptyPrompt,
}

/// How one submitted prompt ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    /// The model turn was appended.
    Completed,
    /// Upstream failed; the message is for inline display.
    Failed(String),
    Cancelled,
}

/// Owns the transcript for the lifetime of the session.
///
/// Rendering the transcript never calls upstream; only [`Session::submit`]
/// (or [`Session::begin`]) does, once per accepted prompt.
#[derive(Debug)]
pub struct Session {
    transcript: Transcript,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Fresh session showing the welcome turn.
    pub fn new() -> Self {
        Self::from_transcript(Transcript::with_welcome())
    }

    pub fn from_transcript(transcript: Transcript) -> Self {
        Session { transcript }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Accept a prompt: build its request from the history so far, then record
    /// the user turn.
    pub fn begin(
        &mut self,
        assembler: &ResponseAssembler,
        prompt: &str,
    ) -> Result<ChatRequest, SubmitError> {
        if prompt.trim().is_empty() {
            return Err(SubmitError::EmptyPrompt);
        }
        let request = assembler.build_request(&self.transcript, prompt);
        self.transcript.append(Turn::user(prompt));
        Ok(request)
    }

    /// Record the result of the interaction started by [`Session::begin`].
    ///
    /// Only a successful answer adds a turn; the user turn stays either way.
    pub fn finish(&mut self, outcome: Result<Turn, AssembleError>) -> Interaction {
        match outcome {
            Ok(turn) => {
                info!(
                    chars = turn.content.len(),
                    citations = turn.citations.len(),
                    "Model turn appended"
                );
                self.transcript.append(turn);
                Interaction::Completed
            }
            Err(AssembleError::Cancelled) => {
                info!("Interaction cancelled");
                Interaction::Cancelled
            }
            Err(e) => {
                warn!(error = %e, "Interaction failed");
                Interaction::Failed(e.to_string())
            }
        }
    }

    /// Run one full interaction for `prompt`.
    pub async fn submit(
        &mut self,
        assembler: &ResponseAssembler,
        prompt: &str,
        mode: Mode,
        sink: &mut impl RenderSink,
        cancel: &CancellationToken,
    ) -> Result<Interaction, SubmitError> {
        let request = self.begin(assembler, prompt)?;
        let outcome = assembler.run(&request, mode, sink, cancel).await;
        Ok(self.finish(outcome))
    }
}
