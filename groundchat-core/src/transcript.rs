//! In-memory conversation history
//!
//! The transcript only grows. Bounding what is sent upstream is done with
//! [`Transcript::window`], which borrows a suffix instead of removing turns.

use crate::citations::Citation;
use llm::{ChatMessage, Role};

pub const WELCOME_MESSAGE: &str = "💡 Type your question and press **Enter** to search the web.";

/// One message in the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Source links; only model turns carry them.
    pub citations: Vec<Citation>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            content: content.into(),
            citations: vec![],
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self::model_with_citations(content, vec![])
    }

    pub fn model_with_citations(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Turn {
            role: Role::Model,
            content: content.into(),
            citations,
        }
    }

    /// Citations as `[title](url)` markdown links.
    pub fn formatted_citations(&self) -> Vec<String> {
        self.citations.iter().map(Citation::to_string).collect()
    }
}

impl From<&Turn> for ChatMessage {
    // Citations stay local.
    fn from(turn: &Turn) -> Self {
        ChatMessage {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Transcript seeded with the synthetic welcome turn shown at session start.
    pub fn with_welcome() -> Self {
        Self {
            turns: vec![Turn::model(WELCOME_MESSAGE)],
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `2 * max_turns` turns (about `max_turns` exchanges), in order.
    ///
    /// Returns the whole transcript when it is shorter than the window.
    pub fn window(&self, max_turns: usize) -> &[Turn] {
        let size = max_turns.saturating_mul(2);
        let start = self.turns.len().saturating_sub(size);
        &self.turns[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(count: usize) -> Transcript {
        let mut transcript = Transcript::new();
        for i in 0..count {
            if i % 2 == 0 {
                transcript.append(Turn::user(format!("q{}", i)));
            } else {
                transcript.append(Turn::model(format!("a{}", i)));
            }
        }
        transcript
    }

    #[test]
    fn window_returns_last_two_times_max_turns_in_order() {
        let transcript = numbered(25);
        let window = transcript.window(10);

        assert_eq!(window.len(), 20);
        assert_eq!(window.first().unwrap().content, "a5");
        assert_eq!(window.last().unwrap().content, "q24");
        assert_eq!(window, &transcript.turns()[5..]);
    }

    #[test]
    fn window_larger_than_transcript_returns_everything() {
        for len in [0, 1, 7, 20] {
            let transcript = numbered(len);
            for size in [10, 50] {
                let window = transcript.window(size);
                assert_eq!(window.len(), len.min(2 * size));
                assert_eq!(window, transcript.turns());
            }
        }
    }

    #[test]
    fn window_does_not_mutate() {
        let transcript = numbered(30);
        let before = transcript.turns().to_vec();
        let _ = transcript.window(3);
        let _ = transcript.window(0);
        assert_eq!(transcript.turns(), before.as_slice());
        assert!(transcript.window(0).is_empty());
    }

    #[test]
    fn welcome_transcript_starts_with_model_turn() {
        let transcript = Transcript::with_welcome();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.turns()[0].role, Role::Model);
        assert!(transcript.turns()[0].citations.is_empty());
    }

    #[test]
    fn citations_are_not_sent_upstream() {
        let turn = Turn::model_with_citations("answer", vec![Citation::new("a", "https://a")]);
        assert_eq!(ChatMessage::from(&turn), ChatMessage::model("answer"));
    }
}
