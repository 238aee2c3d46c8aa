//! Display model for the transcript.
//!
//! Building views only reads the transcript, so front ends can redraw as
//! often as they like.

use crate::citations::Citation;
use crate::transcript::{Transcript, Turn};
use llm::Role;

pub const SOURCES_HEADING: &str = "📚 Sources";

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Model => "Gemini",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnView<'a> {
    pub index: usize,
    pub role: Role,
    pub content: &'a str,
    pub citations: &'a [Citation],
}

impl<'a> TurnView<'a> {
    pub fn new(index: usize, turn: &'a Turn) -> Self {
        TurnView {
            index,
            role: turn.role,
            content: &turn.content,
            citations: &turn.citations,
        }
    }

    pub fn label(&self) -> &'static str {
        role_label(self.role)
    }

    /// Whether a sources panel belongs under this turn.
    pub fn has_sources(&self) -> bool {
        self.role == Role::Model && !self.citations.is_empty()
    }
}

pub fn turn_views(transcript: &Transcript) -> Vec<TurnView<'_>> {
    transcript
        .turns()
        .iter()
        .enumerate()
        .map(|(index, turn)| TurnView::new(index, turn))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{Mode, ResponseAssembler};
    use crate::mock::{MockModel, Step};
    use crate::session::Session;
    use llm::WebSource;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn welcome_turn_renders_without_sources() {
        let transcript = Transcript::with_welcome();
        let views = turn_views(&transcript);

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].label(), "Gemini");
        assert!(!views[0].has_sources());
    }

    #[test]
    fn view_exposes_citation_parts() {
        let mut transcript = Transcript::new();
        transcript.append(Turn::model_with_citations(
            "a",
            vec![Citation::new("Coffee [2024]", "https://example.com/a](b)")],
        ));

        let views = turn_views(&transcript);
        assert_eq!(views[0].citations[0].title, "Coffee [2024]");
        assert_eq!(views[0].citations[0].url, "https://example.com/a](b)");
    }

    #[tokio::test]
    async fn rendering_never_calls_upstream() {
        let model = MockModel::new(vec![
            Step::Text("answer"),
            Step::Sources(vec![WebSource::new("https://u1", "t1")]),
        ]);
        let assembler = ResponseAssembler::new(model.clone());
        let mut session = Session::new();
        let cancel = CancellationToken::new();
        session
            .submit(&assembler, "q", Mode::Stream, &mut |_: &str| {}, &cancel)
            .await
            .unwrap();

        let first = turn_views(session.transcript());
        for _ in 0..5 {
            assert_eq!(turn_views(session.transcript()), first);
        }
        assert_eq!(model.calls(), 1);
        assert!(first[2].has_sources());
        assert_eq!(first[1].label(), "You");
    }
}
