pub mod assembler;
pub mod citations;
pub mod engine;
pub mod session;
pub mod transcript;
pub mod view;

#[cfg(test)]
mod mock;

pub use assembler::{
    AssembleError, Mode, RenderSink, ResponseAssembler, StreamAccumulator, Timeouts, CURSOR,
    MAX_TURNS,
};
pub use citations::{truncate_title, Citation, CitationSet, MAX_TITLE_CHARS};
pub use engine::{ChatEngine, EngineCommand, EngineEvent};
pub use session::{Interaction, Session, SubmitError};
pub use transcript::{Transcript, Turn, WELCOME_MESSAGE};
pub use view::{turn_views, TurnView};
