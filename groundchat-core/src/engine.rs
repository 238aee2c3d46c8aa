use crate::assembler::{Mode, ResponseAssembler};
use crate::session::{Interaction, Session};
use config::{ModelProfile, Settings};
use llm::ModelProvider;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub enum EngineCommand {
    Submit {
        prompt: String,
        cancel: CancellationToken,
    },
    SetProfile(ModelProfile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Answer so far, with the streaming cursor while incomplete.
    Partial(String),
    TurnComplete,
    Error(String),
    Cancelled,
    ProfileChanged(ModelProfile),
}

/// Runs interactions off the UI thread.
///
/// The UI sends commands and polls events; the session is locked only while
/// a turn is recorded, never while the answer is being received.
pub struct ChatEngine {
    session: Arc<Mutex<Session>>,
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    active: std::sync::Mutex<CancellationToken>,
    profile: ModelProfile,
    #[allow(dead_code)]
    processor_handle: JoinHandle<()>,
}

impl ChatEngine {
    /// Must be called from within a tokio runtime.
    pub fn new(
        session: Session,
        provider: Arc<dyn ModelProvider + Send + Sync>,
        settings: &Settings,
        mode: Mode,
    ) -> Self {
        let profile = settings.default_profile;
        let session = Arc::new(Mutex::new(session));
        let active = std::sync::Mutex::new(CancellationToken::new());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let model = provider.create_chat_model(profile.model_id());
        let assembler = ResponseAssembler::from_settings(model, settings);

        let processor_handle = tokio::spawn(Self::processor_loop(
            Arc::clone(&session),
            assembler,
            provider,
            mode,
            cmd_rx,
            event_tx,
        ));

        Self {
            session,
            cmd_tx,
            event_rx,
            active,
            profile,
            processor_handle,
        }
    }

    async fn processor_loop(
        session: Arc<Mutex<Session>>,
        mut assembler: ResponseAssembler,
        provider: Arc<dyn ModelProvider + Send + Sync>,
        mode: Mode,
        mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
        event_tx: mpsc::UnboundedSender<EngineEvent>,
    ) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                EngineCommand::Submit { prompt, cancel } => {
                    // 1. Record the user turn and build the request
                    let request = {
                        let mut sess = session.lock().await;
                        match sess.begin(&assembler, &prompt) {
                            Ok(request) => request,
                            Err(e) => {
                                let _ = event_tx.send(EngineEvent::Error(e.to_string()));
                                continue;
                            }
                        }
                    };

                    // 2. Receive the answer WITHOUT holding the session lock
                    let mut forward = |markdown: &str| {
                        let _ = event_tx.send(EngineEvent::Partial(markdown.to_string()));
                    };
                    let outcome = assembler.run(&request, mode, &mut forward, &cancel).await;

                    // 3. Record the outcome
                    let interaction = session.lock().await.finish(outcome);
                    let event = match interaction {
                        Interaction::Completed => EngineEvent::TurnComplete,
                        Interaction::Failed(message) => EngineEvent::Error(message),
                        Interaction::Cancelled => EngineEvent::Cancelled,
                    };
                    let _ = event_tx.send(event);
                }
                EngineCommand::SetProfile(profile) => {
                    debug!(model = profile.model_id(), "Switching model");
                    assembler.set_model(provider.create_chat_model(profile.model_id()));
                    let _ = event_tx.send(EngineEvent::ProfileChanged(profile));
                }
            }
        }
    }

    /// Queue a prompt. Prompts queued since the last [`ChatEngine::cancel`]
    /// share one token, so a cancel reaches them whether or not they started.
    pub fn submit(&self, prompt: impl Into<String>) {
        let cancel = match self.active.lock() {
            Ok(mut slot) => {
                if slot.is_cancelled() {
                    *slot = CancellationToken::new();
                }
                slot.clone()
            }
            Err(_) => CancellationToken::new(),
        };
        let _ = self.cmd_tx.send(EngineCommand::Submit {
            prompt: prompt.into(),
            cancel,
        });
    }

    /// Applies from the next submitted prompt on.
    pub fn set_profile(&mut self, profile: ModelProfile) {
        self.profile = profile;
        let _ = self.cmd_tx.send(EngineCommand::SetProfile(profile));
    }

    pub fn profile(&self) -> ModelProfile {
        self.profile
    }

    /// Abandon the interaction in flight and any still queued.
    pub fn cancel(&self) {
        if let Ok(slot) = self.active.lock() {
            slot.cancel();
        }
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        match self.event_rx.try_recv() {
            Ok(event) => Some(event),
            Err(_) => None,
        }
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }
}

impl Drop for ChatEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockModel, Step};
    use llm::{ChatModel, Role};

    /// Hands out the same scripted model for every profile.
    struct MockProvider {
        model: Arc<MockModel>,
        requested: std::sync::Mutex<Vec<String>>,
    }

    impl ModelProvider for MockProvider {
        fn create_chat_model(&self, model_name: &str) -> Arc<dyn ChatModel + Send + Sync> {
            self.requested.lock().unwrap().push(model_name.to_string());
            self.model.clone()
        }
    }

    fn engine(model: &Arc<MockModel>) -> (ChatEngine, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider {
            model: model.clone(),
            requested: std::sync::Mutex::new(vec![]),
        });
        let settings = Settings::default();
        let engine = ChatEngine::new(Session::new(), provider.clone(), &settings, Mode::Stream);
        (engine, provider)
    }

    #[tokio::test]
    async fn submit_streams_partials_then_completes() {
        let model = MockModel::new(vec![Step::Text("Blue "), Step::Text("Tokai")]);
        let (mut engine, _) = engine(&model);

        engine.submit("best coffee in India");

        assert_eq!(engine.next_event().await, Some(EngineEvent::Partial("Blue ▌".into())));
        assert_eq!(engine.next_event().await, Some(EngineEvent::Partial("Blue Tokai▌".into())));
        assert_eq!(engine.next_event().await, Some(EngineEvent::Partial("Blue Tokai".into())));
        assert_eq!(engine.next_event().await, Some(EngineEvent::TurnComplete));

        let session = engine.session();
        let session = session.lock().await;
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, Role::Model);
        assert_eq!(last.content, "Blue Tokai");
    }

    #[tokio::test]
    async fn empty_prompt_reports_error() {
        let model = MockModel::replying("ok");
        let (mut engine, _) = engine(&model);

        engine.submit("  ");

        match engine.next_event().await {
            Some(EngineEvent::Error(message)) => assert!(message.contains("empty")),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn cancel_stops_a_stalled_stream() {
        let model = MockModel::new(vec![Step::Text("half"), Step::Stall]);
        let (mut engine, _) = engine(&model);

        engine.submit("q");
        assert_eq!(engine.next_event().await, Some(EngineEvent::Partial("half▌".into())));
        engine.cancel();
        assert_eq!(engine.next_event().await, Some(EngineEvent::Cancelled));

        let session = engine.session();
        assert_eq!(session.lock().await.transcript().len(), 2);
        assert_eq!(model.open_streams(), 0);
    }

    #[tokio::test]
    async fn cancel_right_after_submit_is_not_lost() {
        let model = MockModel::new(vec![Step::Text("half"), Step::Stall]);
        let (mut engine, _) = engine(&model);

        engine.submit("q");
        engine.cancel();

        loop {
            match engine.next_event().await {
                Some(EngineEvent::Cancelled) => break,
                Some(EngineEvent::Partial(_)) => continue,
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(model.open_streams(), 0);

        let session = engine.session();
        let last = session.lock().await.transcript().last().cloned().unwrap();
        assert_eq!(last.role, Role::User);
    }

    #[tokio::test]
    async fn submit_after_cancel_runs_normally() {
        let model = MockModel::replying("ok");
        let (mut engine, _) = engine(&model);

        engine.cancel();
        engine.submit("q");

        assert_eq!(engine.next_event().await, Some(EngineEvent::Partial("ok▌".into())));
        assert_eq!(engine.next_event().await, Some(EngineEvent::Partial("ok".into())));
        assert_eq!(engine.next_event().await, Some(EngineEvent::TurnComplete));
    }

    #[tokio::test]
    async fn profile_switch_creates_model_for_next_prompt() {
        let model = MockModel::replying("ok");
        let (mut engine, provider) = engine(&model);

        engine.set_profile(ModelProfile::Accurate);
        assert_eq!(engine.profile(), ModelProfile::Accurate);
        assert_eq!(
            engine.next_event().await,
            Some(EngineEvent::ProfileChanged(ModelProfile::Accurate))
        );
        assert_eq!(
            *provider.requested.lock().unwrap(),
            vec!["gemini-2.5-flash".to_string(), "gemini-2.5-pro".to_string()]
        );
    }
}
