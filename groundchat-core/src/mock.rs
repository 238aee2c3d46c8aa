//! Scripted chat model for tests.

use async_trait::async_trait;
use futures::stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use llm::{ChatChunk, ChatModel, ChatRequest, ChatResponse, ChatStream, WebSource};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

#[derive(Clone, Debug)]
pub(crate) enum Step {
    Text(&'static str),
    Sources(Vec<WebSource>),
    /// Error item in the stream.
    Fail(&'static str),
    /// Stream never yields again.
    Stall,
}

pub(crate) struct MockModel {
    steps: Vec<Step>,
    /// Request-level failure for both `chat` and `stream_chat`.
    refuse: Option<&'static str>,
    calls: AtomicUsize,
    open: Arc<AtomicUsize>,
    pending_chats: Arc<AtomicUsize>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockModel {
    pub(crate) fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self::scripted(steps, None))
    }

    fn scripted(steps: Vec<Step>, refuse: Option<&'static str>) -> Self {
        MockModel {
            steps,
            refuse,
            calls: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            pending_chats: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(vec![]),
        }
    }

    pub(crate) fn replying(text: &'static str) -> Arc<Self> {
        Self::new(vec![Step::Text(text)])
    }

    pub(crate) fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self::scripted(vec![], Some(message)))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// `chat` calls that have started but neither returned nor been dropped.
    pub(crate) fn pending_chats(&self) -> usize {
        self.pending_chats.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &ChatRequest) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match self.refuse {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }
}

/// Holds one slot of a counter until dropped.
struct Live(Arc<AtomicUsize>);

impl Live {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Live(counter.clone())
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Keeps count of streams that have not been dropped yet.
struct Tracked<S> {
    inner: S,
    _live: Live,
}

impl<S: Stream + Unpin> Stream for Tracked<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        self.record(request)?;
        let _live = Live::enter(&self.pending_chats);
        let mut response = ChatResponse::default();
        for step in &self.steps {
            match step {
                Step::Text(text) => response.text.get_or_insert_with(String::new).push_str(text),
                Step::Sources(sources) => response.sources.extend(sources.iter().cloned()),
                Step::Fail(message) => anyhow::bail!(*message),
                Step::Stall => futures::future::pending::<()>().await,
            }
        }
        Ok(response)
    }

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        self.record(request)?;
        let mut items = vec![];
        let mut stalls = false;
        for step in &self.steps {
            match step {
                Step::Text(text) => items.push(Ok(ChatChunk::text(*text))),
                Step::Sources(sources) => items.push(Ok(ChatChunk::sources(sources.clone()))),
                Step::Fail(message) => items.push(Err(anyhow::anyhow!(*message))),
                Step::Stall => {
                    stalls = true;
                    break;
                }
            }
        }

        let tail: BoxStream<'static, anyhow::Result<ChatChunk>> = if stalls {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };
        Ok(Box::pin(Tracked {
            inner: stream::iter(items).chain(tail),
            _live: Live::enter(&self.open),
        }))
    }
}
