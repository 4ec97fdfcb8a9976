//! Pipeline stages: a name plus one of two calling conventions.

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use ragstream_shared::Result;

use crate::state::RequestState;

/// Lazy, finite, single-pass sequence of text chunks.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Boxed work of a transform stage.
pub type TransformFn = Box<dyn Fn(RequestState) -> BoxFuture<'static, Result<Transition>> + Send + Sync>;

/// Boxed work of a stream-producer stage.
pub type ProducerFn = Box<dyn Fn(&RequestState) -> ChunkStream + Send + Sync>;

/// What a transform stage hands back to the driver.
#[derive(Debug, Clone)]
pub struct Transition {
    /// State the next stage will see.
    pub state: RequestState,
    /// Human-readable payload for the output event.
    pub content: String,
    /// Optional structured data surfaced to the caller.
    pub extra_info: Option<serde_json::Value>,
}

impl Transition {
    pub fn new(state: RequestState, content: impl Into<String>) -> Self {
        Self {
            state,
            content: content.into(),
            extra_info: None,
        }
    }

    pub fn with_extra_info(mut self, extra_info: serde_json::Value) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

/// Calling convention of a stage.
pub enum StageKind {
    /// Takes the state by value and resolves to exactly one [`Transition`].
    Transform(TransformFn),
    /// Reads the state and yields any number of chunks; never updates it.
    StreamProducer(ProducerFn),
}

impl StageKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transform(_) => "transform",
            Self::StreamProducer(_) => "stream-producer",
        }
    }
}

/// One named unit of work. Immutable once built.
pub struct Stage {
    name: String,
    kind: StageKind,
}

impl Stage {
    /// Build a transform stage from an async function of the state.
    pub fn transform<F, Fut>(name: impl Into<String>, work: F) -> Self
    where
        F: Fn(RequestState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Transition>> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind: StageKind::Transform(Box::new(move |state| work(state).boxed())),
        }
    }

    /// Build a stream-producer stage from a function returning a chunk stream.
    pub fn stream_producer<F>(name: impl Into<String>, work: F) -> Self
    where
        F: Fn(&RequestState) -> ChunkStream + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: StageKind::StreamProducer(Box::new(work)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .finish_non_exhaustive()
    }
}
