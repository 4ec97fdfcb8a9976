//! Staged workflow execution for ragstream.
//!
//! A request is answered by an ordered [`Pipeline`] of [`Stage`]s. The
//! [`driver`] runs them one after another against a [`RequestState`] and
//! turns their output into a single stream of
//! [`StageEvent`](ragstream_shared::StageEvent)s. [`RagWorkflow`] assembles
//! the retrieval → generation pipeline used by `/invoke`.

pub mod collaborators;
pub mod driver;
pub mod messages;
pub mod pipeline;
pub mod prompt;
pub mod stage;
pub mod state;
pub mod workflow;

pub use collaborators::{Generator, Retriever};
pub use driver::{EventStream, execute};
pub use pipeline::Pipeline;
pub use stage::{ChunkStream, Stage, StageKind, Transition};
pub use state::RequestState;
pub use workflow::{FINALIZE_ANSWER_STAGE, RAG_SEARCH_STAGE, RagWorkflow, WorkflowConfig};
