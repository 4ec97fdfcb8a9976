//! The `/invoke` workflow: retrieve context, then stream an answer.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{info, instrument};

use ragstream_shared::{AppConfig, RagstreamError, Result, UserQuery};

use crate::collaborators::{Generator, Retriever};
use crate::driver::{self, EventStream};
use crate::pipeline::Pipeline;
use crate::prompt;
use crate::stage::Stage;
use crate::state::RequestState;

/// Output tag of the retrieval stage.
pub const RAG_SEARCH_STAGE: &str = "rag_search";

/// Output tag of the answer stage.
pub const FINALIZE_ANSWER_STAGE: &str = "finalize_answer";

/// Runtime settings for [`RagWorkflow`], merged from config + CLI flags.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Model used when the query does not name one.
    pub default_model: String,
    /// System prompt template containing `{rag_content}`.
    pub system_template: String,
    /// Events buffered between the pipeline task and the consumer.
    pub event_buffer: usize,
}

impl From<&AppConfig> for WorkflowConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_model: config.llm.default_model.clone(),
            system_template: config.prompt.system_template.clone(),
            event_buffer: config.server.event_buffer,
        }
    }
}

/// Holds the shared collaborators and builds a fresh pipeline per request.
#[derive(Clone)]
pub struct RagWorkflow {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    config: Arc<WorkflowConfig>,
}

impl RagWorkflow {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Validate `query` and start the pipeline.
    ///
    /// Validation errors are returned before any stage runs.
    #[instrument(skip_all, fields(messages = query.messages.len()))]
    pub fn invoke(&self, query: UserQuery) -> Result<EventStream> {
        let state = RequestState::from_query(query, &self.config.default_model)?;
        let pipeline = self.build_pipeline();

        info!(
            request_id = %state.request_id,
            model = %state.model,
            rag_mode = state.rag_mode(),
            "invoking workflow"
        );

        driver::execute(pipeline, state, self.config.event_buffer)
    }

    /// `[rag_search (transform), finalize_answer (stream-producer)]`.
    pub fn build_pipeline(&self) -> Pipeline {
        let retriever = Arc::clone(&self.retriever);
        let generator = Arc::clone(&self.generator);
        let config = Arc::clone(&self.config);

        let mut pipeline = Pipeline::new();
        pipeline.insert(Stage::transform(RAG_SEARCH_STAGE, move |state| {
            let retriever = Arc::clone(&retriever);
            async move { retriever.retrieve(state).await }
        }));
        pipeline.insert(Stage::stream_producer(
            FINALIZE_ANSWER_STAGE,
            move |state: &RequestState| {
                let Some(rag_content) = state.rag_content.as_deref() else {
                    return futures::stream::once(async {
                        Err(RagstreamError::Generation(
                            "no retrieved context in request state".into(),
                        ))
                    })
                    .boxed();
                };
                let payload = prompt::generation_payload(
                    &config.system_template,
                    rag_content,
                    &state.messages,
                );
                generator.generate(payload, &state.model)
            },
        ));
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::stage::{ChunkStream, StageKind, Transition};
    use ragstream_shared::{ChatMessage, Message, QueryOptions, StageEvent};

    struct FixedRetriever {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, state: RequestState) -> Result<Transition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RagstreamError::Retrieval("index offline".into()));
            }
            Ok(Transition::new(state.with_rag_content("X is a thing."), "found doc")
                .with_extra_info(json!({"source": "doc1"})))
        }
    }

    struct ScriptedGenerator {
        chunks: Vec<&'static str>,
        seen: Mutex<Option<(Vec<ChatMessage>, String)>>,
    }

    impl Generator for ScriptedGenerator {
        fn generate(&self, payload: Vec<ChatMessage>, model: &str) -> ChunkStream {
            *self.seen.lock().unwrap() = Some((payload, model.to_string()));
            let chunks: Vec<_> = self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            futures::stream::iter(chunks).boxed()
        }
    }

    fn workflow(fail: bool) -> (RagWorkflow, Arc<FixedRetriever>, Arc<ScriptedGenerator>) {
        let retriever = Arc::new(FixedRetriever {
            calls: AtomicUsize::new(0),
            fail,
        });
        let generator = Arc::new(ScriptedGenerator {
            chunks: vec!["X is ", "a thing."],
            seen: Mutex::new(None),
        });
        let config = WorkflowConfig {
            default_model: "fallback".into(),
            system_template: "Use this:\n{rag_content}".into(),
            event_buffer: 1,
        };
        let wf = RagWorkflow::new(retriever.clone(), generator.clone(), config);
        (wf, retriever, generator)
    }

    fn query(messages: Vec<Message>) -> UserQuery {
        UserQuery {
            messages,
            extra_info: QueryOptions {
                reasoning_model: Some("m1".into()),
                rag_mode: Some("default".into()),
            },
        }
    }

    fn user(content: &str) -> Message {
        Message {
            kind: "user".into(),
            content: content.into(),
            id: "1".into(),
        }
    }

    #[test]
    fn pipeline_shape() {
        let (wf, _, _) = workflow(false);
        assert_eq!(
            wf.build_pipeline().stage_names(),
            vec![RAG_SEARCH_STAGE, FINALIZE_ANSWER_STAGE]
        );
    }

    #[tokio::test]
    async fn end_to_end_records() {
        let (wf, _, generator) = workflow(false);
        let stream = wf.invoke(query(vec![user("What is X?")])).unwrap();
        let events: Vec<StageEvent> = stream.map(|e| e.unwrap()).collect().await;

        assert_eq!(
            events,
            vec![
                StageEvent::transform("rag_search", "found doc", Some(json!({"source": "doc1"}))),
                StageEvent::chunk("finalize_answer", "X is "),
                StageEvent::chunk("finalize_answer", "a thing."),
            ]
        );
        assert_eq!(
            events[0].to_ndjson().unwrap(),
            "{\"stage\":\"rag_search\",\"response\":\"found doc\",\"extra_info\":{\"source\":\"doc1\"}}\n"
        );

        let (payload, model) = generator.seen.lock().unwrap().clone().unwrap();
        assert_eq!(model, "m1");
        assert_eq!(payload[0], ChatMessage::system("Use this:\nX is a thing."));
        assert_eq!(payload[1], ChatMessage::user("What is X?"));
    }

    #[tokio::test]
    async fn invalid_query_runs_no_stage() {
        let (wf, retriever, generator) = workflow(false);
        let err = wf.invoke(query(vec![])).unwrap_err();

        assert!(err.is_client_error());
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
        assert!(generator.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn retrieval_failure_truncates_stream() {
        let (wf, _, generator) = workflow(true);
        let events: Vec<_> = wf
            .invoke(query(vec![user("What is X?")]))
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(RagstreamError::Retrieval(_))));
        assert!(generator.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn answer_stage_requires_retrieved_context() {
        let (wf, _, generator) = workflow(false);
        let pipeline = wf.build_pipeline();
        let state = RequestState::from_query(query(vec![user("What is X?")]), "m").unwrap();

        let answer = pipeline.iter().last().unwrap();
        let StageKind::StreamProducer(work) = answer.kind() else {
            panic!("answer stage must be a stream producer");
        };
        let items: Vec<_> = work(&state).collect().await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(RagstreamError::Generation(_))));
        assert!(generator.seen.lock().unwrap().is_none());
    }
}
