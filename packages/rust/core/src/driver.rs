//! Execution driver: Pipeline + initial State → ordered event stream.
//!
//! The pipeline runs on its own task and hands events to the caller through a
//! bounded channel. A full channel suspends the task, so nothing is produced
//! ahead of delivery beyond the buffer. Dropping the returned stream cancels
//! the run at the next suspension point.

use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, info, info_span, warn};

use ragstream_shared::{RagstreamError, Result, StageEvent};

use crate::pipeline::Pipeline;
use crate::stage::StageKind;
use crate::state::RequestState;

/// Stream of output events. An `Err` item is always the last one.
pub type EventStream = ReceiverStream<Result<StageEvent>>;

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunOutcome {
    /// Every stage finished.
    Completed { events: usize },
    /// A stage failed; its error was the final item.
    Failed { stage: String, events: usize },
    /// The consumer went away.
    Cancelled { stage: String, events: usize },
}

/// Start running `pipeline` against `state`.
///
/// `buffer` bounds how many events may wait for delivery (minimum 1).
/// An empty pipeline is rejected before anything is spawned.
pub fn execute(pipeline: Pipeline, state: RequestState, buffer: usize) -> Result<EventStream> {
    if pipeline.is_empty() {
        return Err(RagstreamError::Pipeline("pipeline has no stages".into()));
    }

    let (tx, rx) = mpsc::channel(buffer.max(1));
    let span = info_span!(
        "pipeline",
        request_id = %state.request_id,
        stages = ?pipeline.stage_names(),
    );

    tokio::spawn(
        async move {
            let start = Instant::now();
            match drive(&pipeline, state, &tx).await {
                RunOutcome::Completed { events } => info!(
                    events,
                    elapsed_ms = start.elapsed().as_millis(),
                    "pipeline complete"
                ),
                RunOutcome::Failed { stage, events } => {
                    warn!(%stage, events, "pipeline failed")
                }
                RunOutcome::Cancelled { stage, events } => {
                    info!(%stage, events, "pipeline cancelled by consumer")
                }
            }
        }
        .instrument(span),
    );

    Ok(ReceiverStream::new(rx))
}

type Sender = mpsc::Sender<Result<StageEvent>>;

/// Walk the stages in order, forwarding events to `tx`.
async fn drive(pipeline: &Pipeline, mut state: RequestState, tx: &Sender) -> RunOutcome {
    let mut events = 0usize;

    for stage in pipeline {
        let name = stage.name();
        let started = Instant::now();
        debug!(stage = name, kind = stage.kind().label(), "stage started");

        match stage.kind() {
            StageKind::Transform(work) => {
                let result = tokio::select! {
                    biased;
                    _ = tx.closed() => return cancelled(name, events),
                    result = work(state) => result,
                };

                match result {
                    Ok(transition) => {
                        state = transition.state;
                        let event =
                            StageEvent::transform(name, transition.content, transition.extra_info);
                        if tx.send(Ok(event)).await.is_err() {
                            return cancelled(name, events);
                        }
                        events += 1;
                    }
                    Err(e) => return failed(tx, name, events, e).await,
                }
            }
            StageKind::StreamProducer(work) => {
                let mut chunks = work(&state);
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = tx.closed() => return cancelled(name, events),
                        next = chunks.next() => next,
                    };

                    match next {
                        Some(Ok(chunk)) => {
                            if tx.send(Ok(StageEvent::chunk(name, chunk))).await.is_err() {
                                return cancelled(name, events);
                            }
                            events += 1;
                        }
                        Some(Err(e)) => return failed(tx, name, events, e).await,
                        None => break,
                    }
                }
            }
        }

        debug!(
            stage = name,
            elapsed_ms = started.elapsed().as_millis(),
            "stage finished"
        );
    }

    RunOutcome::Completed { events }
}

fn cancelled(stage: &str, events: usize) -> RunOutcome {
    RunOutcome::Cancelled {
        stage: stage.to_string(),
        events,
    }
}

async fn failed(tx: &Sender, stage: &str, events: usize, error: RagstreamError) -> RunOutcome {
    warn!(stage, error = %error, "stage failed");
    // Receiver may already be gone; the outcome is a failure either way.
    let _ = tx.send(Err(error)).await;
    RunOutcome::Failed {
        stage: stage.to_string(),
        events,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::stage::{Stage, Transition};
    use ragstream_shared::{Message, QueryOptions, UserQuery};
    use serde_json::json;

    fn state() -> RequestState {
        let query = UserQuery {
            messages: vec![Message {
                kind: "user".into(),
                content: "What is X?".into(),
                id: "1".into(),
            }],
            extra_info: QueryOptions {
                reasoning_model: Some("m1".into()),
                rag_mode: Some("default".into()),
            },
        };
        RequestState::from_query(query, "fallback").unwrap()
    }

    fn chunks(items: &[&str]) -> Stage {
        let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        Stage::stream_producer("gen", move |_| {
            futures::stream::iter(items.clone().into_iter().map(Ok)).boxed()
        })
    }

    async fn collect(stream: EventStream) -> Vec<Result<StageEvent>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn empty_pipeline_is_rejected() {
        let err = execute(Pipeline::new(), state(), 1).unwrap_err();
        assert!(matches!(err, RagstreamError::Pipeline(_)));
    }

    #[tokio::test]
    async fn one_event_per_transform_in_stage_order() {
        let pipeline = Pipeline::new()
            .with_stage(Stage::transform("one", |s| async move {
                Ok(Transition::new(s, "1"))
            }))
            .with_stage(Stage::transform("two", |s| async move {
                Ok(Transition::new(s, "2").with_extra_info(json!({"k": 2})))
            }));

        let events: Vec<_> = collect(execute(pipeline, state(), 1).unwrap())
            .await
            .into_iter()
            .map(|e| e.unwrap())
            .collect();

        assert_eq!(
            events,
            vec![
                StageEvent::transform("one", "1", None),
                StageEvent::transform("two", "2", Some(json!({"k": 2}))),
            ]
        );
    }

    #[tokio::test]
    async fn producer_yields_k_events_in_order() {
        let pipeline = Pipeline::new().with_stage(chunks(&["a", "b", "c", "d"]));
        let events = collect(execute(pipeline, state(), 2).unwrap()).await;

        let texts: Vec<_> = events.into_iter().map(|e| e.unwrap().response).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn state_is_threaded_between_transforms() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_stage = Arc::clone(&seen);

        let pipeline = Pipeline::new()
            .with_stage(Stage::transform("write", |s| async move {
                Ok(Transition::new(s.with_rag_content("ctx"), "wrote"))
            }))
            .with_stage(Stage::transform("read", move |s: RequestState| {
                *seen_in_stage.lock().unwrap() = s.rag_content.clone();
                async move { Ok(Transition::new(s, "read")) }
            }))
            .with_stage(Stage::stream_producer("answer", |s| {
                let ctx = s.rag_content.clone().unwrap_or_default();
                futures::stream::iter([Ok(ctx)]).boxed()
            }));

        let events = collect(execute(pipeline, state(), 1).unwrap()).await;

        assert_eq!(seen.lock().unwrap().as_deref(), Some("ctx"));
        assert_eq!(events.last().unwrap().as_ref().unwrap().response, "ctx");
    }

    #[tokio::test]
    async fn failing_first_transform_emits_nothing() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);

        let pipeline = Pipeline::new()
            .with_stage(Stage::transform("rag_search", |_s| async move {
                Err(RagstreamError::Retrieval("down".into()))
            }))
            .with_stage(Stage::stream_producer("finalize_answer", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                futures::stream::empty().boxed()
            }));

        let events = collect(execute(pipeline, state(), 1).unwrap()).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(RagstreamError::Retrieval(_))));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn producer_failure_keeps_earlier_chunks() {
        let pipeline = Pipeline::new().with_stage(Stage::stream_producer("gen", |_| {
            futures::stream::iter(vec![
                Ok("1".to_string()),
                Ok("2".to_string()),
                Err(RagstreamError::Generation("connection reset".into())),
                Ok("4".to_string()),
                Ok("5".to_string()),
            ])
            .boxed()
        }));

        let events = collect(execute(pipeline, state(), 1).unwrap()).await;

        let ok: Vec<_> = events.iter().filter_map(|e| e.as_ref().ok()).collect();
        assert_eq!(ok.len(), 2);
        assert_eq!(events.len(), 3);
        assert!(events[2].is_err());
    }

    #[tokio::test]
    async fn stages_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));

        let mut pipeline = Pipeline::new();
        for name in ["s1", "s2", "s3"] {
            let running = Arc::clone(&running);
            let overlap = Arc::clone(&overlap);
            pipeline.insert(Stage::transform(name, move |s| {
                let running = Arc::clone(&running);
                let overlap = Arc::clone(&overlap);
                async move {
                    if running.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlap.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(Transition::new(s, ""))
                }
            }));
        }

        let events = collect(execute(pipeline, state(), 8).unwrap()).await;
        assert_eq!(events.len(), 3);
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropping_stream_stops_production() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);

        let pipeline = Pipeline::new().with_stage(Stage::stream_producer("gen", move |_| {
            let counter = Arc::clone(&counter);
            futures::stream::repeat_with(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("tick".to_string())
            })
            .boxed()
        }));

        let mut stream = execute(pipeline, state(), 1).unwrap();
        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        drop(stream);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = produced.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(produced.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn cancellation_during_transform_skips_later_stages() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);

        let pipeline = Pipeline::new()
            .with_stage(Stage::transform("slow", |s| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Transition::new(s, "late"))
            }))
            .with_stage(Stage::stream_producer("gen", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                futures::stream::empty().boxed()
            }));

        let stream = execute(pipeline, state(), 1).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(stream);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }
}
