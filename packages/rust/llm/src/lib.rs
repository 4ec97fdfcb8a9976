//! Streaming chat-completion client for OpenAI-compatible APIs
//! (OpenRouter, OpenAI, vLLM, Ollama's `/v1`, ...).
//!
//! [`OpenAiCompatGenerator`] implements [`Generator`]: the HTTP request is
//! only sent when the returned stream is first polled, and each content delta
//! becomes one chunk.

pub mod sse;

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{self, Fuse};
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use ragstream_core::{ChunkStream, Generator};
use ragstream_shared::{ChatMessage, LlmConfig, RagstreamError, Result};

use crate::sse::{Decoded, Frame, SseDecoder};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("ragstream/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ---------------------------------------------------------------------------
// OpenAiCompatGenerator
// ---------------------------------------------------------------------------

/// [`Generator`] that streams `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiCompatGenerator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    temperature: Option<f32>,
}

impl OpenAiCompatGenerator {
    /// `api_key` is sent as a bearer token when present.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            RagstreamError::config(format!("invalid llm base_url '{}': {e}", config.base_url))
        })?;
        let mut endpoint = base.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| RagstreamError::config(format!("base URL cannot be a base: {base}")))?
            .pop_if_empty()
            .extend(["chat", "completions"]);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagstreamError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, payload: &[ChatMessage], model: &str) -> RequestBuilder {
        let body = ChatRequest {
            model,
            messages: payload,
            stream: true,
            temperature: self.temperature,
        };
        let request = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

impl Generator for OpenAiCompatGenerator {
    fn generate(&self, payload: Vec<ChatMessage>, model: &str) -> ChunkStream {
        let request = self.request(&payload, model);
        let endpoint = self.endpoint.to_string();
        let model = model.to_string();

        stream::once(async move {
            info!(%model, messages = payload.len(), "requesting completion stream");
            match open(request, &endpoint).await {
                Ok(response) => content_stream(response.bytes_stream().boxed()).boxed(),
                Err(e) => stream::iter([Err::<String, _>(e)]).boxed(),
            }
        })
        .flatten()
        .boxed()
    }
}

/// Send the request and check the status line.
async fn open(request: RequestBuilder, endpoint: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| RagstreamError::Network(format!("{endpoint}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(RagstreamError::Generation(format!(
            "{endpoint}: HTTP {status} {}",
            detail.trim()
        )));
    }
    debug!(%status, "completion stream opened");
    Ok(response)
}

// ---------------------------------------------------------------------------
// Body → chunks
// ---------------------------------------------------------------------------

struct Decoding<S> {
    body: Fuse<S>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    failure: Option<RagstreamError>,
    done: bool,
}

/// Turn a raw SSE byte stream into content chunks.
///
/// Ends after `[DONE]`. A transport error, an error payload, or a body that
/// stops before `[DONE]` yields one final `Err`, after any content decoded
/// ahead of it.
pub fn content_stream<S, B, E>(body: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = Decoding {
        body: body.fuse(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        failure: None,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if let Some(e) = st.failure.take() {
                return Some((Err(e), st));
            }
            if st.done {
                return None;
            }

            let decoded = match st.body.next().await {
                Some(Ok(bytes)) => st.decoder.push(bytes.as_ref()),
                Some(Err(e)) => failed(RagstreamError::Generation(format!(
                    "stream interrupted: {e}"
                ))),
                None => match st.decoder.finish() {
                    Ok(Some(frame)) => Decoded {
                        frames: vec![frame],
                        error: None,
                    },
                    Ok(None) => failed(RagstreamError::Generation(
                        "stream ended before [DONE]".into(),
                    )),
                    Err(e) => failed(e),
                },
            };

            for frame in decoded.frames {
                match frame {
                    Frame::Delta(text) => st.pending.push_back(text),
                    Frame::Done => {
                        st.done = true;
                        break;
                    }
                }
            }

            if let Some(e) = decoded.error {
                if !st.done {
                    warn!(
                        error = %e,
                        pending = st.pending.len(),
                        "completion stream failed"
                    );
                    st.failure = Some(e);
                    st.done = true;
                }
            }
        }
    })
}

fn failed(error: RagstreamError) -> Decoded {
    Decoded {
        frames: Vec::new(),
        error: Some(error),
    }
}
