//! HTTP client for the document retrieval service.
//!
//! The retrieval service owns indexing and ranking; this crate only sends the
//! latest user question and turns the ranked documents into prompt context.
//!
//! Wire format:
//! - request: `POST {base_url}/retrieve` with `{"query", "mode", "top_k"}`
//! - response: `{"documents": [{"id", "content", "source", "score"}]}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};
use url::Url;

use ragstream_core::{RequestState, Retriever, Transition};
use ragstream_shared::{RagstreamError, Result, RetrievalConfig};

/// User-Agent string for retrieval requests.
const USER_AGENT: &str = concat!("ragstream/", env!("CARGO_PKG_VERSION"));

/// Context text used when the service finds nothing.
const EMPTY_CONTEXT: &str = "No relevant documents were found.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    mode: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    documents: Vec<RetrievedDocument>,
}

/// One ranked document returned by the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Service-side document identifier.
    pub id: String,
    /// Text used as prompt context.
    pub content: String,
    /// Where the document came from (path, URL, title).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Relevance score, higher is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

// ---------------------------------------------------------------------------
// HttpRetriever
// ---------------------------------------------------------------------------

/// [`Retriever`] backed by the retrieval service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: Client,
    endpoint: Url,
    top_k: usize,
}

impl HttpRetriever {
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            RagstreamError::config(format!("invalid retrieval base_url '{}': {e}", config.base_url))
        })?;
        let endpoint = join_path(&base, "retrieve")?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagstreamError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            top_k: config.top_k,
        })
    }

    /// Ask the service for the `top_k` documents matching `query`.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn search(&self, query: &str, mode: &str) -> Result<Vec<RetrievedDocument>> {
        let body = RetrieveRequest {
            query,
            mode,
            top_k: self.top_k,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| RagstreamError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RagstreamError::Retrieval(format!(
                "{}: HTTP {status} {}",
                self.endpoint,
                detail.trim()
            )));
        }

        let parsed: RetrieveResponse = response.json().await.map_err(|e| {
            RagstreamError::Retrieval(format!("{}: invalid response body: {e}", self.endpoint))
        })?;

        debug!(documents = parsed.documents.len(), "retrieval response");
        Ok(parsed.documents)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, state: RequestState) -> Result<Transition> {
        let query = state
            .latest_user_message()
            .ok_or_else(|| RagstreamError::validation("no user message to search with"))?
            .to_string();
        let mode = state.rag_mode().to_string();

        let documents = self.search(&query, &mode).await?;
        info!(
            request_id = %state.request_id,
            mode = %mode,
            documents = documents.len(),
            "retrieved context"
        );

        let summary = summarize(documents.len());
        let extra_info = json!({
            "mode": mode,
            "sources": documents
                .iter()
                .map(|d| json!({"id": d.id, "source": d.source, "score": d.score}))
                .collect::<Vec<_>>(),
        });
        let state = state.with_rag_content(format_context(&documents));

        Ok(Transition::new(state, summary).with_extra_info(extra_info))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Append `segment` to `base`'s path, keeping any path prefix.
fn join_path(base: &Url, segment: &str) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RagstreamError::config(format!("base URL cannot be a base: {base}")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// Render documents as numbered context blocks for the system prompt.
pub fn format_context(documents: &[RetrievedDocument]) -> String {
    if documents.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let source = doc.source.as_deref().unwrap_or(&doc.id);
            format!("[{}] {source}\n{}", i + 1, doc.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn summarize(count: usize) -> String {
    match count {
        0 => "No relevant documents found".to_string(),
        1 => "Found 1 relevant document".to_string(),
        n => format!("Found {n} relevant documents"),
    }
}
