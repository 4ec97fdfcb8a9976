//! HTTP surface: a single `POST /invoke` route streaming NDJSON.

use axum::Router;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::StreamExt;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::warn;

use ragstream_core::RagWorkflow;
use ragstream_shared::{RagstreamError, UserQuery};

/// Content type of the `/invoke` response body.
const NDJSON: &str = "application/x-ndjson";

#[derive(Clone)]
pub(crate) struct AppState {
    workflow: RagWorkflow,
}

/// Build the application router around a ready workflow.
pub(crate) fn router(workflow: RagWorkflow) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .with_state(AppState { workflow })
        .layer(TraceLayer::new_for_http())
}

async fn invoke(
    State(state): State<AppState>,
    payload: Result<Json<UserQuery>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(query) = payload?;
    let events = state.workflow.invoke(query)?;

    // An Err item aborts the chunked body; the client sees a truncated stream.
    let lines = events.map(|event| {
        event?
            .to_ndjson()
            .map_err(|e| RagstreamError::Pipeline(format!("failed to encode event: {e}")))
    });

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

// ---------------------------------------------------------------------------
// Errors raised before the stream starts
// ---------------------------------------------------------------------------

pub(crate) enum ApiError {
    Rejected(JsonRejection),
    Failed(RagstreamError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection)
    }
}

impl From<RagstreamError> for ApiError {
    fn from(err: RagstreamError) -> Self {
        Self::Failed(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Rejected(rejection) => (rejection.status(), rejection.body_text()),
            Self::Failed(err) if err.is_client_error() => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            Self::Failed(err) => {
                warn!(error = %err, "request failed before streaming");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
