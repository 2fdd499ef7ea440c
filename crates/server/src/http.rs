//! HTTP endpoints
//!
//! REST API for legal question answering:
//! - `POST /api/chat` one-shot answer with citations
//! - `POST /api/chat/stream` SSE stream (`sources`, `token`, `done`,
//!   `error` events; `sources` always arrives before the first token)
//! - `POST /api/ingest` start a background ingestion run
//! - `GET /api/ingest/status` poll ingestion progress
//! - `GET /health` liveness

use std::convert::Infallible;

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use legal_assistant_core::{ChatMessage, Citation, Error};
use legal_assistant_rag::{AnswerEvent, IngestProgress, RawDocument};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.settings.server.cors_origins);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/ingest", post(ingest))
        .route("/api/ingest/status", get(ingest_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS from configured origins; empty config allows localhost only
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(
            "http://localhost:3000"
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("*")),
        );
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

// --- Request/response types ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Optional sampling temperature override for this request
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<Citation>,
    /// True when reranking fell back to the hybrid order
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub documents: Vec<RawDocument>,
}

#[derive(Debug, Serialize)]
pub struct IngestStarted {
    pub status: &'static str,
    pub documents: usize,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// API error with a status code derived from the error kind
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            Error::StoreUnavailable(_) | Error::ScorerUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::MalformedDocument { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %self.0, status = %status, "request failed");
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// --- Handlers ---

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError(Error::Retrieval("empty question".to_string())));
    }

    let chain = state.chain_for(request.temperature);
    let answer = chain.answer(&request.history, &request.question).await?;
    Ok(Json(ChatResponse {
        answer: answer.text,
        sources: answer.citations,
        degraded: answer.degraded,
    }))
}

async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state
        .chain_for(request.temperature)
        .answer_stream(request.history, request.question)
        .map(|event| Ok(sse_event(event)));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Map a pipeline event to an SSE event
fn sse_event(event: AnswerEvent) -> Event {
    let result = match event {
        AnswerEvent::Sources(citations) => Event::default().event("sources").json_data(citations),
        AnswerEvent::Token(token) => Event::default().event("token").json_data(token),
        AnswerEvent::Done => Ok(Event::default().event("done").data("{}")),
        AnswerEvent::Error(message) => Event::default().event("error").json_data(message),
    };
    result.unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize SSE event");
        Event::default().event("error").data("\"serialization failed\"")
    })
}

async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    // Reserve the run before responding so concurrent POSTs cannot
    // both see 202.
    if !state.ingestor.try_start() {
        return (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: "an ingestion run is already in progress".to_string(),
            }),
        )
            .into_response();
    }

    let count = request.documents.len();
    let ingestor = state.ingestor.clone();
    tokio::spawn(async move {
        match ingestor.ingest_reserved(request.documents).await {
            Ok(report) => info!(
                documents = report.documents,
                skipped = report.documents_skipped,
                children = report.children_indexed,
                "background ingestion finished"
            ),
            Err(e) => error!(error = %e, "background ingestion failed"),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(IngestStarted {
            status: "started",
            documents: count,
        }),
    )
        .into_response()
}

async fn ingest_status(State(state): State<AppState>) -> Json<IngestProgress> {
    Json(state.ingestor.progress())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults_history() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"question": "vượt đèn đỏ phạt bao nhiêu?"}"#).unwrap();
        assert!(request.history.is_empty());
    }

    #[test]
    fn test_chat_request_with_history() {
        let request: ChatRequest = serde_json::from_str(
            r#"{
                "question": "thế còn xe máy?",
                "history": [
                    {"role": "user", "content": "vượt đèn đỏ phạt bao nhiêu?"},
                    {"role": "assistant", "content": "Theo Nghị định 100..."}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(request.history.len(), 2);
    }

    #[test]
    fn test_error_status_mapping() {
        let response =
            ApiError(Error::StoreUnavailable("qdrant down".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = ApiError(Error::Retrieval("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_sse_event_shapes() {
        // Event construction must not panic for any variant.
        sse_event(AnswerEvent::Sources(Vec::new()));
        sse_event(AnswerEvent::Token("xin chào".into()));
        sse_event(AnswerEvent::Done);
        sse_event(AnswerEvent::Error("boom".into()));
    }

    #[test]
    fn test_cors_layer_accepts_configured_origins() {
        build_cors_layer(&["https://example.vn".to_string(), "not a url\n".to_string()]);
        build_cors_layer(&[]);
    }
}
