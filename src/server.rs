//! HTTP surface for the UI layer.
//!
//! Stateless: every request carries the conversation it is about.
//!
//! - `POST /api/ai` - `{messages, tags}` → `{response}`
//! - `GET /api/ai?type=analysis&analysisType=..&messages=..` → `{analysis}`
//! - `POST /api/ai/stream` - `{messages, tags}` → SSE `chunk` events, then `done`
//! - `POST /api/analysis` - `{messages}` → full analysis report

use std::collections::HashMap;
use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::ai::CompletionClient;
use crate::analysis::{AnalysisKind, AnalysisReport, run_analysis};
use crate::chunker::{ChannelSink, ChunkEvent, ResponseChunker};
use crate::config::Settings;
use crate::types::Message;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request format")]
    InvalidFormat,

    #[error("Invalid request: messages must be an array")]
    MessagesNotArray,

    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Invalid analysis type")]
    InvalidAnalysisType,

    #[error("Invalid request type")]
    InvalidRequestType,

    #[error("Failed to generate analysis")]
    AnalysisFailed,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::AnalysisFailed => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    client: CompletionClient,
    chunker: ResponseChunker,
}

impl AppState {
    pub fn new(client: CompletionClient, chunker: ResponseChunker) -> Self {
        Self { client, chunker }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            CompletionClient::from_settings(settings),
            ResponseChunker::from_settings(settings),
        )
    }
}

#[derive(Debug)]
struct ConversationRequest {
    messages: Vec<Message>,
    tags: Vec<String>,
}

fn parse_conversation(body: &[u8]) -> Result<ConversationRequest, ApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        warn!("error parsing request: {err}");
        ApiError::InvalidFormat
    })?;

    let messages = match value.get("messages") {
        Some(messages @ Value::Array(_)) => messages.clone(),
        _ => {
            warn!("rejecting request: messages is not an array");
            return Err(ApiError::MessagesNotArray);
        }
    };
    let messages: Vec<Message> = serde_json::from_value(messages).map_err(|err| {
        warn!("error parsing messages: {err}");
        ApiError::InvalidFormat
    })?;

    let tags = match value.get("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(tags) => serde_json::from_value(tags.clone()).map_err(|err| {
            warn!("error parsing tags: {err}");
            ApiError::InvalidFormat
        })?,
    };

    Ok(ConversationRequest { messages, tags })
}

fn non_empty_param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let request = parse_conversation(&body)?;
    info!(messages = request.messages.len(), "chat request");
    let response = state.client.reply(&request.messages, &request.tags).await;
    Ok(Json(json!({ "response": response })))
}

async fn analysis_query(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    if params.get("type").map(String::as_str) != Some("analysis") {
        return Err(ApiError::InvalidRequestType);
    }

    let (Some(kind), Some(messages)) = (
        non_empty_param(&params, "analysisType"),
        non_empty_param(&params, "messages"),
    ) else {
        return Err(ApiError::MissingParameters);
    };
    let kind: AnalysisKind = kind.parse().map_err(|_| ApiError::InvalidAnalysisType)?;
    let messages: Vec<Message> = serde_json::from_str(messages).map_err(|err| {
        error!("error in analysis route: {err}");
        ApiError::AnalysisFailed
    })?;

    let analysis = state.client.analyze(&messages, kind).await;
    Ok(Json(json!({ "analysis": analysis })))
}

async fn chat_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let request = parse_conversation(&body)?;
    info!(messages = request.messages.len(), "streaming chat request");

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut sink = ChannelSink::new(tx, cancel.clone());
    tokio::spawn(async move {
        let reply = state.client.reply(&request.messages, &request.tags).await;
        state.chunker.deliver(&reply, &cancel, &mut sink).await;
    });

    let events = UnboundedReceiverStream::new(rx).map(|event| {
        Ok(match event {
            ChunkEvent::Chunk(text) => Event::default().event("chunk").data(text),
            ChunkEvent::Done(text) => Event::default().event("done").data(text),
        })
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn full_analysis(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnalysisReport>, ApiError> {
    let request = parse_conversation(&body)?;
    Ok(Json(run_analysis(&state.client, &request.messages).await))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/ai", post(chat).get(analysis_query))
        .route("/api/ai/stream", post(chat_stream))
        .route("/api/analysis", post(full_analysis))
        .with_state(state)
}

pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let addr = settings.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, model = %settings.model, "FLOAT API listening");
    axum::serve(listener, router(AppState::from_settings(settings))).await?;
    Ok(())
}
