//! Chat with the knowledge graph: messages, sessions and search.

use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use kgagent_core::types::Metadata;
use kgagent_core::{ChatMessage, ChatSession, GraphId, MessageId, SearchHit, SessionId};
use kgagent_llm::{extract_intent, summarize_conversation, Intent};
use kgagent_rag::{SessionExport, Source};

use super::{parse_id, require_graph, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

fn default_context_limit() -> usize {
    10
}

fn default_chat_search_limit() -> u32 {
    5
}

fn default_search_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub graph_id: GraphId,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Earlier messages of the session passed along as conversation.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default = "default_chat_search_limit")]
    pub search_limit: u32,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: SessionId,
    pub message_id: MessageId,
    pub sources: Vec<Source>,
    pub reasoning: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    #[serde(default)]
    pub graph_id: Option<GraphId>,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<ChatSession>,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub session_id: SessionId,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub graph_id: GraphId,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
    #[serde(default)]
    pub filters: Option<Metadata>,
}

impl SearchRequest {
    /// Node labels requested through `filters.node_types`.
    pub fn node_types(&self) -> Vec<String> {
        self.filters
            .as_ref()
            .and_then(|f| f.get("node_types"))
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub query: String,
    pub total_results: usize,
    pub search_time: f64,
    pub metadata: Value,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/message", post(send_message))
        .route("/sessions", get(list_sessions))
        .route(
            "/sessions/:session_id",
            get(get_session).delete(delete_session),
        )
        .route("/sessions/:session_id/clear", post(clear_session))
        .route("/sessions/:session_id/export", get(export_session))
        .route("/sessions/:session_id/summary", post(summarize_session))
        .route("/intent", post(analyze_intent))
        .route("/search", post(search_graph))
}

/// POST /api/chat/message
async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let started = Instant::now();
    let Json(req) = payload?;
    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }

    require_graph(&state, &req.graph_id).await?;
    let session = state.sessions.get_or_create(req.session_id, req.graph_id)?;
    let session_id = session.session_id;

    state
        .sessions
        .append(&session_id, ChatMessage::user(message))?;
    let history = state.sessions.history(&session_id, req.context_limit)?;

    let answer = state
        .rag
        .generate_response(message, &req.graph_id, &history, req.search_limit)
        .await?;

    let mut metadata = match serde_json::to_value(&answer.metadata) {
        Ok(Value::Object(map)) => map,
        _ => Metadata::new(),
    };
    state.sessions.append(
        &session_id,
        ChatMessage::assistant(answer.response.clone()).with_metadata(metadata.clone()),
    )?;

    metadata.insert(
        "response_time".to_string(),
        json!(started.elapsed().as_secs_f64()),
    );
    tracing::info!(
        session_id = %session_id,
        graph_id = %req.graph_id,
        sources = answer.sources.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Chat message answered"
    );

    Ok(Json(ChatResponse {
        response: answer.response,
        session_id,
        message_id: MessageId::new(),
        sources: answer.sources,
        reasoning: answer.reasoning,
        metadata,
    }))
}

/// GET /api/chat/sessions?graph_id=
async fn list_sessions(
    State(state): State<AppState>,
    query: Result<Query<SessionListQuery>, QueryRejection>,
) -> ApiResult<Json<SessionList>> {
    let Query(query) = query?;
    let sessions = state.sessions.list(query.graph_id);
    Ok(Json(SessionList {
        total_count: sessions.len(),
        sessions,
    }))
}

fn session_id(raw: &str) -> ApiResult<SessionId> {
    parse_id(raw, "Chat session")
}

/// GET /api/chat/sessions/:session_id
async fn get_session(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    Ok(Json(state.sessions.get(&session_id(&raw)?)?))
}

/// DELETE /api/chat/sessions/:session_id
async fn delete_session(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = session_id(&raw)?;
    state.sessions.delete(&id)?;
    Ok(Json(MessageResponse::new(format!(
        "Chat session {id} deleted successfully"
    ))))
}

/// POST /api/chat/sessions/:session_id/clear
async fn clear_session(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let id = session_id(&raw)?;
    state.sessions.clear(&id)?;
    Ok(Json(MessageResponse::new(format!(
        "Chat session {id} cleared successfully"
    ))))
}

/// GET /api/chat/sessions/:session_id/export
async fn export_session(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<SessionExport>> {
    Ok(Json(state.sessions.export(&session_id(&raw)?)?))
}

/// POST /api/chat/sessions/:session_id/summary
async fn summarize_session(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> ApiResult<Json<SummaryResponse>> {
    let session = state.sessions.get(&session_id(&raw)?)?;
    let summary = summarize_conversation(&state.llm, &session.messages).await;
    Ok(Json(SummaryResponse {
        session_id: session.session_id,
        summary,
    }))
}

/// POST /api/chat/intent
async fn analyze_intent(
    State(state): State<AppState>,
    payload: Result<Json<IntentRequest>, JsonRejection>,
) -> ApiResult<Json<Intent>> {
    let Json(req) = payload?;
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query is required".to_string()));
    }
    Ok(Json(extract_intent(&state.llm, &req.query).await))
}

/// POST /api/chat/search
async fn search_graph(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<SearchResponse>> {
    let started = Instant::now();
    let Json(req) = payload?;
    require_graph(&state, &req.graph_id).await?;

    let node_types = req.node_types();
    let results = state
        .rag
        .searcher()
        .search(&req.graph_id, &req.query, req.limit, &node_types)
        .await?;

    Ok(Json(SearchResponse {
        total_results: results.len(),
        results,
        search_time: started.elapsed().as_secs_f64(),
        metadata: json!({
            "graph_id": req.graph_id,
            "filters": req.filters.clone().unwrap_or_default(),
        }),
        query: req.query,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults() {
        let graph_id = GraphId::new();
        let body = json!({ "message": "Who is Ada?", "graph_id": graph_id });
        let req: ChatRequest = serde_json::from_value(body).unwrap();

        assert_eq!(req.graph_id, graph_id);
        assert!(req.session_id.is_none());
        assert_eq!(req.context_limit, 10);
        assert_eq!(req.search_limit, 5);
    }

    #[test]
    fn test_chat_request_rejects_malformed_graph_id() {
        let body = json!({ "message": "hi", "graph_id": "not-a-uuid" });
        assert!(serde_json::from_value::<ChatRequest>(body).is_err());
    }

    #[test]
    fn test_search_request_node_type_filter() {
        let body = json!({
            "query": "Ada",
            "graph_id": GraphId::new(),
            "filters": { "node_types": ["Person", " ", 7, "Episode"] }
        });
        let req: SearchRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.limit, 10);
        assert_eq!(req.node_types(), vec!["Person", "Episode"]);
    }

    #[test]
    fn test_search_request_without_filters() {
        let body = json!({ "query": "Ada", "graph_id": GraphId::new(), "limit": 3 });
        let req: SearchRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.limit, 3);
        assert!(req.node_types().is_empty());
    }
}
