//! Knowledge graph CRUD.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use kgagent_core::{GraphId, GraphStats, KnowledgeGraph};
use kgagent_ingest::upload::remove_upload;

use super::{parse_id, require_graph, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateGraphRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphList {
    pub graphs: Vec<KnowledgeGraph>,
    pub total_count: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_graph))
        .route("/list", get(list_graphs))
        .route("/:graph_id", get(get_graph).delete(delete_graph))
        .route("/:graph_id/stats", get(graph_stats))
}

/// POST /api/graphs/create
async fn create_graph(
    State(state): State<AppState>,
    payload: Result<Json<CreateGraphRequest>, JsonRejection>,
) -> ApiResult<Json<KnowledgeGraph>> {
    let Json(req) = payload?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Graph name is required".to_string()));
    }
    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let graph = state.graph.create_graph(name, description).await?;
    Ok(Json(graph))
}

/// GET /api/graphs/list
async fn list_graphs(State(state): State<AppState>) -> ApiResult<Json<GraphList>> {
    let graphs = state.graph.list_graphs().await?;
    Ok(Json(GraphList {
        total_count: graphs.len(),
        graphs,
    }))
}

/// GET /api/graphs/:graph_id
async fn get_graph(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult<Json<KnowledgeGraph>> {
    let graph_id: GraphId = parse_id(&graph_id, "Graph")?;
    Ok(Json(state.graph.get_graph(&graph_id).await?))
}

/// GET /api/graphs/:graph_id/stats
async fn graph_stats(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult<Json<GraphStats>> {
    let graph_id: GraphId = parse_id(&graph_id, "Graph")?;
    require_graph(&state, &graph_id).await?;
    Ok(Json(state.graph.graph_stats(&graph_id).await?))
}

/// DELETE /api/graphs/:graph_id
///
/// Removes the graph's nodes, its uploaded files, chat sessions and
/// processing statuses.
async fn delete_graph(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let graph_id: GraphId = parse_id(&graph_id, "Graph")?;
    require_graph(&state, &graph_id).await?;

    let documents = state.graph.list_documents(&graph_id).await?;
    state
        .tracker
        .remove_many(documents.iter().map(|d| &d.document_id));
    if !state.graph.delete_graph(&graph_id).await? {
        return Err(ApiError::graph_not_found());
    }

    for doc in &documents {
        if let Err(e) = remove_upload(std::path::Path::new(&doc.file_path)).await {
            tracing::warn!(document_id = %doc.document_id, error = %e, "Failed to remove uploaded file");
        }
    }
    let sessions = state.sessions.remove_for_graph(&graph_id);

    tracing::info!(
        graph_id = %graph_id,
        documents = documents.len(),
        sessions,
        "Graph deleted"
    );
    Ok(Json(MessageResponse::new(format!(
        "Graph {graph_id} deleted successfully"
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_description_is_optional() {
        let req: CreateGraphRequest = serde_json::from_str(r#"{"name": "Research"}"#).unwrap();
        assert_eq!(req.name, "Research");
        assert!(req.description.is_none());

        let req: CreateGraphRequest =
            serde_json::from_str(r#"{"name": "R", "description": "notes"}"#).unwrap();
        assert_eq!(req.description.as_deref(), Some("notes"));
    }

    #[test]
    fn test_create_request_requires_name() {
        assert!(serde_json::from_str::<CreateGraphRequest>(r#"{"description": "x"}"#).is_err());
    }
}
