//! Graph data for the force-layout view, timeline and subgraph exploration.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use kgagent_core::{GraphId, TimeGranularity};
use kgagent_graph::cypher::{normalize_time_bound, Bound};
use kgagent_graph::timeline::DEFAULT_EVENTS_PER_PERIOD;
use kgagent_graph::{
    bucket_timeline, EdgeRecord, NodeRecord, SubgraphResult, TimelineBucket, VisualizationFilter,
};

use super::{parse_id, require_graph};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_NODE_LIMIT: u32 = 1000;

fn default_node_limit() -> u32 {
    100
}

fn default_granularity() -> String {
    "day".to_string()
}

fn default_depth() -> u32 {
    2
}

fn default_subgraph_limit() -> u32 {
    50
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeFilter {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisualizationRequest {
    pub graph_id: GraphId,
    #[serde(default = "default_node_limit")]
    pub node_limit: u32,
    #[serde(default)]
    pub time_filter: Option<TimeFilter>,
    #[serde(default)]
    pub node_types: Option<Vec<String>>,
    #[serde(default)]
    pub relationship_types: Option<Vec<String>>,
}

impl VisualizationRequest {
    /// Translate the request into a graph query filter, normalizing dates
    /// and dropping blank type names.
    pub fn to_filter(&self) -> ApiResult<VisualizationFilter> {
        let time = self.time_filter.clone().unwrap_or_default();
        Ok(VisualizationFilter {
            graph_id: self.graph_id,
            node_limit: self.node_limit.clamp(1, MAX_NODE_LIMIT),
            start_date: normalize_bound(time.start_date.as_deref(), Bound::Start)?,
            end_date: normalize_bound(time.end_date.as_deref(), Bound::End)?,
            node_types: non_blank(self.node_types.as_deref()),
            relationship_types: non_blank(self.relationship_types.as_deref()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TimelineRequest {
    pub graph_id: GraphId,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default = "default_granularity")]
    pub granularity: String,
}

#[derive(Debug, Deserialize)]
pub struct SubgraphQuery {
    pub node_id: String,
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_subgraph_limit")]
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct GraphDataResponse {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub metadata: Value,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub timeline_data: Vec<TimelineBucket>,
    pub metadata: Value,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/graph-data", post(graph_data))
        .route("/timeline", post(timeline))
        .route("/subgraph/:graph_id", get(subgraph))
}

fn normalize_bound(raw: Option<&str>, bound: Bound) -> ApiResult<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => normalize_time_bound(value, bound)
            .map(Some)
            .map_err(ApiError::BadRequest),
        None => Ok(None),
    }
}

fn non_blank(values: Option<&[String]>) -> Vec<String> {
    values
        .unwrap_or_default()
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// POST /api/visualizations/graph-data
async fn graph_data(
    State(state): State<AppState>,
    payload: Result<Json<VisualizationRequest>, JsonRejection>,
) -> ApiResult<Json<GraphDataResponse>> {
    let Json(req) = payload?;
    let filter = req.to_filter()?;
    require_graph(&state, &req.graph_id).await?;

    let SubgraphResult { nodes, edges } = state.graph.visualization_data(&filter).await?;
    let metadata = json!({
        "total_nodes": nodes.len(),
        "total_edges": edges.len(),
        "filters_applied": {
            "time_filter": req.time_filter,
            "node_types": req.node_types,
            "relationship_types": req.relationship_types,
        },
    });
    Ok(Json(GraphDataResponse {
        nodes,
        edges,
        metadata,
    }))
}

/// POST /api/visualizations/timeline
async fn timeline(
    State(state): State<AppState>,
    payload: Result<Json<TimelineRequest>, JsonRejection>,
) -> ApiResult<Json<TimelineResponse>> {
    let Json(req) = payload?;
    let start = normalize_bound(req.start_date.as_deref(), Bound::Start)?;
    let end = normalize_bound(req.end_date.as_deref(), Bound::End)?;
    let granularity = TimeGranularity::parse_lenient(&req.granularity);
    require_graph(&state, &req.graph_id).await?;

    let nodes = state
        .graph
        .timeline_nodes(&req.graph_id, start.as_deref(), end.as_deref())
        .await?;
    let timeline_data = bucket_timeline(nodes, granularity, DEFAULT_EVENTS_PER_PERIOD);

    let metadata = json!({
        "graph_id": req.graph_id,
        "granularity": granularity.as_str(),
        "total_periods": timeline_data.len(),
        "date_range": { "start": req.start_date, "end": req.end_date },
    });
    Ok(Json(TimelineResponse {
        timeline_data,
        metadata,
    }))
}

/// GET /api/visualizations/subgraph/:graph_id?node_id=&depth=&limit=
async fn subgraph(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
    query: Result<Query<SubgraphQuery>, QueryRejection>,
) -> ApiResult<Json<GraphDataResponse>> {
    let graph_id: GraphId = parse_id(&graph_id, "Graph")?;
    let Query(query) = query?;
    require_graph(&state, &graph_id).await?;

    let depth = query.depth.clamp(1, 5);
    let limit = query.limit.clamp(1, MAX_NODE_LIMIT);
    let SubgraphResult { nodes, edges } = state
        .graph
        .subgraph_around(&graph_id, query.node_id.trim(), depth, limit)
        .await?;

    let metadata = json!({
        "center_node_id": query.node_id,
        "depth": depth,
        "total_nodes": nodes.len(),
        "total_edges": edges.len(),
    });
    Ok(Json(GraphDataResponse {
        nodes,
        edges,
        metadata,
    }))
}
