//! HTTP handlers, one module per resource.

pub mod chat;
pub mod documents;
pub mod graphs;
pub mod health;
pub mod visualizations;

use std::str::FromStr;

use serde::Serialize;

use kgagent_core::GraphId;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// `{"message": ...}` acknowledgement for deletions and similar actions.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Parse an identifier from a path segment. A malformed id cannot name an
/// existing resource, so it is reported as not found.
pub fn parse_id<T: FromStr>(raw: &str, kind: &str) -> ApiResult<T> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("{kind} not found")))
}

/// Fail with 404 unless the graph exists.
pub async fn require_graph(state: &AppState, graph_id: &GraphId) -> ApiResult<()> {
    if state.graph.graph_exists(graph_id).await? {
        Ok(())
    } else {
        Err(ApiError::graph_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use kgagent_core::DocumentId;

    #[test]
    fn test_parse_id() {
        let id = GraphId::new();
        let parsed: GraphId = parse_id(&id.to_string(), "Graph").unwrap();
        assert_eq!(parsed, id);

        let err = parse_id::<DocumentId>("not-a-uuid", "Document").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Document not found");
    }
}
