//! Graph search combining full-text and vector hits.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use kgagent_core::types::Metadata;
use kgagent_core::{GraphId, SearchHit};
use kgagent_graph::cypher::escape_lucene;
use kgagent_graph::{GraphClient, GraphError, ScoredNode};
use kgagent_llm::LlmClient;

use crate::error::Result;

/// Characters of node content kept in a hit.
const MAX_HIT_CONTENT: usize = 200;

/// Node properties copied into hit metadata.
const HIT_METADATA_KEYS: &[&str] = &[
    "name",
    "entity_type",
    "source",
    "chunk_index",
    "document_id",
    "timestamp",
];

#[derive(Clone)]
pub struct GraphSearcher {
    graph: GraphClient,
    /// Query embedder; `None` disables vector search.
    embedder: Option<LlmClient>,
}

impl GraphSearcher {
    pub fn new(graph: GraphClient, embedder: Option<LlmClient>) -> Self {
        Self { graph, embedder }
    }

    /// Search a graph for `query`, best hits first.
    ///
    /// `node_types`, when non-empty, keeps only nodes carrying one of the
    /// listed labels. A failing full-text or vector query is logged and
    /// contributes no hits.
    pub async fn search(
        &self,
        graph_id: &GraphId,
        query: &str,
        limit: u32,
        node_types: &[String],
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        // Over-fetch when filtering so the filter does not starve the result.
        let fetch = if node_types.is_empty() {
            limit
        } else {
            limit.saturating_mul(4)
        };

        let text_hits = hits_or_empty(
            self.graph
                .search_text(graph_id, &escape_lucene(query.trim()), fetch)
                .await,
            graph_id,
            "Full-text",
        );

        let vector_hits = match &self.embedder {
            Some(llm) => match llm.embed_one(query).await {
                Ok(embedding) => hits_or_empty(
                    self.graph.search_vector(graph_id, &embedding, fetch).await,
                    graph_id,
                    "Vector",
                ),
                Err(e) => {
                    warn!(error = %e, "Failed to embed search query");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Ok(merge_hits(text_hits, vector_hits, limit as usize, node_types))
    }
}

fn hits_or_empty(
    result: std::result::Result<Vec<ScoredNode>, GraphError>,
    graph_id: &GraphId,
    kind: &str,
) -> Vec<ScoredNode> {
    result.unwrap_or_else(|e| {
        warn!(graph_id = %graph_id, error = %e, "{kind} search failed");
        Vec::new()
    })
}

/// Merge two result lists by node id, keeping the higher score, then sort
/// by score descending and truncate.
pub fn merge_hits(
    first: Vec<ScoredNode>,
    second: Vec<ScoredNode>,
    limit: usize,
    node_types: &[String],
) -> Vec<SearchHit> {
    let mut best: HashMap<String, ScoredNode> = HashMap::new();
    for scored in first.into_iter().chain(second) {
        if !node_types.is_empty()
            && !scored.node.labels.iter().any(|l| node_types.contains(l))
        {
            continue;
        }
        match best.get(&scored.node.node_id) {
            Some(existing) if existing.score >= scored.score => {}
            _ => {
                best.insert(scored.node.node_id.clone(), scored);
            }
        }
    }

    let mut hits: Vec<SearchHit> = best.into_values().map(to_hit).collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    hits.truncate(limit);
    hits
}

fn to_hit(scored: ScoredNode) -> SearchHit {
    let node = scored.node;
    let content = ["content", "description", "name"]
        .iter()
        .find_map(|k| node.prop_str(k).filter(|s| !s.is_empty()))
        .unwrap_or_default();

    let mut metadata = Metadata::new();
    for key in HIT_METADATA_KEYS {
        if let Some(v) = node.properties.get(*key) {
            if !matches!(v, Value::Null) {
                metadata.insert((*key).to_string(), v.clone());
            }
        }
    }

    SearchHit {
        content: truncate_content(content),
        node_type: node.primary_label().to_string(),
        node_id: node.node_id,
        score: scored.score,
        metadata,
    }
}

/// Cut content to 200 characters, marking the cut with `...`.
pub fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_HIT_CONTENT {
        content.to_string()
    } else {
        let head: String = content.chars().take(MAX_HIT_CONTENT).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgagent_graph::NodeRecord;

    fn scored(id: &str, labels: &[&str], content: &str, score: f64) -> ScoredNode {
        let mut properties = Metadata::new();
        properties.insert("content".to_string(), Value::String(content.to_string()));
        properties.insert("source".to_string(), Value::String("notes.txt".to_string()));
        ScoredNode {
            node: NodeRecord {
                node_id: id.to_string(),
                labels: labels.iter().map(|s| s.to_string()).collect(),
                properties,
                created_at: None,
                updated_at: None,
            },
            score,
        }
    }

    #[test]
    fn test_merge_keeps_best_score_per_node() {
        let text = vec![
            scored("a", &["Episode"], "alpha", 0.4),
            scored("b", &["Episode"], "beta", 2.0),
        ];
        let vector = vec![
            scored("a", &["Episode"], "alpha", 0.9),
            scored("c", &["Episode"], "gamma", 0.1),
        ];
        let hits = merge_hits(text, vector, 10, &[]);

        let ids: Vec<&str> = hits.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(hits[1].score, 0.9);
        assert_eq!(hits[0].metadata["source"], "notes.txt");
    }

    #[test]
    fn test_merge_truncates_to_limit() {
        let text = (0..5)
            .map(|i| scored(&format!("n{i}"), &["Episode"], "x", i as f64))
            .collect();
        let hits = merge_hits(text, Vec::new(), 2, &[]);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node_id, "n4");
    }

    #[test]
    fn test_merge_filters_node_types() {
        let text = vec![
            scored("e", &["Entity", "Person"], "Ada", 1.0),
            scored("p", &["Episode"], "chunk", 2.0),
        ];
        let hits = merge_hits(text, Vec::new(), 10, &["Person".to_string()]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, "e");
        assert_eq!(hits[0].node_type, "Person");
    }

    #[test]
    fn test_failed_index_query_contributes_no_hits() {
        let graph_id = GraphId::new();
        let failed = Err(GraphError::Connection("ParseException".to_string()));
        assert!(hits_or_empty(failed, &graph_id, "Full-text").is_empty());

        let ok = Ok(vec![scored("a", &["Episode"], "alpha", 1.0)]);
        let hits = merge_hits(
            hits_or_empty(ok, &graph_id, "Vector"),
            Vec::new(),
            5,
            &[],
        );
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_long_content_is_truncated() {
        let long = "x".repeat(250);
        let hits = merge_hits(vec![scored("a", &["Episode"], &long, 1.0)], Vec::new(), 1, &[]);
        assert_eq!(hits[0].content.chars().count(), 203);
        assert!(hits[0].content.ends_with("..."));
        assert_eq!(truncate_content("short"), "short");
    }
}
