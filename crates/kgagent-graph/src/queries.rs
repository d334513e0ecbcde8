//! Read operations for the knowledge graph.

use std::collections::BTreeMap;

use chrono::Utc;
use neo4rs::query;
use serde::{Deserialize, Serialize};

use kgagent_core::types::Metadata;
use kgagent_core::{
    Document, DocumentId, DocumentStatus, GraphId, GraphStats, KnowledgeGraph, TemporalRange,
};

use crate::client::{GraphClient, GraphError, TEXT_INDEX, VECTOR_INDEX};
use crate::cypher::{node_predicate, parse_timestamp};
use crate::timeline::TimelineNode;

/// Upper bound on nodes pulled for a timeline.
const TIMELINE_NODE_CAP: i64 = 10_000;

/// Node properties copied into records when present.
const STRING_PROPS: &[&str] = &[
    "name",
    "entity_type",
    "description",
    "content",
    "source",
    "document_id",
    "filename",
    "content_type",
    "status",
    "timestamp",
    "last_seen",
    "uploaded_at",
    "processed_at",
];
const INT_PROPS: &[&str] = &[
    "chunk_index",
    "total_chunks",
    "size",
    "entities_extracted",
    "relationships_extracted",
];

/// A node as rendered by the visualization endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub node_id: String,
    pub labels: Vec<String>,
    pub properties: Metadata,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl NodeRecord {
    /// The most specific label: the entity type for entities, otherwise the first label.
    pub fn primary_label(&self) -> &str {
        self.labels
            .iter()
            .find(|l| l.as_str() != "Entity")
            .or_else(|| self.labels.first())
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }
}

/// An edge as rendered by the visualization endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeRecord {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub relationship_type: String,
    pub properties: Metadata,
    pub created_at: Option<String>,
}

/// Result of a subgraph query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubgraphResult {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

/// A node matched by search, with its index score.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub node: NodeRecord,
    pub score: f64,
}

/// Filters for the visualization query. Time bounds are already normalized.
#[derive(Debug, Clone)]
pub struct VisualizationFilter {
    pub graph_id: GraphId,
    pub node_limit: u32,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub node_types: Vec<String>,
    pub relationship_types: Vec<String>,
}

impl GraphClient {
    // ── Graphs ───────────────────────────────────────────────────

    /// Whether a graph with this id exists.
    pub async fn graph_exists(&self, graph_id: &GraphId) -> Result<bool, GraphError> {
        let q = query("MATCH (g:KnowledgeGraph {id: $id}) RETURN count(g) AS cnt")
            .param("id", graph_id.to_string());
        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0) > 0),
            None => Ok(false),
        }
    }

    /// Get a graph with its node and edge counts.
    pub async fn get_graph(&self, graph_id: &GraphId) -> Result<KnowledgeGraph, GraphError> {
        let q = query(
            "MATCH (g:KnowledgeGraph {id: $id})
             OPTIONAL MATCH (n {graph_id: $id})
             WITH g, count(n) AS nodes
             OPTIONAL MATCH ({graph_id: $id})-[r]->()
             RETURN g.id AS id, g.name AS name, g.description AS description,
                    g.created_at AS created_at, nodes, count(r) AS edges",
        )
        .param("id", graph_id.to_string());

        match self.query_one(q).await? {
            Some(row) => row_to_graph(&row),
            None => Err(GraphError::NotFound {
                kind: "Graph",
                id: graph_id.to_string(),
            }),
        }
    }

    /// List all graphs, newest first.
    pub async fn list_graphs(&self) -> Result<Vec<KnowledgeGraph>, GraphError> {
        let q = query(
            "MATCH (g:KnowledgeGraph)
             OPTIONAL MATCH (n {graph_id: g.id})
             WITH g, count(n) AS nodes
             OPTIONAL MATCH (a {graph_id: g.id})-[r]->()
             RETURN g.id AS id, g.name AS name, g.description AS description,
                    g.created_at AS created_at, nodes, count(r) AS edges
             ORDER BY created_at DESC",
        );

        let rows = self.query_rows(q).await?;
        rows.iter().map(row_to_graph).collect()
    }

    /// Per-label and per-relationship counts plus the temporal extent of a graph.
    pub async fn graph_stats(&self, graph_id: &GraphId) -> Result<GraphStats, GraphError> {
        if !self.graph_exists(graph_id).await? {
            return Err(GraphError::NotFound {
                kind: "Graph",
                id: graph_id.to_string(),
            });
        }
        let gid = graph_id.to_string();

        let node_rows = self
            .query_rows(
                query("MATCH (n {graph_id: $id}) RETURN labels(n) AS labels, count(n) AS cnt")
                    .param("id", gid.clone()),
            )
            .await?;
        let mut node_types = BTreeMap::new();
        for row in &node_rows {
            let labels: Vec<String> = row.get("labels").unwrap_or_default();
            let count = row.get::<i64>("cnt").unwrap_or(0);
            if labels.is_empty() {
                continue;
            }
            *node_types.entry(label_key(&labels)).or_insert(0) += count;
        }

        let rel_rows = self
            .query_rows(
                query(
                    "MATCH ({graph_id: $id})-[r]->()
                     RETURN type(r) AS rel_type, count(r) AS cnt",
                )
                .param("id", gid.clone()),
            )
            .await?;
        let mut relationship_types = BTreeMap::new();
        for row in &rel_rows {
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            *relationship_types.entry(rel_type).or_insert(0) += row.get::<i64>("cnt").unwrap_or(0);
        }

        let range_row = self
            .query_one(
                query(
                    "MATCH (n {graph_id: $id}) WHERE n.timestamp IS NOT NULL
                     RETURN min(n.timestamp) AS start_date, max(n.timestamp) AS end_date",
                )
                .param("id", gid),
            )
            .await?;
        let temporal_range = range_row.and_then(|row| {
            let start = row.get::<String>("start_date").ok()?;
            let end = row.get::<String>("end_date").ok()?;
            Some(TemporalRange {
                start_date: start,
                end_date: end,
            })
        });

        Ok(GraphStats {
            graph_id: *graph_id,
            node_count: node_types.values().sum(),
            edge_count: relationship_types.values().sum(),
            node_types,
            relationship_types,
            temporal_range,
        })
    }

    // ── Documents ────────────────────────────────────────────────

    /// Get a document record by id.
    pub async fn get_document(&self, document_id: &DocumentId) -> Result<Document, GraphError> {
        let q = query("MATCH (d:Document {id: $id}) RETURN d")
            .param("id", document_id.to_string());
        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("d").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize document: {e}"))
                })?;
                node_to_document(&node)
            }
            None => Err(GraphError::NotFound {
                kind: "Document",
                id: document_id.to_string(),
            }),
        }
    }

    /// List the documents uploaded to a graph, newest first.
    pub async fn list_documents(&self, graph_id: &GraphId) -> Result<Vec<Document>, GraphError> {
        let q = query(
            "MATCH (d:Document {graph_id: $graph_id})
             RETURN d ORDER BY d.uploaded_at DESC",
        )
        .param("graph_id", graph_id.to_string());

        let rows = self.query_rows(q).await?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("d").map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize document: {e}"))
            })?;
            docs.push(node_to_document(&node)?);
        }
        Ok(docs)
    }

    /// Find a document in a graph with identical content.
    pub async fn find_document_by_hash(
        &self,
        graph_id: &GraphId,
        content_hash: &str,
    ) -> Result<Option<Document>, GraphError> {
        let q = query(
            "MATCH (d:Document {graph_id: $graph_id, content_hash: $hash})
             WHERE d.status <> 'failed'
             RETURN d LIMIT 1",
        )
        .param("graph_id", graph_id.to_string())
        .param("hash", content_hash.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("d").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize document: {e}"))
                })?;
                Ok(Some(node_to_document(&node)?))
            }
            None => Ok(None),
        }
    }

    // ── Visualization ────────────────────────────────────────────

    /// Nodes matching the filter, and the edges among them.
    pub async fn visualization_data(
        &self,
        filter: &VisualizationFilter,
    ) -> Result<SubgraphResult, GraphError> {
        let predicate = node_predicate(
            "n",
            filter.start_date.is_some(),
            filter.end_date.is_some(),
            !filter.node_types.is_empty(),
        );
        let cypher = format!(
            "MATCH (n) WHERE {predicate}
             RETURN n, labels(n) AS labels
             ORDER BY n.timestamp DESC
             LIMIT $limit"
        );

        let mut q = query(&cypher)
            .param("graph_id", filter.graph_id.to_string())
            .param("limit", i64::from(filter.node_limit));
        if let Some(start) = &filter.start_date {
            q = q.param("start_date", start.clone());
        }
        if let Some(end) = &filter.end_date {
            q = q.param("end_date", end.clone());
        }
        if !filter.node_types.is_empty() {
            q = q.param("node_types", filter.node_types.clone());
        }

        let nodes = self.collect_nodes(q, "n").await?;
        let ids: Vec<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
        let edges = self
            .edges_among(
                &filter.graph_id,
                &ids,
                &filter.relationship_types,
                i64::from(filter.node_limit) * 5,
            )
            .await?;

        Ok(SubgraphResult { nodes, edges })
    }

    /// Nodes within `depth` hops of a centre node, and the edges among them.
    ///
    /// An unknown centre yields an empty result.
    pub async fn subgraph_around(
        &self,
        graph_id: &GraphId,
        node_id: &str,
        depth: u32,
        limit: u32,
    ) -> Result<SubgraphResult, GraphError> {
        let depth = depth.clamp(1, 5);
        let cypher = format!(
            "MATCH (c {{graph_id: $graph_id, id: $node_id}})
             OPTIONAL MATCH (c)-[*1..{depth}]-(m)
             WHERE m.graph_id = $graph_id
             WITH c, collect(DISTINCT m) AS others
             UNWIND ([c] + others)[0..$limit] AS n
             RETURN n, labels(n) AS labels"
        );
        let q = query(&cypher)
            .param("graph_id", graph_id.to_string())
            .param("node_id", node_id.to_string())
            .param("limit", i64::from(limit.max(1)));

        let nodes = self.collect_nodes(q, "n").await?;
        if nodes.is_empty() {
            return Ok(SubgraphResult::default());
        }
        let ids: Vec<String> = nodes.iter().map(|n| n.node_id.clone()).collect();
        let edges = self
            .edges_among(graph_id, &ids, &[], i64::from(limit.max(1)) * 5)
            .await?;

        Ok(SubgraphResult { nodes, edges })
    }

    /// Timestamped nodes of a graph within an optional range, oldest first.
    pub async fn timeline_nodes(
        &self,
        graph_id: &GraphId,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Vec<TimelineNode>, GraphError> {
        let predicate = node_predicate("n", start_date.is_some(), end_date.is_some(), false);
        let cypher = format!(
            "MATCH (n) WHERE {predicate} AND n.timestamp IS NOT NULL
             RETURN n, labels(n) AS labels
             ORDER BY n.timestamp
             LIMIT $limit"
        );
        let mut q = query(&cypher)
            .param("graph_id", graph_id.to_string())
            .param("limit", TIMELINE_NODE_CAP);
        if let Some(start) = start_date {
            q = q.param("start_date", start.to_string());
        }
        if let Some(end) = end_date {
            q = q.param("end_date", end.to_string());
        }

        let nodes = self.collect_nodes(q, "n").await?;
        Ok(nodes
            .into_iter()
            .filter_map(|record| {
                let timestamp = parse_timestamp(record.prop_str("timestamp")?)?;
                Some(TimelineNode { timestamp, record })
            })
            .collect())
    }

    // ── Search ───────────────────────────────────────────────────

    /// Full-text search over episode content and entity names/descriptions.
    ///
    /// `lucene_query` must already be escaped.
    pub async fn search_text(
        &self,
        graph_id: &GraphId,
        lucene_query: &str,
        limit: u32,
    ) -> Result<Vec<ScoredNode>, GraphError> {
        let q = query(
            "CALL db.index.fulltext.queryNodes($index, $term) YIELD node, score
             WHERE node.graph_id = $graph_id
             RETURN node, labels(node) AS labels, score
             ORDER BY score DESC
             LIMIT $limit",
        )
        .param("index", TEXT_INDEX)
        .param("term", lucene_query.to_string())
        .param("graph_id", graph_id.to_string())
        .param("limit", i64::from(limit));

        self.collect_scored(q).await
    }

    /// Nearest episodes to an embedding via the vector index.
    pub async fn search_vector(
        &self,
        graph_id: &GraphId,
        embedding: &[f32],
        limit: u32,
    ) -> Result<Vec<ScoredNode>, GraphError> {
        let values: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
        let q = query(
            "CALL db.index.vector.queryNodes($index, $k, $embedding) YIELD node, score
             WHERE node.graph_id = $graph_id
             RETURN node, labels(node) AS labels, score
             ORDER BY score DESC
             LIMIT $limit",
        )
        .param("index", VECTOR_INDEX)
        .param("k", i64::from(limit) * 4)
        .param("embedding", values)
        .param("graph_id", graph_id.to_string())
        .param("limit", i64::from(limit));

        self.collect_scored(q).await
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn collect_nodes(
        &self,
        q: neo4rs::Query,
        column: &str,
    ) -> Result<Vec<NodeRecord>, GraphError> {
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get(column).map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize node: {e}"))
            })?;
            let labels: Vec<String> = row.get("labels").unwrap_or_default();
            results.push(neo4j_node_to_record(&node, labels));
        }
        Ok(results)
    }

    async fn collect_scored(&self, q: neo4rs::Query) -> Result<Vec<ScoredNode>, GraphError> {
        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row.get("node").map_err(|e| {
                GraphError::Serialization(format!("Failed to deserialize search result: {e}"))
            })?;
            let labels: Vec<String> = row.get("labels").unwrap_or_default();
            let score = row.get::<f64>("score").unwrap_or(0.0);
            results.push(ScoredNode {
                node: neo4j_node_to_record(&node, labels),
                score,
            });
        }
        Ok(results)
    }

    async fn edges_among(
        &self,
        graph_id: &GraphId,
        node_ids: &[String],
        relationship_types: &[String],
        limit: i64,
    ) -> Result<Vec<EdgeRecord>, GraphError> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let type_clause = if relationship_types.is_empty() {
            ""
        } else {
            "AND type(r) IN $rel_types"
        };
        let cypher = format!(
            "MATCH (a {{graph_id: $graph_id}})-[r]->(b {{graph_id: $graph_id}})
             WHERE a.id IN $ids AND b.id IN $ids {type_clause}
             RETURN coalesce(r.id, elementId(r)) AS edge_id, a.id AS source, b.id AS target,
                    type(r) AS rel_type, r.description AS description,
                    r.valid_at AS valid_at, r.created_at AS created_at,
                    r.last_seen AS last_seen, r.mentions AS mentions,
                    r.attributes AS attributes
             LIMIT $limit"
        );
        let mut q = query(&cypher)
            .param("graph_id", graph_id.to_string())
            .param("ids", node_ids.to_vec())
            .param("limit", limit);
        if !relationship_types.is_empty() {
            q = q.param("rel_types", relationship_types.to_vec());
        }

        let rows = self.query_rows(q).await?;
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let mut props = Metadata::new();
            for key in ["description", "valid_at", "last_seen"] {
                if let Ok(v) = row.get::<String>(key) {
                    props.insert(key.to_string(), serde_json::Value::String(v));
                }
            }
            if let Ok(mentions) = row.get::<i64>("mentions") {
                props.insert("mentions".to_string(), mentions.into());
            }
            if let Some(attrs) = row.get::<String>("attributes").ok().and_then(parse_attributes) {
                props.insert("attributes".to_string(), attrs);
            }
            edges.push(EdgeRecord {
                edge_id: row.get("edge_id").unwrap_or_default(),
                source_node_id: row.get("source").unwrap_or_default(),
                target_node_id: row.get("target").unwrap_or_default(),
                relationship_type: row.get("rel_type").unwrap_or_default(),
                properties: props,
                created_at: row.get::<String>("created_at").ok(),
            });
        }
        Ok(edges)
    }
}

/// Key used for node-type statistics: labels sorted and joined with `:`.
pub fn label_key(labels: &[String]) -> String {
    let mut sorted: Vec<&str> = labels.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(":")
}

fn parse_attributes(raw: String) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(v @ serde_json::Value::Object(_)) if v.as_object().is_some_and(|m| !m.is_empty()) => {
            Some(v)
        }
        _ => None,
    }
}

/// Convert a neo4rs::Node to our lightweight NodeRecord.
fn neo4j_node_to_record(node: &neo4rs::Node, labels: Vec<String>) -> NodeRecord {
    let node_id: String = node.get("id").unwrap_or_default();

    let mut props = Metadata::new();
    for key in STRING_PROPS {
        if let Ok(v) = node.get::<String>(key) {
            if !v.is_empty() {
                props.insert((*key).to_string(), serde_json::Value::String(v));
            }
        }
    }
    for key in INT_PROPS {
        if let Ok(v) = node.get::<i64>(key) {
            props.insert((*key).to_string(), v.into());
        }
    }
    if let Some(attrs) = node.get::<String>("attributes").ok().and_then(parse_attributes) {
        props.insert("attributes".to_string(), attrs);
    }

    let created_at = node.get::<String>("timestamp").ok();
    let updated_at = node.get::<String>("last_seen").ok();

    NodeRecord {
        node_id,
        labels,
        properties: props,
        created_at,
        updated_at,
    }
}

fn row_to_graph(row: &neo4rs::Row) -> Result<KnowledgeGraph, GraphError> {
    let id: String = row
        .get("id")
        .map_err(|e| GraphError::Serialization(format!("Missing graph id: {e}")))?;
    let graph_id = id
        .parse()
        .map_err(|e| GraphError::Serialization(format!("Invalid graph id {id}: {e}")))?;
    let description = row
        .get::<String>("description")
        .ok()
        .filter(|d| !d.is_empty());
    let created_at = row
        .get::<String>("created_at")
        .ok()
        .and_then(|s| parse_timestamp(&s))
        .unwrap_or_else(Utc::now);

    Ok(KnowledgeGraph {
        graph_id,
        name: row
            .get::<String>("name")
            .unwrap_or_else(|_| "Unnamed Graph".to_string()),
        description,
        created_at,
        node_count: row.get::<i64>("nodes").unwrap_or(0),
        edge_count: row.get::<i64>("edges").unwrap_or(0),
        metadata: Metadata::new(),
    })
}

fn node_to_document(node: &neo4rs::Node) -> Result<Document, GraphError> {
    let get = |key: &str| node.get::<String>(key).unwrap_or_default();

    let document_id = get("id")
        .parse()
        .map_err(|e| GraphError::Serialization(format!("Invalid document id: {e}")))?;
    let graph_id = get("graph_id")
        .parse()
        .map_err(|e| GraphError::Serialization(format!("Invalid graph id: {e}")))?;
    let status = get("status").parse().unwrap_or(DocumentStatus::Uploaded);

    let mut metadata = Metadata::new();
    for key in ["entities_extracted", "relationships_extracted"] {
        if let Ok(v) = node.get::<i64>(key) {
            metadata.insert(key.to_string(), v.into());
        }
    }
    let error = get("error");
    if !error.is_empty() {
        metadata.insert("error".to_string(), serde_json::Value::String(error));
    }

    Ok(Document {
        document_id,
        graph_id,
        filename: get("filename"),
        file_path: get("file_path"),
        content_type: get("content_type"),
        size: node.get::<i64>("size").unwrap_or(0).max(0) as u64,
        content_hash: get("content_hash"),
        status,
        uploaded_at: parse_timestamp(&get("uploaded_at")).unwrap_or_else(Utc::now),
        processed_at: parse_timestamp(&get("processed_at")),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(labels: &[&str]) -> NodeRecord {
        NodeRecord {
            node_id: "n1".to_string(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            properties: Metadata::new(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_label_key_is_order_independent() {
        let a = label_key(&["Person".to_string(), "Entity".to_string()]);
        let b = label_key(&["Entity".to_string(), "Person".to_string()]);
        assert_eq!(a, "Entity:Person");
        assert_eq!(a, b);
    }

    #[test]
    fn test_primary_label_prefers_entity_type() {
        assert_eq!(record(&["Entity", "Person"]).primary_label(), "Person");
        assert_eq!(record(&["Episode"]).primary_label(), "Episode");
        assert_eq!(record(&["Entity"]).primary_label(), "Entity");
        assert_eq!(record(&[]).primary_label(), "Unknown");
    }

    #[test]
    fn test_parse_attributes_skips_empty_and_invalid() {
        assert!(parse_attributes("{}".to_string()).is_none());
        assert!(parse_attributes("not json".to_string()).is_none());
        assert!(parse_attributes("[1,2]".to_string()).is_none());
        let v = parse_attributes("{\"role\":\"CEO\"}".to_string()).unwrap();
        assert_eq!(v["role"], "CEO");
    }

    #[test]
    fn test_node_record_serializes_for_ui() {
        let value = serde_json::to_value(record(&["Episode"])).unwrap();
        assert_eq!(value["node_id"], "n1");
        assert!(value["properties"].is_object());
        assert!(value["created_at"].is_null());
    }
}
