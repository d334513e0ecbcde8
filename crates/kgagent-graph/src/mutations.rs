//! Write operations for the knowledge graph.
//!
//! Graph metadata lives in `:KnowledgeGraph` nodes; every data node carries
//! the owning `graph_id`. Entities are merged on `(graph_id, key)` and
//! entity relationships on `(source, type, target)`, so re-ingesting the
//! same facts updates `last_seen` instead of duplicating them.

use chrono::{DateTime, Utc};
use neo4rs::query;

use kgagent_core::types::Metadata;
use kgagent_core::{Document, DocumentId, DocumentStatus, GraphId, KnowledgeGraph, NodeId};

use crate::client::{GraphClient, GraphError};
use crate::cypher::{entity_key, format_timestamp, sanitize_label, sanitize_rel_type};

/// A text chunk to store as an episode.
#[derive(Debug, Clone)]
pub struct EpisodeInput {
    pub id: NodeId,
    pub graph_id: GraphId,
    pub document_id: Option<DocumentId>,
    pub content: String,
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub timestamp: DateTime<Utc>,
    pub embedding: Option<Vec<f32>>,
}

/// An entity to merge into a graph.
#[derive(Debug, Clone, Default)]
pub struct EntityInput {
    pub name: String,
    pub entity_type: String,
    pub description: String,
    pub attributes: Metadata,
}

/// A relationship between two entities, identified by name.
#[derive(Debug, Clone, Default)]
pub struct RelationInput {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub description: String,
    pub attributes: Metadata,
}

impl GraphClient {
    // ── Graphs ───────────────────────────────────────────────────

    /// Create a new, empty knowledge graph.
    pub async fn create_graph(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<KnowledgeGraph, GraphError> {
        let graph_id = GraphId::new();
        let created_at = Utc::now();

        let q = query(
            "CREATE (g:KnowledgeGraph {
               id: $id, name: $name, description: $description, created_at: $created_at
             })",
        )
        .param("id", graph_id.to_string())
        .param("name", name.to_string())
        .param("description", description.unwrap_or_default().to_string())
        .param("created_at", format_timestamp(created_at));

        self.run(q).await?;
        tracing::info!(graph_id = %graph_id, name, "Created knowledge graph");

        Ok(KnowledgeGraph {
            graph_id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at,
            node_count: 0,
            edge_count: 0,
            metadata: Metadata::new(),
        })
    }

    /// Delete a graph's metadata node and every node belonging to it.
    /// Returns false if the graph did not exist.
    pub async fn delete_graph(&self, graph_id: &GraphId) -> Result<bool, GraphError> {
        if !self.graph_exists(graph_id).await? {
            return Ok(false);
        }

        let mut txn = self.start_txn().await?;
        txn.run(
            query("MATCH (n {graph_id: $graph_id}) DETACH DELETE n")
                .param("graph_id", graph_id.to_string()),
        )
        .await?;
        txn.run(
            query("MATCH (g:KnowledgeGraph {id: $graph_id}) DETACH DELETE g")
                .param("graph_id", graph_id.to_string()),
        )
        .await?;
        txn.commit().await?;

        tracing::info!(graph_id = %graph_id, "Deleted knowledge graph");
        Ok(true)
    }

    // ── Documents ────────────────────────────────────────────────

    /// Record an uploaded document.
    pub async fn record_document(&self, doc: &Document) -> Result<(), GraphError> {
        let q = query(
            "CREATE (d:Document {
               graph_id: $graph_id, id: $id, filename: $filename,
               content_type: $content_type, size: $size, file_path: $file_path,
               content_hash: $content_hash, status: $status,
               uploaded_at: $uploaded_at, processed_at: '', timestamp: $uploaded_at,
               entities_extracted: 0, relationships_extracted: 0, error: ''
             })",
        )
        .param("graph_id", doc.graph_id.to_string())
        .param("id", doc.document_id.to_string())
        .param("filename", doc.filename.clone())
        .param("content_type", doc.content_type.clone())
        .param("size", doc.size as i64)
        .param("file_path", doc.file_path.clone())
        .param("content_hash", doc.content_hash.clone())
        .param("status", doc.status.as_str().to_string())
        .param("uploaded_at", format_timestamp(doc.uploaded_at));

        self.run(q).await
    }

    /// Move a document to a non-terminal status.
    pub async fn set_document_status(
        &self,
        document_id: &DocumentId,
        status: DocumentStatus,
    ) -> Result<(), GraphError> {
        let q = query("MATCH (d:Document {id: $id}) SET d.status = $status")
            .param("id", document_id.to_string())
            .param("status", status.as_str().to_string());
        self.run(q).await
    }

    /// Record the outcome of processing a document.
    pub async fn finish_document(
        &self,
        document_id: &DocumentId,
        status: DocumentStatus,
        entities_extracted: u64,
        relationships_extracted: u64,
        error: Option<&str>,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (d:Document {id: $id})
             SET d.status = $status, d.processed_at = $processed_at,
                 d.entities_extracted = $entities, d.relationships_extracted = $relationships,
                 d.error = $error",
        )
        .param("id", document_id.to_string())
        .param("status", status.as_str().to_string())
        .param("processed_at", format_timestamp(Utc::now()))
        .param("entities", entities_extracted as i64)
        .param("relationships", relationships_extracted as i64)
        .param("error", error.unwrap_or_default().to_string());
        self.run(q).await
    }

    /// Delete a document, its episodes, and entities no longer mentioned by
    /// any remaining episode. Returns false if the document did not exist.
    pub async fn delete_document(&self, document_id: &DocumentId) -> Result<bool, GraphError> {
        let lookup = query(
            "MATCH (d:Document {id: $id})
             OPTIONAL MATCH (d)-[:HAS_EPISODE]->(:Episode)-[:MENTIONS]->(e:Entity)
             RETURN d.graph_id AS graph_id, collect(DISTINCT e.id) AS entity_ids",
        )
        .param("id", document_id.to_string());

        let Some(row) = self.query_one(lookup).await? else {
            return Ok(false);
        };
        let graph_id: String = row.get("graph_id").unwrap_or_default();
        let entity_ids: Vec<String> = row.get("entity_ids").unwrap_or_default();

        let mut txn = self.start_txn().await?;
        txn.run(
            query(
                "MATCH (d:Document {id: $id})
                 OPTIONAL MATCH (d)-[:HAS_EPISODE]->(ep:Episode)
                 DETACH DELETE ep, d",
            )
            .param("id", document_id.to_string()),
        )
        .await?;
        txn.run(
            query(
                "MATCH (e:Entity {graph_id: $graph_id})
                 WHERE e.id IN $ids AND NOT EXISTS { (e)<-[:MENTIONS]-(:Episode) }
                 DETACH DELETE e",
            )
            .param("graph_id", graph_id)
            .param("ids", entity_ids),
        )
        .await?;
        txn.commit().await?;

        tracing::info!(document_id = %document_id, "Deleted document from graph");
        Ok(true)
    }

    // ── Episodes, Entities, Relations ────────────────────────────

    /// Store a text chunk as an episode.
    ///
    /// With a `document_id` the episode is attached to that document;
    /// otherwise it only needs its graph. Returns false, writing nothing,
    /// when the document or graph no longer exists.
    pub async fn add_episode(&self, ep: &EpisodeInput) -> Result<bool, GraphError> {
        let embedding_clause = if ep.embedding.is_some() {
            "SET e.embedding = $embedding"
        } else {
            ""
        };
        let (anchor, link) = if ep.document_id.is_some() {
            (
                "MATCH (d:Document {graph_id: $graph_id, id: $document_id})",
                "MERGE (d)-[:HAS_EPISODE]->(e)",
            )
        } else {
            ("MATCH (:KnowledgeGraph {id: $graph_id})", "")
        };
        let cypher = format!(
            "{anchor}
             CREATE (e:Episode {{
               graph_id: $graph_id, id: $id, document_id: $document_id,
               content: $content, source: $source, chunk_index: $chunk_index,
               total_chunks: $total_chunks, timestamp: $timestamp
             }})
             {embedding_clause}
             {link}
             RETURN e.id AS id"
        );

        let mut q = query(&cypher)
            .param("graph_id", ep.graph_id.to_string())
            .param("id", ep.id.to_string())
            .param(
                "document_id",
                ep.document_id.map(|d| d.to_string()).unwrap_or_default(),
            )
            .param("content", ep.content.clone())
            .param("source", ep.source.clone())
            .param("chunk_index", ep.chunk_index as i64)
            .param("total_chunks", ep.total_chunks as i64)
            .param("timestamp", format_timestamp(ep.timestamp));

        if let Some(embedding) = &ep.embedding {
            let values: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
            q = q.param("embedding", values);
        }

        Ok(self.query_one(q).await?.is_some())
    }

    /// Merge an entity into the graph and return its node id.
    ///
    /// On first sight the entity gets its type label and a `timestamp`; on
    /// later sightings only `last_seen` (and an empty description) change.
    /// Fails with `NotFound` when the graph has been deleted.
    pub async fn upsert_entity(
        &self,
        graph_id: &GraphId,
        entity: &EntityInput,
        seen_at: DateTime<Utc>,
    ) -> Result<String, GraphError> {
        let label = sanitize_label(&entity.entity_type);
        let attributes = serde_json::to_string(&entity.attributes)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        let cypher = format!(
            "MATCH (:KnowledgeGraph {{id: $graph_id}})
             MERGE (e:Entity {{graph_id: $graph_id, key: $key}})
             ON CREATE SET
               e:{label}, e.id = $id, e.name = $name, e.entity_type = $entity_type,
               e.description = $description, e.attributes = $attributes,
               e.timestamp = $now, e.last_seen = $now
             ON MATCH SET
               e.last_seen = $now,
               e.description = CASE WHEN coalesce(e.description, '') = ''
                                    THEN $description ELSE e.description END
             RETURN e.id AS id"
        );

        let q = query(&cypher)
            .param("graph_id", graph_id.to_string())
            .param("key", entity_key(&entity.name))
            .param("id", NodeId::new().to_string())
            .param("name", entity.name.trim().to_string())
            .param("entity_type", label.clone())
            .param("description", entity.description.clone())
            .param("attributes", attributes)
            .param("now", format_timestamp(seen_at));

        match self.query_one(q).await? {
            Some(row) => row
                .get::<String>("id")
                .map_err(|e| GraphError::Serialization(format!("Missing entity id: {e}"))),
            None => Err(GraphError::NotFound {
                kind: "Graph",
                id: graph_id.to_string(),
            }),
        }
    }

    /// Record that an episode mentions an entity.
    pub async fn link_mention(
        &self,
        graph_id: &GraphId,
        episode_id: &NodeId,
        entity_id: &str,
    ) -> Result<(), GraphError> {
        let q = query(
            "MATCH (ep:Episode {graph_id: $graph_id, id: $episode_id})
             MATCH (e:Entity {graph_id: $graph_id, id: $entity_id})
             MERGE (ep)-[:MENTIONS]->(e)",
        )
        .param("graph_id", graph_id.to_string())
        .param("episode_id", episode_id.to_string())
        .param("entity_id", entity_id.to_string());
        self.run(q).await
    }

    /// Merge a relationship between two existing entities.
    ///
    /// `valid_at` is when the fact was observed. Re-observing a relationship
    /// bumps `mentions` and `last_seen`. Returns false when either endpoint
    /// is missing from the graph.
    pub async fn upsert_relation(
        &self,
        graph_id: &GraphId,
        relation: &RelationInput,
        valid_at: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let rel_type = sanitize_rel_type(&relation.relationship);
        let attributes = serde_json::to_string(&relation.attributes)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        let cypher = format!(
            "MATCH (a:Entity {{graph_id: $graph_id, key: $source_key}})
             MATCH (b:Entity {{graph_id: $graph_id, key: $target_key}})
             MERGE (a)-[r:{rel_type}]->(b)
             ON CREATE SET
               r.id = $id, r.graph_id = $graph_id, r.description = $description,
               r.attributes = $attributes, r.valid_at = $valid_at,
               r.created_at = $now, r.last_seen = $now, r.mentions = 1
             ON MATCH SET
               r.last_seen = $now, r.mentions = coalesce(r.mentions, 0) + 1
             RETURN r.id AS id"
        );

        let q = query(&cypher)
            .param("graph_id", graph_id.to_string())
            .param("source_key", entity_key(&relation.source))
            .param("target_key", entity_key(&relation.target))
            .param("id", NodeId::new().to_string())
            .param("description", relation.description.clone())
            .param("attributes", attributes)
            .param("valid_at", format_timestamp(valid_at))
            .param("now", format_timestamp(Utc::now()));

        Ok(self.query_one(q).await?.is_some())
    }
}
