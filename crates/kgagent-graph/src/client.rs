//! Neo4j connection management and shared graph client.

use kgagent_core::config::Neo4jConfig;
use neo4rs::{query, ConfigBuilder, Graph, Query};

/// Name of the full-text index over episode content and entity names.
pub const TEXT_INDEX: &str = "kg_text";

/// Name of the vector index over episode embeddings.
pub const VECTOR_INDEX: &str = "episode_embedding";

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "kgagent-dev".to_string(),
            database: "neo4j".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

impl From<&Neo4jConfig> for GraphConfig {
    fn from(cfg: &Neo4jConfig) -> Self {
        Self {
            uri: cfg.uri.clone(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            database: cfg.database.clone(),
            max_connections: cfg.max_connections,
            fetch_size: cfg.fetch_size,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// This is the single point of access for all knowledge graph operations.
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, database = %config.database, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<neo4rs::Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }

    /// Round-trip a trivial query to check the database is reachable.
    pub async fn ping(&self) -> Result<(), GraphError> {
        match self.query_one(query("RETURN 1 AS ok")).await? {
            Some(_) => Ok(()),
            None => Err(GraphError::Connection("Empty response to ping".to_string())),
        }
    }

    /// Create the constraints and indexes the service relies on.
    ///
    /// Index creation is idempotent. Constraints and the full-text index are
    /// required. A failure to create the vector index (older Neo4j versions)
    /// is logged and otherwise ignored; vector search then reports errors and
    /// callers fall back to full-text search.
    pub async fn ensure_schema(
        &self,
        embedding_dimensions: usize,
        with_vectors: bool,
    ) -> Result<(), GraphError> {
        let statements = [
            "CREATE CONSTRAINT knowledge_graph_id IF NOT EXISTS
             FOR (g:KnowledgeGraph) REQUIRE g.id IS UNIQUE",
            // Superseded by the entity_graph_key constraint below.
            "DROP INDEX entity_key IF EXISTS",
            // Concurrent pipelines MERGE entities on this pair.
            "CREATE CONSTRAINT entity_graph_key IF NOT EXISTS
             FOR (e:Entity) REQUIRE (e.graph_id, e.key) IS UNIQUE",
            "CREATE INDEX episode_graph IF NOT EXISTS FOR (e:Episode) ON (e.graph_id, e.id)",
            "CREATE INDEX document_graph IF NOT EXISTS FOR (d:Document) ON (d.graph_id, d.id)",
        ];
        for stmt in statements {
            self.run(query(stmt)).await?;
        }

        let text_index = format!(
            "CREATE FULLTEXT INDEX {TEXT_INDEX} IF NOT EXISTS
             FOR (n:Episode|Entity) ON EACH [n.content, n.name, n.description]"
        );
        self.run(query(&text_index)).await?;

        if with_vectors {
            let vector_index = format!(
                "CREATE VECTOR INDEX {VECTOR_INDEX} IF NOT EXISTS
                 FOR (n:Episode) ON (n.embedding)
                 OPTIONS {{indexConfig: {{
                   `vector.dimensions`: {embedding_dimensions},
                   `vector.similarity_function`: 'cosine'
                 }}}}"
            );
            if let Err(e) = self.run(query(&vector_index)).await {
                tracing::warn!(error = %e, "Failed to create vector index; vector search disabled");
            }
        }

        tracing::info!("Graph schema ensured");
        Ok(())
    }
}
