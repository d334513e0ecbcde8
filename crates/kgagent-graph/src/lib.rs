//! kgagent-graph: Neo4j client for the temporal knowledge graph.
//!
//! This crate is the single mutation point for the Neo4j store. All graph
//! reads and writes flow through it so that graph partitioning (`graph_id`),
//! label sanitizing, and timestamp formatting stay consistent.

pub mod client;
pub mod cypher;
pub mod mutations;
pub mod queries;
pub mod timeline;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use mutations::{EntityInput, EpisodeInput, RelationInput};
pub use queries::{EdgeRecord, NodeRecord, ScoredNode, SubgraphResult, VisualizationFilter};
pub use timeline::{bucket_timeline, TimelineBucket, TimelineEvent, TimelineNode};
