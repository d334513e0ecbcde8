//! kgagent-rag: Answers questions from the knowledge graph.
//!
//! A query is matched against the graph (full-text and, when enabled,
//! vector search), the hits and recent conversation are rendered into a
//! prompt context, and the chat model answers from that context. Chat
//! sessions live in memory in a [`SessionStore`].

pub mod context;
pub mod error;
pub mod search;
pub mod service;
pub mod sessions;

pub use context::{extract_reasoning, format_sources, prepare_context, Source};
pub use error::{RagError, Result};
pub use search::GraphSearcher;
pub use service::{RagMetadata, RagResponse, RagService};
pub use sessions::{SessionExport, SessionStore};
