//! kgagent-core: Shared types, configuration, and error handling for kgagent.
//!
//! This crate provides the foundational types used across all kgagent crates:
//! - Identifiers and records for graphs, documents, and chat sessions
//! - Processing status for background document ingestion
//! - Layered configuration (defaults, `kgagent.toml`, environment)
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::KgError;
pub use types::{
    ChatMessage, ChatRole, ChatSession, Document, DocumentId, DocumentStatus, GraphId, GraphStats,
    KnowledgeGraph, MessageId, NodeId, ProcessingStatus, SearchHit, SessionId, TemporalRange,
    TimeGranularity,
};
