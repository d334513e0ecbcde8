//! kgagent-llm: OpenAI-compatible chat completions and embeddings.
//!
//! Everything the service asks of a language model goes through
//! [`LlmClient`]: entity and relationship extraction during ingestion,
//! answer generation for chat, conversation summaries and intent analysis.

pub mod client;
pub mod error;
pub mod extraction;
pub mod intent;

pub use client::{ChatOptions, LlmClient, LlmMessage};
pub use error::{LlmError, Result};
pub use extraction::{
    EntityExtractor, ExtractedEntity, ExtractedRelationship, ExtractionMetadata, ExtractionResult,
    DEFAULT_ENTITY_TYPES,
};
pub use intent::{extract_intent, summarize_conversation, Intent};
