use thiserror::Error;

use kgagent_core::{GraphId, SessionId};

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Graph error: {0}")]
    Graph(#[from] kgagent_graph::GraphError),

    #[error("LLM error: {0}")]
    Llm(#[from] kgagent_llm::LlmError),

    #[error("Chat session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Chat session {session_id} belongs to graph {expected}, not {requested}")]
    GraphMismatch {
        session_id: SessionId,
        expected: GraphId,
        requested: GraphId,
    },
}

pub type Result<T> = std::result::Result<T, RagError>;
