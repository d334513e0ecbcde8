//! Error types for the kgagent-ingest crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Filename is required")]
    MissingFilename,

    #[error("File type .{extension} not allowed. Allowed types: {}", allowed.join(", "))]
    UnsupportedType {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("File too large: {size} bytes. Maximum size: {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Graph error: {0}")]
    Graph(#[from] kgagent_graph::GraphError),

    #[error("LLM error: {0}")]
    Llm(#[from] kgagent_llm::LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document was deleted during processing")]
    Cancelled,
}

impl IngestError {
    /// Whether the error stems from the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::MissingFilename
                | IngestError::UnsupportedType { .. }
                | IngestError::TooLarge { .. }
        )
    }

    /// Graph writes for a deleted graph surface as a missing-graph error;
    /// treat those as cancellation.
    pub fn into_cancelled_if_graph_gone(self) -> Self {
        match self {
            IngestError::Graph(ref e) if e.is_not_found() => IngestError::Cancelled,
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kgagent_graph::GraphError;

    #[test]
    fn test_missing_graph_becomes_cancellation() {
        let gone = IngestError::Graph(GraphError::NotFound {
            kind: "Graph",
            id: "g1".to_string(),
        });
        assert!(matches!(
            gone.into_cancelled_if_graph_gone(),
            IngestError::Cancelled
        ));

        let other = IngestError::Extraction("bad pdf".to_string());
        assert!(matches!(
            other.into_cancelled_if_graph_gone(),
            IngestError::Extraction(_)
        ));
        assert!(!IngestError::Cancelled.is_client_error());
    }
}
