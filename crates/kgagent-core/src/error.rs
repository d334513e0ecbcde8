use thiserror::Error;

/// Top-level error type for kgagent.
#[derive(Error, Debug)]
pub enum KgError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for KgError {
    fn from(e: config::ConfigError) -> Self {
        KgError::Config(e.to_string())
    }
}
