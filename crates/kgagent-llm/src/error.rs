use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM returned no content")]
    EmptyResponse,

    #[error("LLM returned invalid JSON: {0}")]
    InvalidJson(String),

    #[error("LLM client configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
