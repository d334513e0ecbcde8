//! API error type and its mapping onto HTTP responses.
//!
//! Every failure leaves the service as `{"detail": "..."}` with a status
//! code the UI can show in its alert banner.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use kgagent_core::KgError;
use kgagent_graph::GraphError;
use kgagent_ingest::IngestError;
use kgagent_llm::LlmError;
use kgagent_rag::RagError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn graph_not_found() -> Self {
        ApiError::NotFound("Graph not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::NotFound { kind, .. } => ApiError::NotFound(format!("{kind} not found")),
            GraphError::Connection(msg) => {
                ApiError::Unavailable(format!("Graph database unavailable: {msg}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            e if e.is_client_error() => ApiError::BadRequest(e.to_string()),
            IngestError::Graph(g) => g.into(),
            IngestError::Llm(l) => l.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        ApiError::Internal(format!("Language model request failed: {e}"))
    }
}

impl From<RagError> for ApiError {
    fn from(e: RagError) -> Self {
        match e {
            RagError::Graph(g) => g.into(),
            RagError::Llm(l) => l.into(),
            RagError::SessionNotFound(_) => ApiError::NotFound("Chat session not found".to_string()),
            mismatch @ RagError::GraphMismatch { .. } => ApiError::BadRequest(mismatch.to_string()),
        }
    }
}

impl From<KgError> for ApiError {
    fn from(e: KgError) -> Self {
        match e {
            KgError::Validation(msg) => ApiError::BadRequest(msg),
            KgError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(format!("IO error: {e}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgagent_core::{GraphId, SessionId};

    #[test]
    fn test_graph_errors_map_to_status() {
        let not_found: ApiError = GraphError::NotFound {
            kind: "Graph",
            id: "x".to_string(),
        }
        .into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "Graph not found");

        let down: ApiError = GraphError::Connection("refused".to_string()).into();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bad: ApiError = GraphError::Serialization("oops".to_string()).into();
        assert_eq!(bad.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_upload_errors_are_client_errors() {
        let err: ApiError = IngestError::UnsupportedType {
            extension: "exe".to_string(),
            allowed: vec!["pdf".to_string(), "txt".to_string()],
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "File type .exe not allowed. Allowed types: pdf, txt");

        let err: ApiError = IngestError::TooLarge { size: 11, max: 10 }.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: ApiError = IngestError::Extraction("bad pdf".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rag_errors_map_to_status() {
        let missing: ApiError = RagError::SessionNotFound(SessionId::new()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "Chat session not found");

        let mismatch: ApiError = RagError::GraphMismatch {
            session_id: SessionId::new(),
            expected: GraphId::new(),
            requested: GraphId::new(),
        }
        .into();
        assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);

        let llm: ApiError = RagError::Llm(LlmError::EmptyResponse).into();
        assert_eq!(llm.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_core_errors_map_to_status() {
        let err: ApiError = KgError::Validation("name is required".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err: ApiError = KgError::Config("missing key".to_string()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_response_body_carries_detail() {
        let response = ApiError::Conflict("Document already uploaded".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "detail": "Document already uploaded" }));
    }
}
