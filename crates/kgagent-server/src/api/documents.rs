//! Document upload, processing status and entity extraction.

use std::path::Path as FsPath;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kgagent_core::types::Metadata;
use kgagent_core::{Document, DocumentId, DocumentStatus, GraphId, ProcessingStatus};
use kgagent_ingest::upload::{content_hash, content_type_for, remove_upload, save_upload};
use kgagent_ingest::{validate_upload, IngestJob};
use kgagent_llm::ExtractionResult;

use super::{parse_id, require_graph, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtractEntitiesRequest {
    pub text: String,
    #[serde(default)]
    pub entity_types: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct DocumentList {
    pub documents: Vec<Document>,
    pub total_count: usize,
}

/// Fields of the multipart upload form.
#[derive(Debug, Default)]
struct UploadForm {
    filename: Option<String>,
    bytes: Option<Vec<u8>>,
    graph_id: Option<String>,
    extract_entities: bool,
    extract_relationships: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_document))
        .route("/status/:document_id", get(processing_status))
        .route("/extract-entities", post(extract_entities))
        .route("/list/:graph_id", get(list_documents))
        .route("/:document_id", delete(delete_document))
}

/// Interpret an HTML form checkbox/boolean value. Unrecognized values keep
/// the default.
pub fn parse_form_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

async fn read_upload_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm {
        extract_entities: true,
        extract_relationships: true,
        ..UploadForm::default()
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.filename = field.file_name().map(str::to_string);
                form.bytes = Some(field.bytes().await?.to_vec());
            }
            "graph_id" => form.graph_id = Some(field.text().await?),
            "extract_entities" => {
                form.extract_entities = parse_form_bool(&field.text().await?, true);
            }
            "extract_relationships" => {
                form.extract_relationships = parse_form_bool(&field.text().await?, true);
            }
            other => tracing::debug!(field = other, "Ignoring unknown upload field"),
        }
    }
    Ok(form)
}

/// POST /api/documents/upload
async fn upload_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<Document>> {
    let form = read_upload_form(multipart).await?;
    let bytes = form
        .bytes
        .ok_or_else(|| ApiError::BadRequest("A file is required".to_string()))?;
    let filename = form.filename.unwrap_or_default();
    let raw_graph_id = form
        .graph_id
        .ok_or_else(|| ApiError::BadRequest("graph_id is required".to_string()))?;

    let extension = validate_upload(&filename, bytes.len() as u64, &state.config.upload)?;
    let graph_id: GraphId = parse_id(&raw_graph_id, "Graph")?;
    require_graph(&state, &graph_id).await?;

    let hash = content_hash(&bytes);
    if let Some(existing) = state.graph.find_document_by_hash(&graph_id, &hash).await? {
        return Err(ApiError::Conflict(format!(
            "Document with identical content already uploaded as {} ({})",
            existing.filename, existing.document_id
        )));
    }

    let document_id = DocumentId::new();
    let path = save_upload(
        FsPath::new(&state.config.upload.dir),
        &document_id,
        &filename,
        &bytes,
    )
    .await?;

    let mut metadata = Metadata::new();
    metadata.insert("extract_entities".to_string(), Value::Bool(form.extract_entities));
    metadata.insert(
        "extract_relationships".to_string(),
        Value::Bool(form.extract_relationships),
    );

    let document = Document {
        document_id,
        graph_id,
        filename: filename.clone(),
        file_path: path.to_string_lossy().into_owned(),
        content_type: content_type_for(&extension).to_string(),
        size: bytes.len() as u64,
        content_hash: hash,
        status: DocumentStatus::Queued,
        uploaded_at: Utc::now(),
        processed_at: None,
        metadata,
    };

    if let Err(e) = state.graph.record_document(&document).await {
        discard_file(&path).await;
        return Err(e.into());
    }

    state.tracker.queue(document_id);
    state.worker.submit(IngestJob {
        document_id,
        graph_id,
        file_path: path,
        filename,
        extract_entities: form.extract_entities,
        extract_relationships: form.extract_relationships,
    });

    tracing::info!(
        document_id = %document_id,
        graph_id = %graph_id,
        filename = %document.filename,
        size = document.size,
        "Document uploaded"
    );
    Ok(Json(document))
}

async fn discard_file(path: &FsPath) {
    if let Err(e) = remove_upload(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove uploaded file");
    }
}

/// GET /api/documents/status/:document_id
async fn processing_status(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> ApiResult<Json<ProcessingStatus>> {
    let document_id: DocumentId = parse_id(&document_id, "Document")?;
    state
        .tracker
        .get(&document_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))
}

/// POST /api/documents/extract-entities
async fn extract_entities(
    State(state): State<AppState>,
    payload: Result<Json<ExtractEntitiesRequest>, JsonRejection>,
) -> ApiResult<Json<ExtractionResult>> {
    let Json(req) = payload?;
    if req.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text is required".to_string()));
    }
    let result = state
        .extractor
        .extract(&req.text, req.entity_types.as_deref())
        .await?;
    Ok(Json(result))
}

/// GET /api/documents/list/:graph_id
async fn list_documents(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
) -> ApiResult<Json<DocumentList>> {
    let graph_id: GraphId = parse_id(&graph_id, "Graph")?;
    require_graph(&state, &graph_id).await?;
    let documents = state.graph.list_documents(&graph_id).await?;
    Ok(Json(DocumentList {
        total_count: documents.len(),
        documents,
    }))
}

/// DELETE /api/documents/:document_id
async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let document_id: DocumentId = parse_id(&document_id, "Document")?;
    let document = state.graph.get_document(&document_id).await?;

    // Dropping the status first stops an in-flight pipeline before its next write.
    state.tracker.remove(&document_id);
    remove_upload(FsPath::new(&document.file_path)).await?;
    state.graph.delete_document(&document_id).await?;

    tracing::info!(document_id = %document_id, graph_id = %document.graph_id, "Document deleted");
    Ok(Json(MessageResponse::new(format!(
        "Document {document_id} deleted successfully"
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_bool() {
        assert!(parse_form_bool("true", false));
        assert!(parse_form_bool(" On ", false));
        assert!(!parse_form_bool("false", true));
        assert!(!parse_form_bool("0", true));
        assert!(parse_form_bool("maybe", true));
        assert!(!parse_form_bool("", false));
    }

    #[test]
    fn test_extract_request_entity_types_optional() {
        let req: ExtractEntitiesRequest =
            serde_json::from_str(r#"{"text": "Ada met Charles."}"#).unwrap();
        assert!(req.entity_types.is_none());

        let req: ExtractEntitiesRequest =
            serde_json::from_str(r#"{"text": "x", "entity_types": ["Person"]}"#).unwrap();
        assert_eq!(req.entity_types.unwrap(), vec!["Person"]);
    }
}
