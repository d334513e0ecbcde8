//! In-memory processing status for uploaded documents.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kgagent_core::{DocumentId, DocumentStatus, ProcessingStatus};

/// Shared map of document processing status. Clone is cheap (inner Arc).
#[derive(Clone, Default)]
pub struct StatusTracker {
    inner: Arc<RwLock<HashMap<DocumentId, ProcessingStatus>>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly uploaded document as queued.
    pub fn queue(&self, document_id: DocumentId) -> ProcessingStatus {
        let status = ProcessingStatus::queued(document_id);
        self.write().insert(document_id, status.clone());
        status
    }

    /// Whether the document is still tracked. Deleting a document removes
    /// its entry, which tells a running pipeline to stop.
    pub fn contains(&self, document_id: &DocumentId) -> bool {
        self.read().contains_key(document_id)
    }

    /// Mark a document as picked up by the pipeline. Returns false when the
    /// document is no longer tracked.
    pub fn start(&self, document_id: DocumentId) -> bool {
        let mut map = self.write();
        let Some(entry) = map.get_mut(&document_id) else {
            return false;
        };
        entry.status = DocumentStatus::Processing;
        entry.progress = 0.0;
        entry.message = Some("Processing started".to_string());
        true
    }

    /// Report progress in `[0, 1]`. Values outside the range are clamped;
    /// updates to unknown or finished documents are ignored.
    pub fn progress(&self, document_id: DocumentId, progress: f64, message: impl Into<String>) {
        let mut map = self.write();
        if let Some(entry) = map.get_mut(&document_id) {
            if entry.status.is_terminal() {
                return;
            }
            entry.status = DocumentStatus::Processing;
            entry.progress = if progress.is_nan() {
                entry.progress
            } else {
                progress.clamp(0.0, 1.0)
            };
            entry.message = Some(message.into());
        }
    }

    /// Record success. Untracked documents are ignored.
    pub fn complete(&self, document_id: DocumentId, entities: u64, relationships: u64) {
        let mut map = self.write();
        let Some(entry) = map.get_mut(&document_id) else {
            return;
        };
        entry.status = DocumentStatus::Completed;
        entry.progress = 1.0;
        entry.message = Some("Document processing completed".to_string());
        entry.entities_extracted = Some(entities);
        entry.relationships_extracted = Some(relationships);
    }

    pub fn fail(&self, document_id: DocumentId, error: impl Into<String>) {
        let error = error.into();
        let mut map = self.write();
        let Some(entry) = map.get_mut(&document_id) else {
            return;
        };
        entry.status = DocumentStatus::Failed;
        entry.message = Some(format!("Processing failed: {error}"));
        entry.errors.get_or_insert_with(Vec::new).push(error);
    }

    pub fn get(&self, document_id: &DocumentId) -> Option<ProcessingStatus> {
        self.read().get(document_id).cloned()
    }

    pub fn remove(&self, document_id: &DocumentId) -> Option<ProcessingStatus> {
        self.write().remove(document_id)
    }

    pub fn remove_many<'a>(&self, document_ids: impl IntoIterator<Item = &'a DocumentId>) {
        let mut map = self.write();
        for id in document_ids {
            map.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DocumentId, ProcessingStatus>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DocumentId, ProcessingStatus>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
