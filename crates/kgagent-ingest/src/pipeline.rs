//! Document processing: text → chunks → episodes, entities, relationships.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use kgagent_core::config::IngestConfig;
use kgagent_core::{DocumentId, DocumentStatus, GraphId, NodeId};
use kgagent_graph::{EpisodeInput, GraphClient};
use kgagent_llm::{EntityExtractor, LlmClient, LlmError};

use crate::chunk::split_into_chunks;
use crate::error::{IngestError, Result};
use crate::extract::extract_text;
use crate::persist::{persist_extraction, ExtractionFlags, PersistSummary};
use crate::status::StatusTracker;

/// A document waiting to be processed.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub document_id: DocumentId,
    pub graph_id: GraphId,
    pub file_path: PathBuf,
    /// Original filename, recorded as the episode source.
    pub filename: String,
    pub extract_entities: bool,
    pub extract_relationships: bool,
}

/// What processing a document produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub entities: u64,
    pub relationships: u64,
    pub chunks: usize,
    pub text_length: usize,
}

/// Progress reported after chunk `index` (zero-based) of `total` is done.
pub fn chunk_progress(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.9;
    }
    0.4 + 0.5 * (index + 1) as f64 / total as f64
}

/// Runs documents through extraction, chunking, and graph persistence.
pub struct DocumentPipeline {
    graph: GraphClient,
    llm: LlmClient,
    extractor: EntityExtractor,
    tracker: StatusTracker,
    chunk_size: usize,
    chunk_overlap: usize,
    use_embeddings: bool,
}

impl DocumentPipeline {
    pub fn new(
        graph: GraphClient,
        llm: LlmClient,
        tracker: StatusTracker,
        config: &IngestConfig,
        use_embeddings: bool,
    ) -> Self {
        Self {
            graph,
            extractor: EntityExtractor::new(llm.clone()),
            llm,
            tracker,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            use_embeddings,
        }
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    /// Process a job end to end, recording the outcome in the tracker and
    /// on the document node.
    pub async fn run(&self, job: &IngestJob) -> Result<ProcessingOutcome> {
        let document_id = job.document_id;
        if !self.tracker.start(document_id) {
            return Err(IngestError::Cancelled);
        }
        self.graph
            .set_document_status(&document_id, DocumentStatus::Processing)
            .await?;

        match self.process(job).await {
            Ok(outcome) => {
                self.graph
                    .finish_document(
                        &document_id,
                        DocumentStatus::Completed,
                        outcome.entities,
                        outcome.relationships,
                        None,
                    )
                    .await?;
                self.tracker
                    .complete(document_id, outcome.entities, outcome.relationships);
                info!(
                    document_id = %document_id,
                    graph_id = %job.graph_id,
                    chunks = outcome.chunks,
                    entities = outcome.entities,
                    relationships = outcome.relationships,
                    "Document processed"
                );
                Ok(outcome)
            }
            Err(IngestError::Cancelled) => {
                info!(document_id = %document_id, graph_id = %job.graph_id, "Document deleted during processing; stopped");
                Err(IngestError::Cancelled)
            }
            Err(e) => {
                let message = e.to_string();
                self.tracker.fail(document_id, message.clone());
                if let Err(graph_err) = self
                    .graph
                    .finish_document(&document_id, DocumentStatus::Failed, 0, 0, Some(&message))
                    .await
                {
                    warn!(document_id = %document_id, error = %graph_err, "Failed to record document failure");
                }
                Err(e)
            }
        }
    }

    /// Stop when the document was deleted since processing began.
    fn ensure_active(&self, document_id: &DocumentId) -> Result<()> {
        if self.tracker.contains(document_id) {
            Ok(())
        } else {
            Err(IngestError::Cancelled)
        }
    }

    /// Extract, chunk and persist a document, reporting progress as it goes.
    ///
    /// Returns [`IngestError::Cancelled`] without further writes once the
    /// document or its graph has been deleted.
    pub async fn process(&self, job: &IngestJob) -> Result<ProcessingOutcome> {
        let id = job.document_id;
        self.ensure_active(&id)?;
        self.tracker
            .progress(id, 0.1, "Extracting text from document");

        let path = job.file_path.clone();
        let text = tokio::task::spawn_blocking(move || extract_text(&path))
            .await
            .map_err(|e| IngestError::Extraction(format!("Extraction task failed: {e}")))??;
        self.tracker.progress(id, 0.3, "Text extraction completed");

        let chunks = split_into_chunks(&text, self.chunk_size, self.chunk_overlap);
        self.tracker.progress(
            id,
            0.4,
            format!("Split document into {} chunks", chunks.len()),
        );

        let flags = ExtractionFlags {
            entities: job.extract_entities,
            relationships: job.extract_relationships,
        };
        let mut totals = PersistSummary::default();

        for (i, chunk) in chunks.iter().enumerate() {
            self.ensure_active(&id)?;
            self.tracker.progress(
                id,
                chunk_progress(i, chunks.len()),
                format!("Processing chunk {}/{}", i + 1, chunks.len()),
            );

            let episode_id = NodeId::new();
            let now = Utc::now();
            let episode = EpisodeInput {
                id: episode_id,
                graph_id: job.graph_id,
                document_id: Some(id),
                content: chunk.clone(),
                source: job.filename.clone(),
                chunk_index: i,
                total_chunks: chunks.len(),
                timestamp: now,
                embedding: self.embed_chunk(chunk).await,
            };
            // No row means the document node is gone.
            if !self.graph.add_episode(&episode).await? {
                return Err(IngestError::Cancelled);
            }

            if !flags.any() {
                continue;
            }
            let extraction = match self.extractor.extract(chunk, None).await {
                Ok(extraction) => extraction,
                Err(LlmError::InvalidJson(reply)) => {
                    warn!(document_id = %id, chunk = i, reply = %reply, "Skipping chunk with unparsable extraction");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let summary =
                persist_extraction(&self.graph, &job.graph_id, &episode_id, &extraction, flags, now)
                    .await
                    .map_err(IngestError::into_cancelled_if_graph_gone)?;
            totals.entities += summary.entities;
            totals.relationships += summary.relationships;
        }

        self.ensure_active(&id)?;
        self.tracker.progress(id, 0.9, "Finalizing document in knowledge graph");

        Ok(ProcessingOutcome {
            entities: totals.entities,
            relationships: totals.relationships,
            chunks: chunks.len(),
            text_length: text.chars().count(),
        })
    }

    /// Embedding for a chunk when enabled. Failures are logged and the
    /// episode is stored without one.
    async fn embed_chunk(&self, chunk: &str) -> Option<Vec<f32>> {
        if !self.use_embeddings {
            return None;
        }
        match self.llm.embed_one(chunk).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "Failed to embed chunk; storing without embedding");
                None
            }
        }
    }
}
