//! Background document processing.
//!
//! Each submitted job runs on its own tokio task. A semaphore bounds how
//! many pipelines run at once; the rest wait in `queued` state.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::IngestError;
use crate::pipeline::{DocumentPipeline, IngestJob};

/// Schedules documents onto the pipeline.
#[derive(Clone)]
pub struct IngestWorker {
    pipeline: Arc<DocumentPipeline>,
    concurrency: Arc<Semaphore>,
}

impl IngestWorker {
    pub fn new(pipeline: DocumentPipeline, max_concurrent_jobs: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            concurrency: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn pipeline(&self) -> &DocumentPipeline {
        &self.pipeline
    }

    /// Queue a job for processing. The outcome lands in the status tracker;
    /// failures are logged, never propagated.
    pub fn submit(&self, job: IngestJob) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let semaphore = self.concurrency.clone();

        tracing::info!(document_id = %job.document_id, graph_id = %job.graph_id, "Document queued for processing");

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!(document_id = %job.document_id, error = %e, "Ingest worker shut down");
                    pipeline
                        .tracker()
                        .fail(job.document_id, "Ingest worker shut down");
                    return;
                }
            };

            match pipeline.run(&job).await {
                Ok(_) | Err(IngestError::Cancelled) => {}
                Err(e) => tracing::error!(
                    document_id = %job.document_id,
                    file = %job.file_path.display(),
                    error = %e,
                    "Document processing failed"
                ),
            }
        })
    }

    /// Jobs currently allowed to start immediately.
    pub fn available_slots(&self) -> usize {
        self.concurrency.available_permits()
    }
}
