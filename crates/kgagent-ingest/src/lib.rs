//! kgagent-ingest: Turns uploaded documents into graph episodes.
//!
//! Uploaded files are validated and stored, their text extracted and split
//! into overlapping chunks, and each chunk is written to the graph as an
//! episode together with the entities and relationships the LLM finds in
//! it. Progress is reported through a shared [`StatusTracker`].

pub mod chunk;
pub mod error;
pub mod extract;
pub mod persist;
pub mod pipeline;
pub mod status;
pub mod upload;
pub mod worker;

pub use chunk::split_into_chunks;
pub use error::{IngestError, Result};
pub use extract::extract_text;
pub use pipeline::{DocumentPipeline, IngestJob, ProcessingOutcome};
pub use status::StatusTracker;
pub use upload::validate_upload;
pub use worker::IngestWorker;
