//! Knowledge retrieval for voice turns
//!
//! Knowledge-base ingestion and embedding live outside this system; this
//! crate carries the retrieval interface plus the two pieces the voice
//! session needs around it:
//! - a cheap gating classifier deciding whether a user utterance warrants
//!   a knowledge query at all
//! - context formatting with source tags and a hard character cap

pub mod context;
pub mod gating;
pub mod retriever;

pub use context::format_context;
pub use gating::should_query;
pub use retriever::{QdrantRetriever, RetrievedChunk, Retriever, RetrieverConfig};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<RagError> for outdial_core::Error {
    fn from(err: RagError) -> Self {
        outdial_core::Error::Retrieval(err.to_string())
    }
}
