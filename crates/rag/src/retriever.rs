//! Retriever trait and Qdrant-backed implementation

use async_trait::async_trait;
use qdrant_client::qdrant::{value::Kind, SearchPointsBuilder};
use qdrant_client::Qdrant;

use crate::RagError;

/// One retrieved knowledge chunk
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: Option<String>,
    pub score: f32,
}

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Chunks returned per query
    pub top_k: usize,
    /// Chunks below this score are dropped
    pub min_score: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6334".to_string(),
            collection: "knowledge".to_string(),
            top_k: 3,
            min_score: 0.7,
        }
    }
}

/// Knowledge retrieval interface
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Top chunks for a query embedding
    async fn retrieve(&self, embedding: Vec<f32>) -> Result<Vec<RetrievedChunk>, RagError>;

    /// Embed a query string. Embedding generation is an external service;
    /// implementations call out to it.
    async fn embed(&self, query: &str) -> Result<Vec<f32>, RagError>;
}

/// Qdrant-backed retriever
pub struct QdrantRetriever {
    client: Qdrant,
    config: RetrieverConfig,
    embedder: Box<dyn Embedder>,
}

/// External embedding service hook
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
}

impl QdrantRetriever {
    pub fn new(config: RetrieverConfig, embedder: Box<dyn Embedder>) -> Result<Self, RagError> {
        let client = Qdrant::from_url(&config.endpoint)
            .build()
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(Self {
            client,
            config,
            embedder,
        })
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    async fn retrieve(&self, embedding: Vec<f32>) -> Result<Vec<RetrievedChunk>, RagError> {
        let search = SearchPointsBuilder::new(
            &self.config.collection,
            embedding,
            self.config.top_k as u64,
        )
        .score_threshold(self.config.min_score)
        .with_payload(true);

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        let chunks = response
            .result
            .into_iter()
            .filter_map(|point| {
                let content = point.payload.get("content").and_then(|v| match &v.kind {
                    Some(Kind::StringValue(s)) => Some(s.clone()),
                    _ => None,
                })?;
                let source = point.payload.get("source").and_then(|v| match &v.kind {
                    Some(Kind::StringValue(s)) => Some(s.clone()),
                    _ => None,
                });
                Some(RetrievedChunk {
                    content,
                    source,
                    score: point.score,
                })
            })
            .collect();

        Ok(chunks)
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, RagError> {
        self.embedder.embed(query).await
    }
}
