//! Concrete backends picked from the command line.

use async_trait::async_trait;
use clap::ValueEnum;
use pdf_rag_core::{
    CharacterNgramEmbedder, EmbeddingError, EmbeddingProvider, LocalStore, OllamaEmbedder,
    QdrantStore, RetrievedDocument, StorageError, VectorRecord, VectorStore,
};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    Ollama,
    Ngram,
}

pub enum Store {
    Local(LocalStore),
    Qdrant(QdrantStore),
}

#[async_trait]
impl VectorStore for Store {
    async fn get_existing_ids(&self) -> Result<HashSet<String>, StorageError> {
        match self {
            Self::Local(store) => store.get_existing_ids().await,
            Self::Qdrant(store) => store.get_existing_ids().await,
        }
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, StorageError> {
        match self {
            Self::Local(store) => store.upsert(records).await,
            Self::Qdrant(store) => store.upsert(records).await,
        }
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>, StorageError> {
        match self {
            Self::Local(store) => store.query(vector, k).await,
            Self::Qdrant(store) => store.query(vector, k).await,
        }
    }
}

pub enum Embedder {
    Ollama(OllamaEmbedder),
    Ngram(CharacterNgramEmbedder),
}

impl Embedder {
    /// Vector length, probed from the backend when it is not fixed.
    pub async fn dimensions(&self) -> Result<usize, EmbeddingError> {
        match self {
            Self::Ngram(embedder) => Ok(embedder.dimensions.max(1)),
            Self::Ollama(embedder) => Ok(embedder.embed("dimension probe").await?.len()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            Self::Ollama(embedder) => embedder.embed(text).await,
            Self::Ngram(embedder) => embedder.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self {
            Self::Ollama(embedder) => embedder.embed_batch(texts).await,
            Self::Ngram(embedder) => embedder.embed_batch(texts).await,
        }
    }
}
