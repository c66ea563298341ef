use crate::embeddings::EmbeddingProvider;
use crate::error::{QueryStage, StageError};
use crate::models::RetrievedDocument;
use crate::traits::VectorStore;

pub const DEFAULT_TOP_K: usize = 5;

/// Embeds a query and asks the store for its nearest chunks.
pub struct Retriever<'a, E: ?Sized, S: ?Sized> {
    embedder: &'a E,
    store: &'a S,
}

impl<'a, E, S> Retriever<'a, E, S>
where
    E: EmbeddingProvider + Send + Sync + ?Sized,
    S: VectorStore + Send + Sync + ?Sized,
{
    pub fn new(embedder: &'a E, store: &'a S) -> Self {
        Self { embedder, store }
    }

    /// Top `k` documents by similarity, best first. Returns fewer when the
    /// collection is smaller than `k`; the failing stage is reported with the error.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, (QueryStage, StageError)> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|error| (QueryStage::Embed, error.into()))?;

        let mut documents = self
            .store
            .query(&vector, k)
            .await
            .map_err(|error| (QueryStage::Retrieve, error.into()))?;

        documents.sort_by(|left, right| right.score.total_cmp(&left.score));
        documents.truncate(k);
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbeddingError, StorageError};
    use crate::models::{ChunkMetadata, VectorRecord};
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Backend {
                status: 503,
                body: "model loading".to_string(),
            })
        }
    }

    struct ScoredStore {
        scores: Vec<f64>,
    }

    #[async_trait]
    impl VectorStore for ScoredStore {
        async fn get_existing_ids(&self) -> Result<HashSet<String>, StorageError> {
            Ok(HashSet::new())
        }

        async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<usize, StorageError> {
            Ok(0)
        }

        async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<RetrievedDocument>, StorageError> {
            Ok(self
                .scores
                .iter()
                .map(|score| RetrievedDocument {
                    id: format!("doc-{score}"),
                    text: format!("text {score}"),
                    metadata: ChunkMetadata {
                        source: "a.pdf".to_string(),
                        page_index: 0,
                        sequence_index: 0,
                        extra: Default::default(),
                    },
                    score: *score,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn retrieval_keeps_the_best_k_in_descending_order() {
        let store = ScoredStore {
            scores: vec![0.5, 0.9, 0.2],
        };
        let documents = Retriever::new(&FixedEmbedder, &store)
            .retrieve("query", 2)
            .await
            .unwrap();

        let scores: Vec<f64> = documents.iter().map(|document| document.score).collect();
        assert_eq!(scores, vec![0.9, 0.5]);
    }

    #[tokio::test]
    async fn small_collections_are_not_padded() {
        let store = ScoredStore { scores: vec![0.3] };
        let documents = Retriever::new(&FixedEmbedder, &store)
            .retrieve("query", DEFAULT_TOP_K)
            .await
            .unwrap();
        assert_eq!(documents.len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_is_tagged_with_its_stage() {
        let store = ScoredStore { scores: vec![0.3] };
        let result = Retriever::new(&FailingEmbedder, &store).retrieve("query", 1).await;
        assert!(matches!(
            result,
            Err((QueryStage::Embed, StageError::Embedding(_)))
        ));
    }
}
