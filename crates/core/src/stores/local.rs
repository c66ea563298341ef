use crate::embeddings::EmbeddingProvider;
use crate::error::{StageError, StorageError};
use crate::identity::IdentityStrategy;
use crate::models::{RetrievedDocument, VectorRecord};
use crate::traits::VectorStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    identity: IdentityStrategy,
    records: Vec<VectorRecord>,
}

#[derive(Debug, Default)]
struct Collection {
    ids: HashSet<String>,
    records: Vec<VectorRecord>,
}

/// Collection kept in memory and, when opened from a path, mirrored to a JSON
/// file after every write. Similarity is cosine over all records.
pub struct LocalStore {
    path: Option<PathBuf>,
    identity: IdentityStrategy,
    collection: RwLock<Collection>,
}

impl LocalStore {
    pub fn in_memory(identity: IdentityStrategy) -> Self {
        Self {
            path: None,
            identity,
            collection: RwLock::new(Collection::default()),
        }
    }

    /// Loads the collection at `path`, or starts an empty one. A collection
    /// written with another identity strategy is refused.
    pub async fn open(path: impl AsRef<Path>, identity: IdentityStrategy) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut collection = Collection::default();

        if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            let file: CollectionFile = serde_json::from_slice(&bytes)?;
            if file.identity != identity {
                return Err(StorageError::IdentityMismatch {
                    stored: file.identity.to_string(),
                    requested: identity.to_string(),
                });
            }
            collection.ids = file.records.iter().map(|record| record.id.clone()).collect();
            collection.records = file.records;
        }

        debug!(path = %path.display(), records = collection.records.len(), "opened local collection");
        Ok(Self {
            path: Some(path),
            identity,
            collection: RwLock::new(collection),
        })
    }

    pub fn identity(&self) -> IdentityStrategy {
        self.identity
    }

    pub async fn len(&self) -> usize {
        self.collection.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Raw-text query: embeds `text` with the collection's provider first.
    pub async fn query_text<E>(
        &self,
        embedder: &E,
        text: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, StageError>
    where
        E: EmbeddingProvider + Sync + ?Sized,
    {
        let vector = embedder.embed(text).await?;
        Ok(self.query(&vector, k).await?)
    }

    async fn persist(&self, records: &[VectorRecord]) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = CollectionFile {
            identity: self.identity,
            records: records.to_vec(),
        };
        let temporary = path.with_extension("json.tmp");
        tokio::fs::write(&temporary, serde_json::to_vec(&file)?).await?;
        tokio::fs::rename(&temporary, path).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalStore {
    async fn get_existing_ids(&self) -> Result<HashSet<String>, StorageError> {
        Ok(self.collection.read().await.ids.clone())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, StorageError> {
        if let Some(record) = records.iter().find(|record| record.embedding.is_empty()) {
            return Err(StorageError::Request(format!(
                "record {} has no embedding",
                record.id
            )));
        }

        let mut collection = self.collection.write().await;
        let mut batch_ids = HashSet::new();
        let fresh: Vec<VectorRecord> = records
            .into_iter()
            .filter(|record| {
                !collection.ids.contains(&record.id) && batch_ids.insert(record.id.clone())
            })
            .collect();

        if fresh.is_empty() {
            return Ok(0);
        }

        // Memory only changes once the file holds the new records.
        let mut next = collection.records.clone();
        next.extend(fresh.iter().cloned());
        self.persist(&next).await?;

        let inserted = fresh.len();
        collection.ids.extend(batch_ids);
        collection.records = next;
        Ok(inserted)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>, StorageError> {
        let collection = self.collection.read().await;

        let mut scored = Vec::with_capacity(collection.records.len());
        for record in &collection.records {
            if record.embedding.len() != vector.len() {
                return Err(StorageError::Request(format!(
                    "query vector dim {} does not match stored dim {}",
                    vector.len(),
                    record.embedding.len()
                )));
            }
            scored.push((cosine_similarity(vector, &record.embedding), record));
        }

        scored.sort_by(|left, right| right.0.total_cmp(&left.0));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, record)| RetrievedDocument {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score,
            })
            .collect())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        dot += f64::from(*a) * f64::from(*b);
        left_norm += f64::from(*a) * f64::from(*a);
        right_norm += f64::from(*b) * f64::from(*b);
    }
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::ChunkMetadata;
    use tempfile::tempdir;

    fn record(id: &str, embedding: Vec<f32>, text: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "a.pdf".to_string(),
                page_index: 0,
                sequence_index: 0,
                extra: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn second_insert_of_an_id_is_a_no_op() {
        let store = LocalStore::in_memory(IdentityStrategy::Positional);
        assert_eq!(store.upsert(vec![record("a", vec![1.0, 0.0], "first")]).await.unwrap(), 1);
        assert_eq!(
            store
                .upsert(vec![record("a", vec![0.0, 1.0], "replacement"), record("b", vec![0.0, 1.0], "b")])
                .await
                .unwrap(),
            1
        );

        let hits = store.query(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "first");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn query_ranks_by_descending_similarity() {
        let store = LocalStore::in_memory(IdentityStrategy::Content);
        store
            .upsert(vec![
                record("low", vec![0.2, 0.98], "low"),
                record("high", vec![0.9, 0.436], "high"),
                record("mid", vec![0.5, 0.866], "mid"),
            ])
            .await
            .unwrap();

        let hits = store.query(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_storage_error() {
        let store = LocalStore::in_memory(IdentityStrategy::Positional);
        store.upsert(vec![record("a", vec![1.0, 0.0], "a")]).await.unwrap();
        assert!(store.query(&[1.0, 0.0, 0.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn collection_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("kb").join("collection.json");

        let store = LocalStore::open(&path, IdentityStrategy::Positional).await?;
        store.upsert(vec![record("a.pdf:0:0", vec![1.0, 0.0], "a")]).await?;

        let reopened = LocalStore::open(&path, IdentityStrategy::Positional).await?;
        let ids = reopened.get_existing_ids().await?;
        assert!(ids.contains("a.pdf:0:0"));
        assert_eq!(reopened.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_the_collection_unchanged() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let blocker = dir.path().join("blocker");
        let store = LocalStore::open(blocker.join("collection.json"), IdentityStrategy::Positional).await?;
        std::fs::write(&blocker, b"not a directory")?;

        let first = store.upsert(vec![record("a.pdf:0:0", vec![1.0, 0.0], "a")]).await;
        assert!(matches!(first, Err(StorageError::Io(_))));
        assert!(store.get_existing_ids().await?.is_empty());
        assert!(store.is_empty().await);

        std::fs::remove_file(&blocker)?;
        let retry = store.upsert(vec![record("a.pdf:0:0", vec![1.0, 0.0], "a")]).await?;
        assert_eq!(retry, 1);

        let reopened = LocalStore::open(blocker.join("collection.json"), IdentityStrategy::Positional).await?;
        assert!(reopened.get_existing_ids().await?.contains("a.pdf:0:0"));
        Ok(())
    }

    #[tokio::test]
    async fn reopening_with_another_identity_is_refused() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("collection.json");
        LocalStore::open(&path, IdentityStrategy::Positional)
            .await?
            .upsert(vec![record("a.pdf:0:0", vec![1.0], "a")])
            .await?;

        let result = LocalStore::open(&path, IdentityStrategy::Content).await;
        assert!(matches!(result, Err(StorageError::IdentityMismatch { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn raw_text_query_embeds_with_the_given_provider() {
        let embedder = CharacterNgramEmbedder::default();
        let store = LocalStore::in_memory(IdentityStrategy::Content);
        store
            .upsert(vec![
                record("pump", embedder.embed_sync("hydraulic pump pressure"), "hydraulic pump pressure"),
                record("seal", embedder.embed_sync("rubber seal inspection"), "rubber seal inspection"),
            ])
            .await
            .unwrap();

        let hits = store.query_text(&embedder, "rubber seal inspection", 1).await.unwrap();
        assert_eq!(hits[0].id, "seal");
    }
}
