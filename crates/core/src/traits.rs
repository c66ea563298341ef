use crate::error::{InferenceError, StorageError};
use crate::models::{RetrievedDocument, VectorRecord};
use async_trait::async_trait;
use std::collections::HashSet;

/// A persistent collection of embedded chunks keyed by unique id.
///
/// Backends only ever insert: a record whose id is already present is left
/// untouched, so concurrent readers see a monotonically growing set.
#[async_trait]
pub trait VectorStore {
    async fn get_existing_ids(&self) -> Result<HashSet<String>, StorageError>;

    /// Writes `records` in one call and returns how many the store accepted.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, StorageError>;

    /// Nearest records to `vector`, most similar first, at most `k` of them.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>, StorageError>;
}

#[async_trait]
pub trait Generator {
    async fn generate(&self, prompt: &str) -> Result<String, InferenceError>;
}
