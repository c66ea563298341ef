use crate::error::StorageError;
use crate::models::{ChunkMetadata, RetrievedDocument, VectorRecord};
use crate::traits::VectorStore;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const SCROLL_PAGE: usize = 256;
const POINT_NAMESPACE: Uuid = Uuid::from_u128(0x2d9f_61a0_c4b3_5e7a_8f10_3b6e_d2c4_97a5);

/// Qdrant accepts only UUID or integer point ids, so the chunk id travels in
/// the payload and the point id is derived from it.
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&POINT_NAMESPACE, chunk_id.as_bytes()).to_string()
}

pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        })
    }

    fn url(&self, path: &str) -> Result<Url, StorageError> {
        Ok(self
            .endpoint
            .join(&format!("collections/{}{}", self.collection, path))?)
    }

    /// Creates the collection with cosine distance unless it already exists.
    pub async fn ensure_collection(&self) -> Result<(), StorageError> {
        let response = self.client.get(self.url("")?).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.url("")?)
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Request(format!(
                "qdrant collection setup failed with {}",
                response.status()
            )));
        }

        info!(collection = %self.collection, size = self.vector_size, "created qdrant collection");
        Ok(())
    }
}

fn backend_error(status: StatusCode) -> StorageError {
    StorageError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn get_existing_ids(&self) -> Result<HashSet<String>, StorageError> {
        let mut ids = HashSet::new();
        let mut offset = Value::Null;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": ["chunk_id"],
                "with_vector": false,
            });
            if !offset.is_null() {
                body["offset"] = offset.clone();
            }

            let response = self
                .client
                .post(self.url("/points/scroll")?)
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(backend_error(response.status()));
            }

            let parsed: Value = response.json().await?;
            let (page_ids, next) = parse_scroll_page(&parsed)?;
            ids.extend(page_ids);

            match next {
                Some(next) => offset = next,
                None => break,
            }
        }

        debug!(collection = %self.collection, count = ids.len(), "fetched existing ids");
        Ok(ids)
    }

    /// Qdrant's `PUT /points` replaces a point that already exists, so this is
    /// not insert-if-absent. Callers filter through the existing ids first;
    /// two writers racing past that check overwrite the same deterministic
    /// point with identical content.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, StorageError> {
        let points = records
            .iter()
            .map(|record| {
                if record.embedding.len() != self.vector_size {
                    return Err(StorageError::Request(format!(
                        "embedding dimension {} != {}",
                        record.embedding.len(),
                        self.vector_size
                    )));
                }

                let mut payload = json!({
                    "chunk_id": record.id,
                    "text": record.text,
                });
                if let (Value::Object(target), Value::Object(metadata)) =
                    (&mut payload, serde_json::to_value(&record.metadata)?)
                {
                    target.extend(metadata);
                }

                Ok(json!({
                    "id": point_id(&record.id),
                    "vector": record.embedding,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        let response = self
            .client
            .put(self.url("/points?wait=true")?)
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(count)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>, StorageError> {
        if vector.len() != self.vector_size {
            return Err(StorageError::Request(format!(
                "query vector dim {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(self.url("/points/search")?)
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parse_search_hits(&parsed)
    }
}

fn parse_scroll_page(parsed: &Value) -> Result<(Vec<String>, Option<Value>), StorageError> {
    let points = parsed
        .pointer("/result/points")
        .and_then(Value::as_array)
        .ok_or_else(|| StorageError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "scroll response has no result.points".to_string(),
        })?;

    let ids = points
        .iter()
        .filter_map(|point| point.pointer("/payload/chunk_id").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    let next = parsed
        .pointer("/result/next_page_offset")
        .filter(|value| !value.is_null())
        .cloned();

    Ok((ids, next))
}

fn parse_search_hits(parsed: &Value) -> Result<Vec<RetrievedDocument>, StorageError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| StorageError::BackendResponse {
            backend: "qdrant".to_string(),
            details: "search response has no result array".to_string(),
        })?;

    let mut documents = Vec::with_capacity(hits.len());
    for hit in hits {
        let payload = hit.pointer("/payload").cloned().unwrap_or(Value::Null);
        let id = payload
            .pointer("/chunk_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let text = payload
            .pointer("/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let metadata: ChunkMetadata = serde_json::from_value(strip_reserved(payload))?;
        let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);

        documents.push(RetrievedDocument {
            id,
            text,
            metadata,
            score,
        });
    }

    Ok(documents)
}

fn strip_reserved(mut payload: Value) -> Value {
    if let Value::Object(map) = &mut payload {
        map.remove("chunk_id");
        map.remove("text");
    }
    payload
}
