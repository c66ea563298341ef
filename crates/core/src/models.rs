use crate::error::StageError;
use crate::identity::IdentityStrategy;
use crate::retriever::DEFAULT_TOP_K;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One physical page of an extracted file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRecord {
    pub content: String,
    /// Zero-based position of the page inside its file.
    pub page_index: u32,
    pub source: String,
    #[serde(default)]
    pub extra_metadata: BTreeMap<String, String>,
}

impl PageRecord {
    pub fn new(source: impl Into<String>, page_index: u32, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            page_index,
            source: source.into(),
            extra_metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub source: String,
    pub page_index: u32,
    /// Position among the chunks of the same `(source, page_index)`.
    pub sequence_index: u32,
    #[serde(default)]
    pub extra_metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifiedChunk {
    pub id: String,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub source: String,
    pub page_index: u32,
    pub sequence_index: u32,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, String>,
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            source: chunk.source.clone(),
            page_index: chunk.page_index,
            sequence_index: chunk.sequence_index,
            extra: chunk.extra_metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub query: String,
    pub text: String,
    pub sources: Vec<RetrievedDocument>,
}

/// Pipeline-wide settings, built once at startup and handed to the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub identity: IdentityStrategy,
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            identity: IdentityStrategy::Positional,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Ingested { inserted: usize, skipped: usize },
    /// Nothing new to store: every chunk was already present, or the file had no text.
    Skipped { duplicates: usize },
    Failed {
        stage: String,
        kind: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub checksum: Option<String>,
    pub status: FileStatus,
    pub finished_at: DateTime<Utc>,
}

impl FileReport {
    pub fn failed(path: PathBuf, stage: impl ToString, source: &StageError) -> Self {
        Self {
            path,
            checksum: None,
            status: FileStatus::Failed {
                stage: stage.to_string(),
                kind: source.kind().to_string(),
                reason: source.to_string(),
            },
            finished_at: Utc::now(),
        }
    }

    pub fn inserted(&self) -> usize {
        match self.status {
            FileStatus::Ingested { inserted, .. } => inserted,
            _ => 0,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub files: Vec<FileReport>,
}

impl IngestionReport {
    pub fn inserted_total(&self) -> usize {
        self.files.iter().map(FileReport::inserted).sum()
    }

    pub fn failed_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|report| report.is_failed())
    }
}
