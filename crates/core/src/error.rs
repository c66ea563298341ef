use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("multimodal OCR failed: {0}")]
    OcrFailed(String),

    #[error("extraction worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("invalid chunking config: {0}")]
    InvalidConfig(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("chunk is missing identity field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage request failed: {0}")]
    Request(String),

    #[error("collection uses {stored} identity but {requested} was requested")]
    IdentityMismatch { stored: String, requested: String },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("embedding backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("embedding backend returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("inference backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("inference backend returned an empty response")]
    EmptyResponse,
}

/// Any failure a single pipeline stage can produce.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl StageError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "ExtractionError",
            Self::Chunking(_) => "ChunkingError",
            Self::Identity(_) => "IdentityError",
            Self::Storage(_) => "StorageError",
            Self::Embedding(_) => "EmbeddingError",
            Self::Inference(_) => "InferenceError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Extract,
    Identify,
    Deduplicate,
    Embed,
    Store,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Identify => "identify",
            Self::Deduplicate => "deduplicate",
            Self::Embed => "embed",
            Self::Store => "store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Embed,
    Retrieve,
    Generate,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embed => "embed",
            Self::Retrieve => "retrieve",
            Self::Generate => "generate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ingestion of {} failed at {stage} ({}): {source}", .path.display(), .source.kind())]
    Ingest {
        path: PathBuf,
        stage: IngestStage,
        #[source]
        source: StageError,
    },

    #[error("query failed at {stage} ({}): {source}", .source.kind())]
    Query {
        stage: QueryStage,
        #[source]
        source: StageError,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PipelineError {
    pub fn ingest(path: impl Into<PathBuf>, stage: IngestStage, source: impl Into<StageError>) -> Self {
        Self::Ingest {
            path: path.into(),
            stage,
            source: source.into(),
        }
    }

    pub fn query(stage: QueryStage, source: impl Into<StageError>) -> Self {
        Self::Query {
            stage,
            source: source.into(),
        }
    }
}
