pub mod chunking;
pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod stores;
pub mod traits;

pub use chunking::{char_length, ChunkingConfig, RecursiveSplitter, DEFAULT_SEPARATORS};
pub use dedup::{filter_new, DedupOutcome};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingProvider, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ChunkingError, EmbeddingError, ExtractionError, IdentityError, InferenceError, IngestStage,
    PipelineError, QueryStage, StageError, StorageError,
};
pub use extractor::{
    FallbackExtractor, LopdfExtractor, OcrEndpointConfig, OcrEndpointExtractor, PdfExtractor,
};
pub use generation::OllamaGenerator;
pub use identity::IdentityStrategy;
pub use ingest::{digest_file, discover_pdf_files, embed_and_store};
pub use models::{
    Answer, Chunk, ChunkMetadata, FileReport, FileStatus, IdentifiedChunk, IngestionReport,
    PageRecord, PipelineConfig, RetrievedDocument, VectorRecord,
};
pub use orchestrator::{IngestState, QueryState, RagPipeline};
pub use prompt::{build_prompt, join_contexts, OUTPUT_LANGUAGE};
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use stores::{LocalStore, QdrantStore};
pub use traits::{Generator, VectorStore};
