use crate::chunking::{ChunkingConfig, RecursiveSplitter};
use crate::dedup::filter_new;
use crate::embeddings::EmbeddingProvider;
use crate::error::{ExtractionError, IngestStage, PipelineError, QueryStage, StageError};
use crate::extractor::{run_blocking, PdfExtractor};
use crate::ingest::{digest_file, discover_pdf_files, embed_and_store, is_pdf};
use crate::models::{
    Answer, FileReport, FileStatus, IngestionReport, PipelineConfig, RetrievedDocument,
};
use crate::prompt::{build_prompt, join_contexts};
use crate::retriever::Retriever;
use crate::traits::{Generator, VectorStore};
use chrono::Utc;
use std::path::Path;
use tracing::{debug, info, warn};

/// Per-file ingestion progress, logged as each stage completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Pending,
    Extracted,
    Chunked,
    Identified,
    Deduplicated,
    Embedded,
    Stored,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Embedded,
    Retrieved,
    PromptBuilt,
    Generated,
    Answered,
    Failed,
}

/// Sequences extraction, splitting, identity, dedup, embedding and storage
/// for ingestion, and retrieval, prompting and generation for queries.
pub struct RagPipeline<X, E, S, G> {
    config: PipelineConfig,
    splitter: RecursiveSplitter,
    extractor: X,
    embedder: E,
    store: S,
    generator: G,
}

impl<X, E, S, G> RagPipeline<X, E, S, G>
where
    X: PdfExtractor + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
    S: VectorStore + Send + Sync,
    G: Generator + Send + Sync,
{
    pub fn new(
        config: PipelineConfig,
        extractor: X,
        embedder: E,
        store: S,
        generator: G,
    ) -> Result<Self, PipelineError> {
        let splitter = RecursiveSplitter::new(ChunkingConfig::from(config))
            .map_err(|error| PipelineError::InvalidArgument(error.to_string()))?;

        Ok(Self {
            config,
            splitter,
            extractor,
            embedder,
            store,
            generator,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingests one file and propagates the first failure. Positional ids embed
    /// `path` as given; `ingest_path` canonicalizes it first.
    pub async fn ingest_file(&self, path: &Path) -> Result<FileReport, PipelineError> {
        let fail = |stage: IngestStage, error: StageError| {
            warn!(path = %path.display(), %stage, kind = error.kind(), state = ?IngestState::Failed, "ingestion failed");
            PipelineError::ingest(path, stage, error)
        };
        debug!(path = %path.display(), state = ?IngestState::Pending);

        let checksum = digest_file(path)
            .map_err(|error| fail(IngestStage::Extract, ExtractionError::Io(error).into()))?;
        let pages = run_blocking(|| self.extractor.extract(path))
            .map_err(|error| fail(IngestStage::Extract, error.into()))?;
        debug!(path = %path.display(), pages = pages.len(), state = ?IngestState::Extracted);

        let chunks = self.splitter.split(&pages);
        debug!(path = %path.display(), chunks = chunks.len(), state = ?IngestState::Chunked);

        let candidates = self
            .config
            .identity
            .identify(chunks)
            .map_err(|error| fail(IngestStage::Identify, error.into()))?;
        debug!(path = %path.display(), identity = %self.config.identity, state = ?IngestState::Identified);

        let existing_ids = self
            .store
            .get_existing_ids()
            .await
            .map_err(|error| fail(IngestStage::Deduplicate, error.into()))?;
        let outcome = filter_new(candidates, &existing_ids);
        debug!(path = %path.display(), state = ?IngestState::Deduplicated);

        let skipped = outcome.skipped;
        let status = if outcome.admitted.is_empty() {
            FileStatus::Skipped {
                duplicates: skipped,
            }
        } else {
            let inserted = embed_and_store(&self.embedder, &self.store, outcome.admitted)
                .await
                .map_err(|(stage, error)| fail(stage, error))?;
            debug!(path = %path.display(), state = ?IngestState::Embedded);
            FileStatus::Ingested { inserted, skipped }
        };

        info!(path = %path.display(), status = ?status, state = ?IngestState::Stored, "file ingested");
        Ok(FileReport {
            path: path.to_path_buf(),
            checksum: Some(checksum),
            status,
            finished_at: Utc::now(),
        })
    }

    /// Ingests every PDF under `folder`; a failing file is reported and the
    /// rest still run.
    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, PipelineError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(PipelineError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut report = IngestionReport::default();
        for path in files {
            let file_report = match self.ingest_file(&path).await {
                Ok(file_report) => file_report,
                Err(PipelineError::Ingest { path, stage, source }) => {
                    FileReport::failed(path, stage, &source)
                }
                Err(other) => return Err(other),
            };
            report.files.push(file_report);
        }

        info!(
            folder = %folder.display(),
            files = report.files.len(),
            inserted = report.inserted_total(),
            failed = report.failed_files().count(),
            "folder ingested"
        );
        Ok(report)
    }

    /// Accepts a single PDF or a folder of them. The path is canonicalized so
    /// every spelling of a file yields the same positional ids.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestionReport, PipelineError> {
        let path = tokio::fs::canonicalize(path).await.map_err(|error| {
            PipelineError::InvalidArgument(format!("cannot resolve {}: {error}", path.display()))
        })?;

        if path.is_dir() {
            return self.ingest_folder(&path).await;
        }
        if !path.is_file() || !is_pdf(&path) {
            return Err(PipelineError::InvalidArgument(format!(
                "{} is neither a pdf file nor a directory",
                path.display()
            )));
        }

        let file_report = self.ingest_file(&path).await?;
        Ok(IngestionReport {
            files: vec![file_report],
        })
    }

    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedDocument>, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("query is empty".to_string()));
        }

        let documents = Retriever::new(&self.embedder, &self.store)
            .retrieve(query, k)
            .await
            .map_err(|(stage, error)| query_failed(stage, error))?;
        debug!(hits = documents.len(), state = ?QueryState::Retrieved);
        Ok(documents)
    }

    /// Answers with the configured `top_k`.
    pub async fn answer(&self, query: &str) -> Result<Answer, PipelineError> {
        self.answer_with_k(query, self.config.top_k).await
    }

    pub async fn answer_with_k(&self, query: &str, k: usize) -> Result<Answer, PipelineError> {
        debug!(state = ?QueryState::Received);
        let sources = self.retrieve(query, k).await?;
        if sources.is_empty() {
            warn!(query = %query, "no documents retrieved; prompting with empty context");
        }

        let prompt = build_prompt(query, &join_contexts(&sources));
        debug!(prompt_chars = prompt.len(), state = ?QueryState::PromptBuilt);

        let text = self
            .generator
            .generate(&prompt)
            .await
            .map_err(|error| query_failed(QueryStage::Generate, error.into()))?;
        debug!(state = ?QueryState::Generated);

        info!(sources = sources.len(), state = ?QueryState::Answered, "query answered");
        Ok(Answer {
            query: query.to_string(),
            text,
            sources,
        })
    }
}

fn query_failed(stage: QueryStage, error: StageError) -> PipelineError {
    warn!(%stage, kind = error.kind(), state = ?QueryState::Failed, "query failed");
    PipelineError::query(stage, error)
}
