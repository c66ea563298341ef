use crate::embeddings::EmbeddingProvider;
use crate::error::{IngestStage, StageError};
use crate::models::{ChunkMetadata, IdentifiedChunk, VectorRecord};
use crate::traits::VectorStore;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn digest_file(path: &Path) -> Result<String, std::io::Error> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Embeds every admitted chunk, then writes them in a single upsert. Nothing
/// is written unless all embeddings succeeded.
pub async fn embed_and_store<E, S>(
    embedder: &E,
    store: &S,
    admitted: Vec<IdentifiedChunk>,
) -> Result<usize, (IngestStage, StageError)>
where
    E: EmbeddingProvider + Sync + ?Sized,
    S: VectorStore + Sync + ?Sized,
{
    if admitted.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = admitted
        .iter()
        .map(|candidate| candidate.chunk.content.clone())
        .collect();

    let embeddings = embedder
        .embed_batch(&texts)
        .await
        .map_err(|error| (IngestStage::Embed, error.into()))?;

    if embeddings.len() != admitted.len() || embeddings.iter().any(Vec::is_empty) {
        return Err((
            IngestStage::Embed,
            crate::error::EmbeddingError::CountMismatch {
                expected: admitted.len(),
                got: embeddings.iter().filter(|vector| !vector.is_empty()).count(),
            }
            .into(),
        ));
    }

    let records = admitted
        .into_iter()
        .zip(embeddings)
        .map(|(candidate, embedding)| VectorRecord {
            metadata: ChunkMetadata::from(&candidate.chunk),
            id: candidate.id,
            embedding,
            text: candidate.chunk.content,
        })
        .collect();

    store
        .upsert(records)
        .await
        .map_err(|error| (IngestStage::Store, error.into()))
}
