mod backends;

use backends::{Embedder, EmbedderKind, Store, StoreKind};
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    CharacterNgramEmbedder, FallbackExtractor, FileStatus, IdentityStrategy, LocalStore,
    LopdfExtractor, OcrEndpointConfig, OcrEndpointExtractor, OllamaEmbedder, OllamaGenerator,
    PdfExtractor, PipelineConfig, QdrantStore, RagPipeline, RetrievedDocument,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector store backend
    #[arg(long, value_enum, env = "PDF_RAG_STORE", default_value = "local")]
    store: StoreKind,

    /// Collection file used by the local store
    #[arg(long, env = "PDF_RAG_COLLECTION", default_value = "data/collection.json")]
    collection_path: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "pdf_chunks")]
    qdrant_collection: String,

    /// Embedding backend
    #[arg(long, value_enum, env = "PDF_RAG_EMBEDDER", default_value = "ollama")]
    embedder: EmbedderKind,

    /// Ollama base URL, shared by embeddings and generation
    #[arg(long, env = "LLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Ollama embedding model
    #[arg(long, env = "LLAMA_MODEL_EMBEDDING", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Ollama generation model
    #[arg(long, env = "LLAMA_MODEL_INFERENCE", default_value = "llama3.2")]
    inference_model: String,

    /// Chunk id strategy; a collection must always be written with the same one.
    /// Positional ids embed the canonical file path, so moving files changes them.
    #[arg(long, env = "PDF_RAG_IDENTITY", default_value = "positional")]
    identity: IdentityStrategy,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = 1_000)]
    chunk_size: usize,

    /// Characters shared between consecutive chunks of a page
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Multimodal OCR endpoint used when a PDF has no text layer
    #[arg(long, env = "LLM_OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    /// Bearer token for the OCR endpoint
    #[arg(long, env = "LLM_OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF file, or every PDF under a folder, into the collection.
    Ingest {
        /// PDF file or folder searched recursively.
        #[arg(long)]
        path: PathBuf,
    },
    /// Answer a question from the ingested documents.
    Ask {
        /// Question to answer
        #[arg(long)]
        query: String,
        /// Number of passages handed to the model.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Print the passages used as context.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Retrieve the passages closest to a query without generating an answer.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of passages to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    let config = PipelineConfig {
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
        identity: cli.identity,
        ..PipelineConfig::default()
    };

    let embedder = match cli.embedder {
        EmbedderKind::Ollama => Embedder::Ollama(OllamaEmbedder::new(&cli.ollama_url, &cli.embedding_model)?),
        EmbedderKind::Ngram => Embedder::Ngram(CharacterNgramEmbedder::default()),
    };

    let store = match cli.store {
        StoreKind::Local => Store::Local(LocalStore::open(&cli.collection_path, cli.identity).await?),
        StoreKind::Qdrant => {
            let vector_size = embedder.dimensions().await?;
            let store = QdrantStore::new(&cli.qdrant_url, &cli.qdrant_collection, vector_size)?;
            store.ensure_collection().await?;
            Store::Qdrant(store)
        }
    };

    let extractor: Box<dyn PdfExtractor + Send + Sync> =
        match OcrEndpointConfig::from_parts(cli.ocr_endpoint.clone(), cli.ocr_api_key.clone()) {
            Some(ocr) => Box::new(FallbackExtractor::new(
                LopdfExtractor,
                OcrEndpointExtractor::new(ocr),
            )),
            None => Box::new(LopdfExtractor),
        };

    let generator = OllamaGenerator::new(&cli.ollama_url, &cli.inference_model)?;
    let pipeline = RagPipeline::new(config, extractor, embedder, store, generator)?;

    match cli.command {
        Command::Ingest { path } => {
            let report = pipeline.ingest_path(&path).await?;

            for file in &report.files {
                match &file.status {
                    FileStatus::Ingested { inserted, skipped } => println!(
                        "[ingested] {} new={inserted} duplicates={skipped}",
                        file.path.display()
                    ),
                    FileStatus::Skipped { duplicates } => println!(
                        "[skipped] {} nothing new (duplicates={duplicates})",
                        file.path.display()
                    ),
                    FileStatus::Failed {
                        stage,
                        kind,
                        reason,
                    } => {
                        warn!(path = %file.path.display(), %stage, %kind, "skipped pdf");
                        println!(
                            "[failed] {} stage={stage} kind={kind} reason={reason}",
                            file.path.display()
                        );
                    }
                }
            }

            println!(
                "{} chunks ingested from {} file(s) at {}",
                report.inserted_total(),
                report.files.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            query,
            top_k,
            show_sources,
        } => {
            let answer = pipeline.answer_with_k(&query, top_k).await?;

            println!("query: {}", answer.query);
            println!("{}", answer.text);
            if show_sources {
                print_documents(&answer.sources);
            }
        }
        Command::Search { query, top_k } => {
            let documents = pipeline.retrieve(&query, top_k).await?;
            println!("query: {query}");
            print_documents(&documents);
        }
    }

    Ok(())
}

fn print_documents(documents: &[RetrievedDocument]) {
    for document in documents {
        println!(
            "score={:.4} id={} source={} page_index={}",
            document.score, document.id, document.metadata.source, document.metadata.page_index
        );
        println!("  chunk_text:\n{}", document.text);
    }
}
