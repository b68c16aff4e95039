//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use medrag_core::IndexKind;

#[derive(Parser, Debug)]
#[command(name = "medrag", version, about = "Medical reference retrieval: ingest, inspect and serve")]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty, env = "MEDRAG_LOG_FORMAT")]
    pub log_format: LogFormatArg,

    /// JSON file with configuration overrides (chunk sizes, top_k, HNSW parameters)
    #[arg(long, global = true, env = "MEDRAG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build an index bundle from a directory of PDF and text documents
    Ingest(IngestArgs),
    /// Serve an index bundle over HTTP
    Serve(ServeArgs),
    /// Answer one question from an index bundle and print the JSON response
    Query(QueryArgs),
    /// Print the manifest of an index bundle
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Directory holding the source documents
    pub dir: PathBuf,

    /// Where to write the index bundle
    #[arg(short, long)]
    pub output: PathBuf,

    /// Maximum chunk size in characters
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long)]
    pub chunk_overlap: Option<usize>,

    /// Index structure to build
    #[arg(long = "index", value_enum)]
    pub index_kind: Option<IndexKindArg>,

    /// Chunk texts per embedding call
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Documents loaded in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub embedder: EmbedderArgs,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Index bundle to serve
    #[arg(long, env = "MEDRAG_INDEX")]
    pub index: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "MEDRAG_HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(long, default_value_t = medrag_server::server::DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    #[command(flatten)]
    pub embedder: EmbedderArgs,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Index bundle to search
    #[arg(long, env = "MEDRAG_INDEX")]
    pub index: PathBuf,

    /// The question
    pub question: String,

    /// Number of results
    #[arg(short)]
    pub k: Option<usize>,

    #[command(flatten)]
    pub embedder: EmbedderArgs,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Index bundle to describe
    #[arg(long, env = "MEDRAG_INDEX")]
    pub index: PathBuf,
}

/// Which embedding provider to use. Bundles must be served with the provider
/// (and dimension) they were built with.
#[derive(Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// Embedding provider
    #[arg(long, value_enum, default_value_t = EmbedderKind::Fastembed, env = "MEDRAG_EMBEDDER")]
    pub embedder: EmbedderKind,

    /// Directory the local embedding model is downloaded to
    #[arg(long, env = "FASTEMBED_CACHE_DIR")]
    pub model_cache: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible embeddings API
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub embedding_url: Option<String>,

    /// Embedding model name
    #[arg(long, env = "MEDRAG_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Embedding dimensions
    #[arg(long, env = "MEDRAG_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Local all-MiniLM-L6-v2 sentence embeddings (requires the `fastembed` feature)
    Fastembed,
    /// Deterministic feature-hashing embeddings, for tests and offline use
    Hashing,
    /// OpenAI-compatible embeddings endpoint (requires the `openai` feature)
    Openai,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKindArg {
    /// Exact brute-force search
    Flat,
    /// Approximate HNSW graph
    Hnsw,
}

impl From<IndexKindArg> for IndexKind {
    fn from(arg: IndexKindArg) -> Self {
        match arg {
            IndexKindArg::Flat => IndexKind::Flat,
            IndexKindArg::Hnsw => IndexKind::Hnsw,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for medrag_telemetry::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => medrag_telemetry::LogFormat::Pretty,
            LogFormatArg::Json => medrag_telemetry::LogFormat::Json,
        }
    }
}
