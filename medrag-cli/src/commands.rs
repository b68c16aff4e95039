//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use medrag_core::{
    EmbeddingProvider, HashingEmbeddingProvider, IndexBuilder, IngestPipeline, MedragConfig,
    RetrievalService, read_manifest,
};
use medrag_server::{ServerConfig, run_server};
use tracing::info;

use crate::cli::{EmbedderArgs, EmbedderKind, IngestArgs, InspectArgs, QueryArgs, ServeArgs};

/// Load the base configuration: defaults, overridden by a JSON file if given.
pub fn load_config(path: Option<&Path>) -> Result<MedragConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => MedragConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Build the embedding provider selected on the command line.
pub async fn embedder(args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    match args.embedder {
        EmbedderKind::Fastembed => fastembed_embedder(args).await,
        EmbedderKind::Hashing => {
            let dimensions =
                args.embedding_dimensions.unwrap_or(medrag_core::hashing::DEFAULT_DIMENSIONS);
            Ok(Arc::new(HashingEmbeddingProvider::new(dimensions)?))
        }
        EmbedderKind::Openai => openai_embedder(args),
    }
}

#[cfg(feature = "fastembed")]
async fn fastembed_embedder(args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    use medrag_core::fastembed::{DIMENSIONS, FastEmbedProvider};

    if let Some(dimensions) = args.embedding_dimensions {
        anyhow::ensure!(
            dimensions == DIMENSIONS,
            "the fastembed embedder produces {DIMENSIONS} dimensions, not {dimensions}"
        );
    }
    let provider = FastEmbedProvider::load(args.model_cache.clone())
        .await
        .context("failed to load the local embedding model")?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "fastembed"))]
async fn fastembed_embedder(_args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!(
        "the fastembed embedder is not available; rebuild medrag-cli with `--features fastembed` or pass `--embedder hashing`"
    )
}

#[cfg(feature = "openai")]
fn openai_embedder(args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    use medrag_core::openai::OpenAiEmbeddingProvider;

    let mut provider = match &args.embedding_url {
        Some(url) => {
            let provider = OpenAiEmbeddingProvider::new(url.clone())?;
            match std::env::var("OPENAI_API_KEY") {
                Ok(key) if !key.is_empty() => provider.with_api_key(key),
                _ => provider,
            }
        }
        None => OpenAiEmbeddingProvider::from_env()?,
    };
    if let Some(model) = &args.embedding_model {
        provider = provider.with_model(model.clone());
    }
    if let Some(dimensions) = args.embedding_dimensions {
        provider = provider.with_dimensions(dimensions);
    }
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "openai"))]
fn openai_embedder(_args: &EmbedderArgs) -> Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!("the openai embedder is not available; rebuild medrag-cli with `--features openai`")
}

pub async fn ingest(args: IngestArgs, base: MedragConfig) -> Result<()> {
    let mut config = base;
    if let Some(size) = args.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.chunk_overlap = overlap;
    }
    if let Some(kind) = args.index_kind {
        config.index_kind = kind.into();
    }
    if let Some(batch) = args.batch_size {
        config.embed_batch_size = batch;
    }
    if let Some(workers) = args.concurrency {
        config.ingest_concurrency = workers;
    }
    config.validate()?;

    let embedder = embedder(&args.embedder).await?;
    let report = IngestPipeline::new(config.clone())?
        .ingest_directory(&args.dir)
        .await
        .with_context(|| format!("ingestion of {} failed", args.dir.display()))?;

    let summary = serde_json::to_value(&report)?;
    let bundle = IndexBuilder::new(embedder, config).build(report.chunks).await?;
    bundle
        .save(&args.output)
        .with_context(|| format!("failed to write index bundle {}", args.output.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "output": args.output,
            "report": summary,
            "manifest": bundle.manifest,
        }))?
    );
    Ok(())
}

pub async fn serve(args: ServeArgs, config: MedragConfig) -> Result<()> {
    let service = RetrievalService::open(&args.index, embedder(&args.embedder).await?, config)
        .await
        .with_context(|| format!("cannot serve {}", args.index.display()))?;
    info!(index = %args.index.display(), vectors = service.len(), "index loaded");
    run_server(ServerConfig { host: args.host, port: args.port }, service).await
}

pub async fn query(args: QueryArgs, config: MedragConfig) -> Result<()> {
    let service = RetrievalService::open(&args.index, embedder(&args.embedder).await?, config)
        .await
        .with_context(|| format!("cannot open {}", args.index.display()))?;
    let response = service.query(&args.question, args.k).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let manifest = read_manifest(&args.index)
        .with_context(|| format!("cannot read {}", args.index.display()))?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
