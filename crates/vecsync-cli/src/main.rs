//! CLI entry point: sync a document folder into a vector index.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use vecsync_core::config::default_config_path;
use vecsync_core::{
    load_chunks, load_config, load_default_config, run_ingestion, Chunk, Config, Credentials, Embedder,
    EmbeddingProvider, IngestReport, OllamaEmbeddings, OpenAiEmbeddings, PineconeClient, PipelineError,
    ProviderKind, Verification,
};

#[derive(Parser)]
#[command(name = "vecsync")]
#[command(about = "vecsync: chunk, embed and upsert a document folder into a vector index")]
struct Cli {
    /// Config file. Defaults to vecsync.toml in the app data directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Chunk, embed and upsert the configured documents (default).
    Ingest,
    /// List the chunks that would be ingested, without calling any service.
    Chunks,
    /// Show where vecsync looks for its config file.
    ConfigPath,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Ingest) {
        Commands::ConfigPath => {
            match default_config_path() {
                Some(p) => println!("{}", p.display()),
                None => eprintln!("Could not determine app data directory."),
            }
            ExitCode::SUCCESS
        }
        Commands::Chunks => {
            let Some(config) = config_or_exit(cli.config) else {
                return ExitCode::FAILURE;
            };
            match load_chunks(&config.documents) {
                Ok(chunks) => {
                    println!("{} chunk(s) under {}", chunks.len(), config.documents.dir.display());
                    for c in &chunks {
                        let first = c.text.lines().next().unwrap_or("").trim();
                        let preview: String = first.chars().take(60).collect();
                        let ellipsis = if first.chars().count() > 60 { "..." } else { "" };
                        println!("  {}  {}  {}{}", c.id, c.source_path.display(), preview, ellipsis);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Ingest => {
            let Some(config) = config_or_exit(cli.config) else {
                return ExitCode::FAILURE;
            };
            ingest(&config).await
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("VECSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn config_or_exit(path: Option<PathBuf>) -> Option<Config> {
    let loaded = match &path {
        Some(p) => load_config(p),
        None => load_default_config(),
    };
    match loaded {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("ConfigError: {}", e);
            None
        }
    }
}

async fn ingest(config: &Config) -> ExitCode {
    let creds = match Credentials::from_lookup(config.embedding.provider, |k| std::env::var(k).ok()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ConfigError: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let chunks = match load_chunks(&config.documents) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ScanError: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pinecone = match PineconeClient::new(
        &creds.pinecone_api_key,
        &config.index.controller_url,
        config.index.namespace.clone(),
        config.embedding.request_timeout(),
    ) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("ConfigError: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match config.embedding.provider {
        ProviderKind::OpenAi => {
            let key = creds.openai_api_key.as_deref().unwrap_or_default();
            match OpenAiEmbeddings::new(
                key,
                config.embedding.base_url.as_deref(),
                config.embedding.model(),
                config.embedding.request_timeout(),
            ) {
                Ok(p) => run(config, &chunks, p, &pinecone).await,
                Err(e) => Err(PipelineError::Embedding(e)),
            }
        }
        ProviderKind::Ollama => {
            let url = config
                .embedding
                .base_url
                .as_deref()
                .unwrap_or(vecsync_core::ollama::DEFAULT_BASE_URL);
            match OllamaEmbeddings::from_url(url, config.embedding.model()) {
                Ok(p) => run(config, &chunks, p, &pinecone).await,
                Err(e) => {
                    eprintln!("ConfigError: invalid Ollama URL {}: {}", url, e);
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    match result {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("ingestion failed: {}", e);
            eprintln!("{}: {}", e.kind(), e);
            if let Some(index) = e.index() {
                eprintln!("  index: {}", index);
            }
            if let Some(n) = e.committed_records() {
                eprintln!("  records committed before failure: {}", n);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run<P: EmbeddingProvider>(
    config: &Config,
    chunks: &[Chunk],
    provider: P,
    pinecone: &PineconeClient,
) -> Result<IngestReport, PipelineError> {
    let embedder = Embedder::new(provider, config.embedding.batch_size, config.retry.policy());
    run_ingestion(config, chunks, &embedder, pinecone, pinecone).await
}

fn print_report(report: &IngestReport) {
    println!(
        "Upserted {} of {} chunk(s) into '{}' (dimension {}{})",
        report.upserted,
        report.chunks,
        report.index_name,
        report.dimension,
        if report.created { ", newly created" } else { "" }
    );
    match &report.verification {
        Verification::Skipped => {}
        Verification::Failed(e) => println!("Sample search failed: {}", e),
        Verification::Hits(hits) => {
            println!("Sample search:");
            for h in hits {
                let meta = serde_json::to_string(&h.metadata).unwrap_or_default();
                println!("  {:.4}  {}  {}", h.score, h.id, meta);
            }
        }
    }
}
