use clap::{ArgAction, Parser, Subcommand};
use healthrag_retriever::{
    RetrieverError,
    chunk::read_chunks_jsonl,
    config::{ProviderKind, RetrieverConfig},
    context::RetrieverContext,
    orchestrator::{API_KEY_ENV, Answer, ApiKey, ChatCompletionsClient},
    retrieval::{InterruptHandle, SearchHit},
    storage::{ArtifactPaths, CheckpointState, CheckpointStore, load_artifacts},
    verification::{VerificationApiResponse, render_report},
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Build, search and verify a health-document vector index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Embedding provider, overriding the configuration file (fastembed or hashing)
    #[arg(long)]
    provider: Option<ProviderArg>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed a JSON-lines chunk file into the vector index
    Index {
        /// Chunk file, one {"text": ..., "metadata": {...}} object per line
        chunks: PathBuf,
        /// Chunks per batch and per checkpoint
        #[arg(long)]
        batch_size: Option<usize>,
        /// Ignore and discard any existing checkpoint
        #[arg(long)]
        no_resume: bool,
        #[arg(long)]
        index_path: Option<PathBuf>,
        #[arg(long)]
        metadata_path: Option<PathBuf>,
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Search the index for chunks similar to a query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Check whether an answer is grounded in the sources retrieved for its query
    Verify {
        query: String,
        /// Answer text to verify
        #[arg(long, conflicts_with = "response_file")]
        response: Option<String>,
        /// File containing the answer text
        #[arg(long)]
        response_file: Option<PathBuf>,
        /// Number of sources to retrieve
        #[arg(short)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Answer a question from retrieved sources with a hosted model
    Ask {
        query: String,
        /// API key for the hosted model (defaults to $GROQ_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// File whose contents precede the retrieved context in the prompt
        #[arg(long)]
        preamble_file: Option<PathBuf>,
        /// Also verify the answer against its sources
        #[arg(long)]
        verify: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show checkpoint and artifact status
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Delete the indexing checkpoint
    ClearCheckpoint,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProviderArg(ProviderKind);

impl std::str::FromStr for ProviderArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastembed" => Ok(ProviderArg(ProviderKind::FastEmbed)),
            "hashing" => Ok(ProviderArg(ProviderKind::Hashing)),
            _ => Err(format!("Invalid provider: {s}")),
        }
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    answer: &'a Answer,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification: Option<VerificationApiResponse>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        if e
            .downcast_ref::<RetrieverError>()
            .is_some_and(RetrieverError::is_resumable)
        {
            eprintln!("The checkpoint is intact; run the same command again to resume.");
        }
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(args: &Args) -> anyhow::Result<RetrieverConfig> {
    let mut config = match &args.config {
        Some(path) => RetrieverConfig::load(path).await?,
        None => RetrieverConfig::default(),
    };
    if let Some(ProviderArg(kind)) = args.provider {
        config = config.with_provider(kind);
    }
    Ok(config)
}

fn print_hits(hits: &[SearchHit]) {
    println!("Found {} results:", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. score {:.4} | {} (chunk {}/{}) | id {}",
            i + 1,
            hit.score,
            hit.metadata.source,
            hit.metadata.chunk_index + 1,
            hit.metadata.total_chunks,
            hit.metadata.source_id()
        );
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(&args).await?;

    match args.command {
        Commands::Index {
            chunks,
            batch_size,
            no_resume,
            index_path,
            metadata_path,
            checkpoint_dir,
            format,
        } => {
            if let Some(batch_size) = batch_size {
                config = config.with_batch_size(batch_size);
            }
            if let Some(dir) = checkpoint_dir {
                config = config.with_checkpoint_dir(dir);
            }
            let paths = ArtifactPaths::new(
                index_path.unwrap_or(config.indexing.index_path.clone()),
                metadata_path.unwrap_or(config.indexing.metadata_path.clone()),
            );
            config = config.with_artifacts(paths);

            let chunks = read_chunks_jsonl(&chunks).await?;
            let context = RetrieverContext::build(config).await?;

            let interrupt = InterruptHandle::new();
            let on_signal = interrupt.clone();
            tokio::spawn(async move {
                if let Some(code) = watch_interrupts(tokio::signal::ctrl_c, on_signal).await {
                    process::exit(code);
                }
            });

            let pipeline = context.pipeline()?.with_interrupt(interrupt);
            let report = pipeline.run(&chunks, !no_resume).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Summary => {
                    println!("Indexed {} chunks", report.vectors_indexed);
                    println!(
                        "  Batches: {} processed, {} resumed from checkpoint, {} total",
                        report.batches_processed, report.batches_skipped, report.total_batches
                    );
                    println!(
                        "  Model: {} ({} dimensions)",
                        report.model_identity, report.embedding_dim
                    );
                    println!("  Index: {}", report.artifacts.index_path.display());
                    println!("  Metadata: {}", report.artifacts.metadata_path.display());
                    println!("  Elapsed: {:.1}s", report.elapsed_secs);
                }
            }
            Ok(())
        }
        Commands::Search { query, k, format } => {
            let k = k.unwrap_or(config.llm.top_k);
            let context = RetrieverContext::build(config).await?;
            let engine = context.retrieval_engine().await?;
            let hits = engine.search(&query, k).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hits)?),
                OutputFormat::Summary => print_hits(&hits),
            }
            Ok(())
        }
        Commands::Verify {
            query,
            response,
            response_file,
            k,
            format,
        } => {
            let response = match (response, response_file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path).await?,
                (None, None) => anyhow::bail!("either --response or --response-file is required"),
            };
            let k = k.unwrap_or(config.llm.top_k);
            let context = RetrieverContext::build(config).await?;
            let engine = context.retrieval_engine().await?;
            let hits = engine.search(&query, k).await?;
            let verification = context
                .verifier()?
                .verify_response(&query, &response, &hits)
                .await;

            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&VerificationApiResponse::from(&verification))?
                ),
                OutputFormat::Summary => print!("{}", render_report(&verification)),
            }
            Ok(())
        }
        Commands::Ask {
            query,
            api_key,
            preamble_file,
            verify,
            format,
        } => {
            let api_key = api_key
                .map(ApiKey::new)
                .or_else(|| ApiKey::from_env(API_KEY_ENV))
                .ok_or_else(|| anyhow::anyhow!("no API key: pass --api-key or set {API_KEY_ENV}"))?;

            let context = RetrieverContext::build(config).await?;
            let engine = Arc::new(context.retrieval_engine().await?);
            let model = Arc::new(ChatCompletionsClient::new()?);
            let mut orchestrator = context.orchestrator(engine, model)?;
            if let Some(path) = preamble_file {
                orchestrator = orchestrator.with_preamble(tokio::fs::read_to_string(&path).await?);
            }

            let answer = orchestrator.answer(&query, &api_key).await?;
            let verification = if verify {
                Some(
                    context
                        .verifier()?
                        .verify_response(&query, &answer.response, &answer.sources)
                        .await,
                )
            } else {
                None
            };

            match format {
                OutputFormat::Json => {
                    let output = AskOutput {
                        answer: &answer,
                        verification: verification.as_ref().map(VerificationApiResponse::from),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    println!("{}", answer.response);
                    println!();
                    println!(
                        "Model: {} | attempt {} | {} sources",
                        answer.metadata.model_used,
                        answer.metadata.attempt,
                        answer.metadata.relevant_docs_count
                    );
                    print_hits(&answer.sources);
                    if let Some(verification) = &verification {
                        print!("{}", render_report(verification));
                    }
                }
            }
            Ok(())
        }
        Commands::Status { format } => {
            let checkpoint = checkpoint_store(&config).inspect().await?;
            let paths = config.indexing.artifact_paths();
            let artifacts = if paths.exist() {
                let loaded = load_artifacts(&paths).await?;
                Some(ArtifactStatus {
                    total_vectors: loaded.corpus.len(),
                    embedding_dim: loaded.corpus.dimension(),
                    model_identity: loaded.model_identity,
                })
            } else {
                None
            };

            match format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        checkpoint_dir: &config.indexing.checkpoint_dir,
                        checkpoint: checkpoint.as_ref(),
                        artifacts: &paths,
                        artifact_status: artifacts.as_ref(),
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    println!("healthrag status");
                    println!("================");
                    println!("\nCheckpoint ({}):", config.indexing.checkpoint_dir.display());
                    match &checkpoint {
                        Some(state) => {
                            println!("  Processed chunks: {}", state.processed_count);
                            println!("  Model: {} ({} dimensions)", state.model_identity, state.embedding_dim);
                            println!("  Batch size: {}", state.batch_size);
                            println!("  Saved at: {}", state.timestamp);
                        }
                        None => println!("  None"),
                    }
                    println!("\nIndex artifacts:");
                    println!("  Index: {}", paths.index_path.display());
                    println!("  Metadata: {}", paths.metadata_path.display());
                    match &artifacts {
                        Some(status) => {
                            println!("  Vectors: {}", status.total_vectors);
                            println!("  Dimensions: {}", status.embedding_dim);
                            println!(
                                "  Model: {}",
                                status.model_identity.as_deref().unwrap_or("unrecorded")
                            );
                        }
                        None => println!("  Not built"),
                    }
                }
            }
            Ok(())
        }
        Commands::ClearCheckpoint => {
            checkpoint_store(&config).clear().await?;
            println!(
                "Cleared checkpoint in {}",
                config.indexing.checkpoint_dir.display()
            );
            Ok(())
        }
    }
}

/// Exit status after a second Ctrl-C (128 + SIGINT).
const FORCED_EXIT_CODE: i32 = 130;

/// The first signal asks the pipeline to stop after the current batch. A
/// second one returns the status to exit with immediately; the last
/// committed checkpoint stays loadable.
async fn watch_interrupts<F, Fut>(mut signal: F, interrupt: InterruptHandle) -> Option<i32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    signal().await.ok()?;
    eprintln!("Interrupt received; stopping after the current batch (Ctrl-C again to exit now)...");
    interrupt.request();
    signal().await.ok()?;
    eprintln!("Second interrupt received; exiting without finishing the batch.");
    Some(FORCED_EXIT_CODE)
}

/// Opened without loading an embedding model.
fn checkpoint_store(config: &RetrieverConfig) -> CheckpointStore {
    CheckpointStore::new(&config.indexing.checkpoint_dir)
}

#[derive(Serialize)]
struct ArtifactStatus {
    total_vectors: usize,
    embedding_dim: usize,
    model_identity: Option<String>,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    checkpoint_dir: &'a std::path::Path,
    checkpoint: Option<&'a CheckpointState>,
    artifacts: &'a ArtifactPaths,
    artifact_status: Option<&'a ArtifactStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let interrupt = InterruptHandle::new();
        let code = watch_interrupts(|| async { Ok::<_, std::io::Error>(()) }, interrupt.clone()).await;
        assert_eq!(code, Some(FORCED_EXIT_CODE));
        assert!(interrupt.is_requested());
    }

    #[tokio::test]
    async fn test_first_interrupt_only_requests_stop() {
        let interrupt = InterruptHandle::new();
        let signals = AtomicUsize::new(0);
        let code = watch_interrupts(
            || {
                let n = signals.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(())
                    } else {
                        Err(std::io::Error::other("signal listener closed"))
                    }
                }
            },
            interrupt.clone(),
        )
        .await;
        assert_eq!(code, None);
        assert!(interrupt.is_requested());
        assert_eq!(signals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_signal_leaves_pipeline_running() {
        let interrupt = InterruptHandle::new();
        let code = watch_interrupts(
            || async { Err::<(), _>(std::io::Error::other("no signal support")) },
            interrupt.clone(),
        )
        .await;
        assert_eq!(code, None);
        assert!(!interrupt.is_requested());
    }
}
