mod display;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use docintake::db::{Database, DocumentFilter, DocumentStore};
use docintake::pipeline::DocumentEvent;
use docintake::{
    load_config_or_default, Document, IntakeConfig, IntakeService, ProcessingStatus,
    RejectedFile, ReviewService, Workflow,
};

#[derive(Parser)]
#[command(
    name = "docintake",
    version,
    about = "Extract, annotate and score uploaded forms; review low-confidence results"
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "DOCINTAKE_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database connection string (overrides db_connection_string)
    #[arg(long, global = true, env = "DOCINTAKE_DB", value_name = "CONN")]
    db: Option<String>,

    /// Document-analysis endpoint (overrides extraction_endpoint)
    #[arg(long, global = true, env = "DOCINTAKE_EXTRACTION_ENDPOINT", value_name = "URL")]
    endpoint: Option<String>,

    /// Environment variable holding the extraction key (overrides extraction_key_env)
    #[arg(long, global = true, value_name = "VAR")]
    key_env: Option<String>,

    /// Annotation model name or path to a pattern model file
    #[arg(long, global = true, value_name = "NAME")]
    model: Option<String>,

    /// Review threshold for overall confidence
    #[arg(long, global = true, value_name = "0..1")]
    threshold: Option<f64>,

    /// Worker threads for batch processing
    #[arg(long, global = true, value_name = "N")]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a file, or every supported file in a directory, as pending
    Ingest {
        path: PathBuf,
        /// Batch id (generated for directories when omitted)
        #[arg(long)]
        batch: Option<String>,
    },
    /// Register a directory and process it as one batch, or process the
    /// pending documents of an existing batch
    ProcessBatch {
        dir: Option<PathBuf>,
        #[arg(long)]
        batch: Option<String>,
        /// Print stage events while processing
        #[arg(long)]
        progress: bool,
    },
    /// Process one pending document
    Process {
        id: String,
        #[arg(long)]
        progress: bool,
    },
    /// Reset a finished document to pending and process it again
    Reprocess {
        id: String,
        #[arg(long)]
        progress: bool,
    },
    /// Fail documents left mid-pipeline by a crash so they can be re-processed
    Recover {
        /// Only documents unchanged for this many seconds (default: twice the request timeout)
        #[arg(long, value_name = "SECS")]
        older_than: Option<u64>,
    },
    /// List documents
    List {
        #[arg(long)]
        status: Option<ProcessingStatus>,
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Human review of flagged documents
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Documents awaiting review
    List {
        #[arg(long)]
        json: bool,
    },
    /// Document, current fields and last log entry
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Accept the document, optionally correcting fields
    Approve {
        id: String,
        /// Correction as name=value (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_correction)]
        corrections: Vec<(String, String)>,
    },
    /// Reject the document
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
    /// Delete the document with its fields and logs
    Delete { id: String },
}

fn parse_correction(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    // Persistence and worker code log through the `log` facade.
    tracing_log::LogTracer::init().context("failed to bridge log records")?;

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let db = open_database(&config)?;
    let store: Arc<dyn DocumentStore> = db;

    match cli.command {
        Commands::Ingest { path, batch } => {
            let intake = IntakeService::new(Arc::clone(&store), config.extraction_limits());
            if path.is_dir() {
                let registered = intake.register_directory(&path, batch.as_deref())?;
                println!("batch {}", registered.batch_id);
                display::print_documents(&registered.documents);
                display::print_rejected(&registered.rejected);
                if !registered.is_complete() {
                    std::process::exit(1);
                }
            } else {
                let document = intake.register_file(&path, batch.as_deref())?;
                display::print_documents(&[document]);
            }
        }
        Commands::ProcessBatch {
            dir,
            batch,
            progress,
        } => {
            let (documents, rejected) = batch_documents(&config, &store, dir.as_deref(), batch)?;
            let (workflow, events) = build_workflow(&config, &store, progress)?;
            let report = Arc::new(workflow).process_batch(documents);
            finish_events(events);

            display::print_batch_report(&report);
            display::print_rejected(&rejected);
            if !report.success() || !rejected.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Process { id, progress } => {
            let document = store
                .get_document(&id)?
                .with_context(|| format!("document {} not found", id))?;
            let (workflow, events) = build_workflow(&config, &store, progress)?;
            let result = workflow.process_with_retry(&document);
            drop(workflow);
            finish_events(events);

            display::print_result(&document.id, &result);
            if !result.success() {
                std::process::exit(1);
            }
        }
        Commands::Reprocess { id, progress } => {
            let (workflow, events) = build_workflow(&config, &store, progress)?;
            let result = workflow.reprocess_document(&id);
            drop(workflow);
            finish_events(events);

            display::print_result(&id, &result);
            if !result.success() {
                std::process::exit(1);
            }
        }
        Commands::Recover { older_than } => {
            let age = older_than.unwrap_or(config.request_timeout.saturating_mul(2));
            let (workflow, _) = build_workflow(&config, &store, false)?;
            let recovered = workflow.recover_stale(Duration::from_secs(age))?;
            display::print_documents(&recovered);
        }
        Commands::List {
            status,
            batch,
            limit,
            json,
        } => {
            let filter = DocumentFilter {
                status,
                batch_id: batch,
                limit,
                offset: None,
            };
            let documents = store.list_documents(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                display::print_documents(&documents);
            }
        }
        Commands::Review { command } => run_review(ReviewService::new(store), command)?,
    }

    Ok(())
}

fn run_review(review: ReviewService, command: ReviewCommands) -> anyhow::Result<()> {
    match command {
        ReviewCommands::List { json } => {
            let documents = review.pending()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                display::print_documents(&documents);
            }
        }
        ReviewCommands::Show { id, json } => {
            let detail = review.detail(&id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                display::print_detail(&detail);
            }
        }
        ReviewCommands::Approve { id, corrections } => {
            let corrections: BTreeMap<String, String> = corrections.into_iter().collect();
            let document = review.approve(&id, &corrections)?;
            println!("{} is {}", document.id, document.status);
        }
        ReviewCommands::Reject { id, reason } => {
            let document = review.reject(&id, &reason)?;
            println!("{} is {}", document.id, document.status);
        }
        ReviewCommands::Delete { id } => {
            review.delete(&id)?;
            println!("deleted {}", id);
        }
    }
    Ok(())
}

/// File configuration with command-line overrides applied and re-validated.
fn resolve_config(cli: &Cli) -> anyhow::Result<IntakeConfig> {
    let mut config = load_config_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(ref db) = cli.db {
        config.db_connection_string = Some(db.clone());
    }
    if let Some(ref endpoint) = cli.endpoint {
        config.extraction_endpoint = Some(endpoint.clone());
    }
    if let Some(ref var) = cli.key_env {
        config.extraction_key_env = Some(var.clone());
    }
    if let Some(ref model) = cli.model {
        config.nlp_model_name = model.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.confidence_threshold = threshold;
    }
    if let Some(concurrency) = cli.concurrency {
        config.max_batch_concurrency = concurrency;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_database(config: &IntakeConfig) -> anyhow::Result<Arc<Database>> {
    let connection = config.database_connection()?;
    let db = Database::connect(&connection)
        .with_context(|| format!("failed to open database '{}'", connection))?;
    Ok(Arc::new(db))
}

/// Documents to process, plus the files of `dir` that could not be registered.
fn batch_documents(
    config: &IntakeConfig,
    store: &Arc<dyn DocumentStore>,
    dir: Option<&Path>,
    batch: Option<String>,
) -> anyhow::Result<(Vec<Document>, Vec<RejectedFile>)> {
    match (dir, batch) {
        (Some(dir), batch) => {
            let intake = IntakeService::new(Arc::clone(store), config.extraction_limits());
            let registered = intake.register_directory(dir, batch.as_deref())?;
            println!("batch {}", registered.batch_id);
            Ok((registered.documents, registered.rejected))
        }
        (None, Some(batch_id)) => {
            let filter = DocumentFilter {
                status: Some(ProcessingStatus::Pending),
                batch_id: Some(batch_id),
                limit: None,
                offset: None,
            };
            Ok((store.list_documents(&filter)?, Vec::new()))
        }
        (None, None) => bail!("give a directory to ingest or --batch <ID>"),
    }
}

type EventPrinter = Option<thread::JoinHandle<()>>;

fn build_workflow(
    config: &IntakeConfig,
    store: &Arc<dyn DocumentStore>,
    progress: bool,
) -> anyhow::Result<(Workflow, EventPrinter)> {
    let workflow = Workflow::from_config(config, Arc::clone(store))
        .context("failed to set up the processing workflow")?;

    if !progress {
        return Ok((workflow, None));
    }

    let (sender, receiver) = broadcast::channel::<DocumentEvent>(256);
    let printer = thread::Builder::new()
        .name("docintake-progress".to_string())
        .spawn(move || display::print_events(receiver))
        .context("failed to start progress printer")?;

    Ok((workflow.with_progress_sender(Arc::new(sender)), Some(printer)))
}

/// Waits for the printer to drain once every sender is gone.
fn finish_events(printer: EventPrinter) {
    if let Some(handle) = printer {
        if handle.join().is_err() {
            tracing::warn!("progress printer panicked");
        }
    }
}
