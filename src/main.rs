use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use queuectl::config::QueueConfig;
use queuectl::error::QueueError;
use queuectl::queue::{Job, JobRegistry, JobSpec, JobState, StatusSummary};
use queuectl::shutdown::install_shutdown_handler;
use queuectl::store::JsonStore;
use queuectl::worker::WorkerPool;

#[derive(Parser, Debug)]
#[command(name = "queuectl")]
#[command(version)]
#[command(about = "A background job queue with retries, backoff, and a dead letter queue")]
#[command(propagate_version = true)]
struct Args {
    /// Directory holding the queue's persisted state
    #[arg(long, global = true, default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Add a new job to the queue
    ///
    /// Example: queuectl enqueue '{"id":"job1","command":"echo hello"}'
    Enqueue {
        /// Job specification: {"id"?, "command", "max_retries"?}
        job_json: String,
    },

    /// Show aggregate queue status and configuration
    Status {
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// List jobs, optionally filtered by state
    List {
        /// Filter by state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<String>,

        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Manage configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage the dead letter queue
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },

    /// Manage worker processes
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value (keys: max-retries, backoff-base, worker-count)
    Set { key: String, value: String },
}

#[derive(clap::Subcommand, Debug)]
enum DlqCommands {
    /// Show all jobs in the dead letter queue
    List {
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
    /// Move a job from the DLQ back to the queue with a fresh retry budget
    Retry { job_id: String },
    /// Remove all jobs from the DLQ (irreversible)
    Clear,
}

#[derive(clap::Subcommand, Debug)]
enum WorkerCommands {
    /// Start worker task(s) to execute jobs; blocks until interrupted
    Start {
        /// Number of workers (defaults to the configured worker_count)
        #[arg(long)]
        count: Option<u32>,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct StatusOutput {
    pending: usize,
    processing: usize,
    completed: usize,
    failed: usize,
    dead_letter_queue: usize,
    config: QueueConfig,
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn handle_enqueue(
    registry: &JobRegistry,
    job_json: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = JobSpec::parse(job_json)?;
    let job = registry.enqueue(spec).await?;
    println!("Job '{}' added to queue", job.id);
    println!("  Command: {}", job.command);
    println!("  State:   {}", job.state);
    Ok(())
}

async fn handle_status(
    registry: &JobRegistry,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary: StatusSummary = registry.status().await?;

    match output {
        OutputFormat::Json => {
            let out = StatusOutput {
                pending: summary.pending,
                processing: summary.processing,
                completed: summary.completed,
                failed: summary.failed,
                dead_letter_queue: summary.dead,
                config: summary.config,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("Queue Status");
            println!("{}", "=".repeat(30));
            println!("Pending:       {}", summary.pending);
            println!("Processing:    {}", summary.processing);
            println!("Completed:     {}", summary.completed);
            println!("Failed:        {}", summary.failed);
            println!("Dead letters:  {}", summary.dead);
            println!();
            println!("Config");
            println!("{}", "-".repeat(30));
            println!("max-retries:   {}", summary.config.max_retries);
            println!("backoff-base:  {}", summary.config.backoff_base);
            println!("worker-count:  {}", summary.config.worker_count);
        }
    }
    Ok(())
}

async fn handle_list(
    registry: &JobRegistry,
    state: Option<String>,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = state.as_deref().map(str::parse::<JobState>).transpose()?;
    let jobs = registry.list(filter).await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
        OutputFormat::Table => print_job_table(&jobs),
    }
    Ok(())
}

async fn handle_dlq_list(
    registry: &JobRegistry,
    output: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = registry.dlq_jobs().await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&jobs)?),
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("Dead letter queue is empty.");
            } else {
                print_job_table(&jobs);
            }
        }
    }
    Ok(())
}

fn print_job_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs found.");
        return;
    }

    println!(
        "{:<38} {:<12} {:<10} {:<21} COMMAND",
        "ID", "STATE", "ATTEMPTS", "CREATED"
    );
    println!("{}", "-".repeat(100));
    for job in jobs {
        let attempts = format!("{}/{}", job.attempts, job.max_retries);
        // Truncate long commands to keep rows readable
        let command = if job.command.len() > 30 {
            format!("{}...", &job.command[..27])
        } else {
            job.command.clone()
        };
        println!(
            "{:<38} {:<12} {:<10} {:<21} {}",
            job.id,
            job.state.to_string(),
            attempts,
            job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            command
        );
    }
    println!();
    println!("{} job(s)", jobs.len());
}

async fn run_workers(
    registry: Arc<JobRegistry>,
    count: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let count = match count {
        Some(0) => {
            return Err(QueueError::InvalidInput("worker count must be at least 1".to_string()).into())
        }
        Some(count) => count,
        None => registry.config().await?.worker_count,
    };

    let shutdown = install_shutdown_handler();
    let pool = WorkerPool::new(registry);
    pool.run(count, shutdown).await;
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Only the long-running worker command emits logs; one-shot commands
    // print their results directly.
    if matches!(args.command, Commands::Worker { .. }) {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let store = JsonStore::open(&args.data_dir)?;
    let registry = Arc::new(JobRegistry::open(store)?);

    match args.command {
        Commands::Enqueue { job_json } => handle_enqueue(&registry, &job_json).await?,
        Commands::Status { output } => handle_status(&registry, &output).await?,
        Commands::List { state, output } => handle_list(&registry, state, &output).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = registry.config().await?;
                println!("max-retries:   {}", config.max_retries);
                println!("backoff-base:  {}", config.backoff_base);
                println!("worker-count:  {}", config.worker_count);
            }
            ConfigCommands::Set { key, value } => {
                registry.set_config(&key, &value).await?;
                println!("Config updated: {key} = {value}");
            }
        },
        Commands::Dlq { command } => match command {
            DlqCommands::List { output } => handle_dlq_list(&registry, &output).await?,
            DlqCommands::Retry { job_id } => {
                let job = registry.dlq_retry(&job_id).await?;
                println!("Job '{}' moved back to queue for retry", job.id);
            }
            DlqCommands::Clear => {
                let discarded = registry.dlq_clear().await?;
                println!("Dead letter queue cleared ({discarded} job(s) removed)");
            }
        },
        Commands::Worker { command } => match command {
            WorkerCommands::Start { count } => run_workers(registry, count).await?,
        },
    }

    Ok(())
}
