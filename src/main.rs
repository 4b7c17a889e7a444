//! dirqueue - durable shell command queue
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dirqueue::{logging, ExecutorConfig, ExecutorConfigBuilder, QueueExecutor, QueueExecutorBuilder};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// File-system-backed command queue with a resizable worker pool
#[derive(Parser, Debug)]
#[command(
    name = "dirqueue",
    version,
    after_help = "EXAMPLES:\n    \
        dirqueue run --queue nightly --pool 4\n    \
        dirqueue enqueue --queue nightly 'python3 -m src.flow' 'make report'\n    \
        dirqueue resize --queue nightly --pool 8\n    \
        dirqueue status --queue nightly"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root holding the queues and logs directories
    #[arg(long, env = "DIRQUEUE_ROOT", value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log to stdout instead of a file under the logs directory
    #[arg(long, global = true)]
    log_stdout: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store the pool size and drain the queue until terminated
    Run {
        /// Name of the queue
        #[arg(short, long)]
        queue: String,

        /// Number of commands to run concurrently
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        pool: u32,
    },
    /// Append commands to a queue
    Enqueue {
        #[arg(short, long)]
        queue: String,

        /// Shell commands, one record each
        #[arg(required = true, value_name = "COMMAND")]
        commands: Vec<String>,
    },
    /// Change the pool size; a running dispatcher uses it from its next batch
    Resize {
        #[arg(short, long)]
        queue: String,

        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        pool: u32,
    },
    /// Show pending commands, pool size and the last dispatched batch
    Status {
        #[arg(short, long)]
        queue: String,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Only the long-running dispatcher logs to a file by default
    let mut log = config.log.clone();
    if !matches!(cli.command, Commands::Run { .. }) {
        log.stdout = true;
    }
    logging::init(&log, &config.log_path()).context("Failed to set up logging")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(execute(cli.command, config))
}

fn load_config(cli: &Cli) -> Result<ExecutorConfig> {
    let base = match &cli.config {
        Some(path) => ExecutorConfig::from_yaml_file(path)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?,
        None => ExecutorConfig::default(),
    };

    let mut builder = ExecutorConfigBuilder::from_config(base);
    if let Some(root) = &cli.root {
        builder = builder.root(root);
    }
    if cli.verbose {
        builder = builder.log_level("debug");
    }
    if cli.log_stdout {
        builder = builder.log_stdout(true);
    }
    builder.build().context("Invalid configuration")
}

async fn open(config: ExecutorConfig, queue: &str, pool: Option<u32>) -> Result<QueueExecutor> {
    let mut builder = QueueExecutorBuilder::new(queue).with_config(config);
    if let Some(pool) = pool {
        builder = builder.with_pool_size(pool as usize);
    }
    builder
        .build()
        .await
        .with_context(|| format!("Failed to open queue {}", queue))
}

async fn execute(command: Commands, config: ExecutorConfig) -> Result<()> {
    match command {
        Commands::Run { queue, pool } => {
            let executor = open(config, &queue, Some(pool)).await?;
            info!(queue = %queue, pool, "Dispatcher starting");
            executor.run().await.context("Dispatcher stopped")
        }
        Commands::Enqueue { queue, commands } => {
            let executor = open(config, &queue, None).await?;
            let indices = executor.enqueue(commands.as_slice()).await?;
            for (index, command) in indices.iter().zip(&commands) {
                println!("{}\t{}", index, command);
            }
            Ok(())
        }
        Commands::Resize { queue, pool } => {
            let executor = open(config, &queue, None).await?;
            executor.set_pool_size(pool as usize).await?;
            println!("Pool size of {} set to {}", queue, pool);
            Ok(())
        }
        Commands::Status { queue } => {
            let executor = open(config, &queue, None).await?;
            let status = executor.status().await?;

            println!("Queue:      {}", queue);
            println!("Directory:  {}", executor.layout().root().display());
            match status.pool_size {
                Some(size) => println!("Pool size:  {}", size),
                None => println!("Pool size:  not set"),
            }
            println!("Completed:  {}", status.completed);
            println!("Pending:    {}", status.pending.len());
            for index in &status.pending {
                let command = executor.queue().read(*index).await?.unwrap_or_default();
                println!("  {:>6}  {}", index, command);
            }
            if let Some(snapshot) = status.in_flight {
                println!("Last batch: {} commands", snapshot.len());
                for (index, command) in &snapshot.commands {
                    println!("  {:>6}  {}", index, command);
                }
            }
            Ok(())
        }
    }
}
