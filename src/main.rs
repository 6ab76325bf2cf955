//! BrowserPilot - browser automation workflows driven by an AI agent.
//!
//! Main entry point for the BrowserPilot CLI and scheduler daemon.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use browserpilot_config::{Config, ConfigLoader};
use browserpilot_engine::{
    next_run_time, FileWorkflowStore, SchedulerHooks, Workflow, WorkflowExecutor,
    WorkflowScheduler, WorkflowStore,
};
use browserpilot_protocols::AgentRunner;
use browserpilot_runner_process::ProcessAgentRunner;

/// BrowserPilot CLI.
#[derive(Parser)]
#[command(name = "browserpilot")]
#[command(about = "Browser automation workflows driven by an AI agent")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ~/.browserpilot/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler in foreground until interrupted
    Serve,

    /// List all workflows
    List,

    /// Show one workflow as JSON
    Show {
        /// Workflow ID
        id: String,
    },

    /// Create a new workflow
    Create {
        /// Workflow name
        name: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Delete a workflow
    Delete {
        /// Workflow ID
        id: String,
    },

    /// Duplicate a workflow under a new id
    Duplicate {
        /// Workflow ID
        id: String,
    },

    /// Enable a workflow
    Enable {
        /// Workflow ID
        id: String,
    },

    /// Disable a workflow
    Disable {
        /// Workflow ID
        id: String,
    },

    /// Export a workflow as JSON to stdout
    Export {
        /// Workflow ID
        id: String,
    },

    /// Import a workflow from an exported JSON file
    Import {
        /// Path to the exported file
        file: PathBuf,
    },

    /// Run a workflow immediately, bypassing the scheduler
    Run {
        /// Workflow ID
        id: String,
    },
}

/// Get the .browserpilot directory path.
fn browserpilot_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".browserpilot"))
        .unwrap_or_else(|| PathBuf::from(".browserpilot"))
}

/// Initialize tracing with console and rolling file output.
fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = PathBuf::from(ConfigLoader::expand_path(&config.logging.dir));
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("browserpilot")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer guard alive for the program duration.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Scheduler hooks running due workflows through the executor.
struct EngineHooks {
    runner: Arc<dyn AgentRunner>,
}

#[async_trait]
impl SchedulerHooks for EngineHooks {
    async fn run_workflow(&self, workflow: &Workflow) -> anyhow::Result<()> {
        let executor = WorkflowExecutor::new(workflow.clone(), self.runner.clone());
        let result = executor.execute().await;
        if result.success {
            Ok(())
        } else {
            // An unsuccessful run raises so the scheduler leaves next_run
            // untouched and retries on the following tick.
            Err(anyhow::anyhow!(result
                .error
                .unwrap_or_else(|| "workflow failed".to_string())))
        }
    }

    fn log(&self, message: &str) {
        info!("{}", message);
    }
}

fn build_runner(config: &Config) -> Arc<dyn AgentRunner> {
    Arc::new(
        ProcessAgentRunner::new(config.runner.command.clone(), config.runner.args.clone())
            .with_timeout(std::time::Duration::from_secs(config.runner.timeout_seconds)),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| browserpilot_dir().join("config.toml"));
    let config = ConfigLoader::load_or_default(&config_path)?;

    init_tracing(&config)?;

    let store: Arc<dyn WorkflowStore> =
        Arc::new(FileWorkflowStore::new(config.storage.dir_path()).await?);

    match cli.command {
        Commands::Serve => serve(store, &config).await?,
        Commands::List => list(store.as_ref()).await?,
        Commands::Show { id } => show(store.as_ref(), &id).await?,
        Commands::Create { name, description } => {
            let workflow = store.create(&name, &description).await?;
            println!("Created workflow {}", workflow.id);
        }
        Commands::Delete { id } => {
            if store.delete(&id).await? {
                println!("Deleted workflow {}", id);
            } else {
                println!("No workflow with id {}", id);
            }
        }
        Commands::Duplicate { id } => {
            let workflow = load_or_fail(store.as_ref(), &id).await?;
            let copy = store.duplicate(&workflow).await?;
            println!("Duplicated as {} ({})", copy.name, copy.id);
        }
        Commands::Enable { id } => set_enabled(store.as_ref(), &id, true).await?,
        Commands::Disable { id } => set_enabled(store.as_ref(), &id, false).await?,
        Commands::Export { id } => {
            let workflow = load_or_fail(store.as_ref(), &id).await?;
            println!("{}", store.export(&workflow)?);
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let workflow = store.import(&text).await?;
            println!("Imported workflow {} ({})", workflow.name, workflow.id);
        }
        Commands::Run { id } => run_now(store.as_ref(), &config, &id).await?,
    }

    Ok(())
}

/// Run the scheduler until ctrl-c.
async fn serve(store: Arc<dyn WorkflowStore>, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let runner = build_runner(config);
    let scheduler = Arc::new(WorkflowScheduler::new(store));
    let hooks: Arc<dyn SchedulerHooks> = Arc::new(EngineHooks { runner });

    scheduler.clone().start(hooks).await?;
    info!("BrowserPilot scheduler running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    scheduler.stop();
    info!("Shutting down");
    Ok(())
}

async fn list(store: &dyn WorkflowStore) -> Result<(), Box<dyn std::error::Error>> {
    let workflows = store.load_all().await?;
    if workflows.is_empty() {
        println!("No workflows");
        return Ok(());
    }
    for workflow in workflows {
        let state = if workflow.enabled { "enabled" } else { "disabled" };
        let next = next_run_time(&workflow)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<30} {:<8} next: {}",
            workflow.id, workflow.name, state, next
        );
    }
    Ok(())
}

async fn show(store: &dyn WorkflowStore, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let workflow = load_or_fail(store, id).await?;
    println!("{}", serde_json::to_string_pretty(&workflow)?);
    Ok(())
}

async fn set_enabled(
    store: &dyn WorkflowStore,
    id: &str,
    enabled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut workflow = load_or_fail(store, id).await?;
    workflow.enabled = enabled;
    store.save(&mut workflow).await?;
    println!(
        "Workflow {} {}",
        id,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Run one workflow immediately and print its result and log.
async fn run_now(
    store: &dyn WorkflowStore,
    config: &Config,
    id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let workflow = load_or_fail(store, id).await?;
    let runner = build_runner(config);

    let executor = WorkflowExecutor::new(workflow, runner);
    let result = executor.execute().await;

    for entry in &result.logs {
        println!("[{:?}] {}: {}", entry.kind, entry.step_name, entry.message);
    }
    if result.success {
        println!("Workflow succeeded ({} steps)", result.steps_executed);
    } else {
        println!(
            "Workflow failed after {} steps: {}",
            result.steps_executed,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn load_or_fail(
    store: &dyn WorkflowStore,
    id: &str,
) -> Result<Workflow, Box<dyn std::error::Error>> {
    store
        .load(id)
        .await?
        .ok_or_else(|| format!("no workflow with id {}", id).into())
}
