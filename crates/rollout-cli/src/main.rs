//! Rollout - deployment orchestration
//!
//! Usage:
//!   rollout init                 # Write a starter rollout.toml
//!   rollout plan                 # Show the operation graph
//!   rollout profiles             # Show resolved profiles
//!   rollout run deployStage      # Execute nodes and their dependencies

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollout_core::config::{CONFIG_FILE_NAME, ConfigStore, RolloutConfig};
use rollout_core::context::AppContext;
use rollout_core::executor::ActionExecutor;
use rollout_core::graph::{Scheduler, SequentialScheduler};
use rollout_core::plan::DeploymentPlan;
use rollout_core::process::SystemProcessRunner;

#[derive(Parser)]
#[command(name = "rollout")]
#[command(about = "Build, push and deploy services from deployment profiles", long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file
    Init {
        /// Service to declare; defaults to the project directory name
        #[arg(long)]
        service: Option<String>,
    },

    /// Show the operation graph
    Plan {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show resolved and validated profiles
    Profiles,

    /// Execute nodes together with everything they depend on
    Run {
        /// Node names, e.g. `deployStage` or `pushStagingApi`
        #[arg(required = true)]
        nodes: Vec<String>,

        /// Override the state directory
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollout=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let store = ConfigStore::from_path(cli.config);

    match cli.command {
        Commands::Init { service } => run_init(&store, service),
        Commands::Plan { format } => run_plan(&store, format),
        Commands::Profiles => run_profiles(&store),
        Commands::Run { nodes, state_dir } => run_nodes(&store, nodes, state_dir),
    }
}

fn run_init(store: &ConfigStore, service: Option<String>) -> Result<()> {
    let service = match service {
        Some(service) => service,
        None => std::fs::canonicalize(store.project_root())
            .ok()
            .and_then(|root| root.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "app".to_string()),
    };
    let config = RolloutConfig::starter(service);
    config
        .validate()
        .with_context(|| format!("Cannot declare service '{}'", config.services[0].name))?;
    store.create(&config)?;
    println!("✓ Created {}", store.config_path().display());
    Ok(())
}

fn load_plan(store: &ConfigStore) -> Result<DeploymentPlan> {
    let config = store.load()?;
    DeploymentPlan::build(&config)
        .with_context(|| format!("Invalid configuration in {}", store.config_path().display()))
}

fn run_plan(store: &ConfigStore, format: OutputFormat) -> Result<()> {
    let plan = load_plan(store)?;
    let summary = plan.summary()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Table => {
            println!("{:<40} {:<18} Depends on", "Node", "Kind");
            println!("{}", "-".repeat(80));
            for name in &summary.order {
                if let Some(node) = plan.graph().get(name) {
                    let predecessors: Vec<&str> =
                        node.predecessors().iter().map(String::as_str).collect();
                    println!(
                        "{:<40} {:<18} {}",
                        node.name(),
                        node.kind().to_string(),
                        predecessors.join(", ")
                    );
                }
            }
            println!();
            println!("{} node(s)", summary.nodes.len());
        }
    }
    Ok(())
}

fn run_profiles(store: &ConfigStore) -> Result<()> {
    let plan = load_plan(store)?;
    println!("{}", serde_json::to_string_pretty(plan.profiles())?);
    Ok(())
}

fn run_nodes(store: &ConfigStore, nodes: Vec<String>, state_dir: Option<PathBuf>) -> Result<()> {
    let config = store.load()?;
    let plan = DeploymentPlan::build(&config)
        .with_context(|| format!("Invalid configuration in {}", store.config_path().display()))?;

    let context = match state_dir {
        Some(dir) => AppContext::new(store, dir),
        None => AppContext::with_default_state(store)?,
    };
    let state = context.state_store();
    let runner = SystemProcessRunner;
    let executor = ActionExecutor::new(&runner, &state, context.layout(&config))
        .with_login_cache(config.login_cache());

    let report = SequentialScheduler.run(plan.graph(), &nodes, &executor)?;
    info!(executed = report.executed.len(), "run finished");
    for name in &report.executed {
        println!("✓ {}", name);
    }
    Ok(())
}
