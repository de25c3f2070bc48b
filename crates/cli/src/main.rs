//! `workflow-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the workflow server.
//! - `migrate`  — run pending database migrations.
//! - `validate` — check a workflow JSON file and print its execution order.
//! - `layout`   — print a workflow JSON file with computed positions.
//! - `run`      — run a workflow file against a server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use db::{InMemoryWorkflowRepository, PgWorkflowRepository, WorkflowRepository};
use engine::{ExecutorConfig, LayoutConfig, WorkflowExecutor, WorkflowSchema};
use nodes::http::{registry_from_specs, AgentSpec};
use nodes::AgentRegistry;
use store::{HttpTransport, WorkflowStore};

#[derive(Parser)]
#[command(
    name = "workflow-engine",
    about = "Workflow graph validation and execution server",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        #[arg(long, env = "WORKFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Postgres URL; workflows are kept in memory when absent.
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        /// JSON file listing `[{id, name, endpoint}]` agents.
        #[arg(long, env = "WORKFLOW_AGENTS")]
        agents: Option<PathBuf>,
        #[arg(long, env = "WORKFLOW_NODE_TIMEOUT_SECS", default_value_t = 120)]
        node_timeout_secs: u64,
        #[arg(long, env = "WORKFLOW_RUN_TIMEOUT_SECS", default_value_t = 600)]
        run_timeout_secs: u64,
        /// Require this bearer token on workflow routes.
        #[arg(long, env = "WORKFLOW_TOKEN")]
        token: Option<String>,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Print the workflow with automatically computed positions.
    Layout { path: PathBuf },
    /// Run a workflow file on a server and print each node's output.
    Run {
        path: PathBuf,
        #[arg(long, env = "WORKFLOW_SERVER", default_value = "http://localhost:8080")]
        server: String,
        #[arg(long, env = "WORKFLOW_TOKEN")]
        token: Option<String>,
        /// Initial input handed to the first node.
        #[arg(long, default_value = "")]
        input: String,
        /// Answer for a human-input node, as `nodeId=value`. Repeatable.
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<(String, String)>,
    },
}

fn parse_answer(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((id, value)) if !id.is_empty() => Ok((id.to_owned(), value.to_owned())),
        _ => Err(format!("expected nodeId=value, got '{raw}'")),
    }
}

fn read_schema(path: &Path) -> Result<WorkflowSchema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn load_agents(path: Option<&Path>) -> Result<AgentRegistry> {
    let Some(path) = path else {
        warn!("no agents file given; every agent-task will fail to resolve");
        return Ok(AgentRegistry::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read agents file {}", path.display()))?;
    let specs: Vec<AgentSpec> = serde_json::from_str(&content).context("invalid agents file")?;
    info!(agents = specs.len(), "agents loaded");
    Ok(registry_from_specs(specs))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            database_url,
            agents,
            node_timeout_secs,
            run_timeout_secs,
            token,
        } => {
            let repo: Arc<dyn WorkflowRepository> = match database_url {
                Some(url) => {
                    let pool = db::pool::create_pool(&url, 10)
                        .await
                        .context("failed to connect to database")?;
                    Arc::new(PgWorkflowRepository::new(pool))
                }
                None => {
                    info!("no DATABASE_URL; keeping workflows in memory");
                    Arc::new(InMemoryWorkflowRepository::new())
                }
            };
            let config = ExecutorConfig {
                node_timeout: Duration::from_secs(node_timeout_secs),
                run_timeout: Duration::from_secs(run_timeout_secs),
            };
            let executor = WorkflowExecutor::new(Arc::new(load_agents(agents.as_deref())?), config);

            let mut state = api::AppState::new(repo, executor);
            if let Some(token) = token {
                state = state.with_token(token);
            }
            api::serve(&bind, state).await.context("server failed")?;
        }
        Command::Migrate { database_url } => {
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied");
        }
        Command::Validate { path } => {
            let schema = read_schema(&path)?;
            let definition = engine::prepare_workflow(&schema.nodes, &schema.edges);
            if !definition.is_executable() {
                for error in &definition.errors {
                    eprintln!("❌ {}", error.describe());
                }
                std::process::exit(1);
            }
            let order = engine::execution_order(&schema.nodes, &schema.edges)?;
            println!("✅ Workflow is valid. Execution order: {order:?}");
        }
        Command::Layout { path } => {
            let mut schema = read_schema(&path)?;
            let laid_out = engine::layout(&schema.nodes, &schema.edges, &LayoutConfig::default());
            schema.nodes = laid_out.nodes;
            schema.edges = laid_out.edges;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Command::Run {
            path,
            server,
            token,
            input,
            answers,
        } => {
            let schema = read_schema(&path)?;
            let mut store = WorkflowStore::default();
            store.initialize_workflow(schema.nodes, schema.edges, Some(schema.name), schema.description);
            for (node_id, value) in answers {
                store
                    .update_node_user_input(&node_id, value)
                    .with_context(|| format!("cannot answer node '{node_id}'"))?;
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let transport = HttpTransport::new(&server, token);
            let outcome = store.start_execution(&transport, &input, &cancel).await;

            for node in store.nodes() {
                let state = &node.execution_state;
                match (&state.output, &state.error) {
                    (_, Some(error)) => println!("[{}] {}: {}", state.status, node.id, error.message),
                    (Some(output), None) => println!("[{}] {}: {}", state.status, node.id, output),
                    (None, None) => println!("[{}] {}", state.status, node.id),
                }
            }
            if !outcome.is_success() {
                bail!(outcome.message);
            }
            println!("✅ {}", outcome.message);
        }
    }

    Ok(())
}
