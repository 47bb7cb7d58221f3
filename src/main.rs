use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pipewright_config::{Document, Format, WorkflowDef};
use pipewright_orchestrator::{Orchestrator, TriggerEvent};
use pipewright_registry::FsRegistry;
use pipewright_runtime::{ProcessRunner, RuntimeConfig};
use pipewright_secrets::{EnvVault, LayeredVault, MemoryVault};
use pipewright_store::{FsRunStore, RunStore};

/// Pipewright - a CI/CD pipeline engine with reusable workflows and
/// environment-scoped secrets
#[derive(Parser)]
#[command(name = "pipewright")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.pipewright)
  #[arg(long, global = true, env = "PIPEWRIGHT_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Root for `uses:` references (default: current directory)
  #[arg(long, global = true, env = "PIPEWRIGHT_REGISTRY_DIR")]
  registry_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow for one trigger event
  Run(RunArgs),

  /// Validate a workflow and everything it calls, without running it
  Validate {
    /// Path to the workflow file (JSON or YAML)
    workflow_file: PathBuf,
  },

  /// Inspect stored runs
  Runs {
    #[command(subcommand)]
    command: RunsCommand,
  },
}

#[derive(clap::Args)]
struct RunArgs {
  /// Path to the workflow file (JSON or YAML)
  workflow_file: PathBuf,

  /// Event type of the trigger
  #[arg(long, default_value = "push", env = "PIPEWRIGHT_EVENT")]
  event: String,

  /// Git ref of the trigger
  #[arg(long = "ref", default_value = "refs/heads/main", env = "PIPEWRIGHT_REF")]
  git_ref: String,

  /// Deployment environment selected for the run
  #[arg(long, env = "PIPEWRIGHT_ENVIRONMENT")]
  environment: Option<String>,

  /// Root input as `name=value`; may be repeated
  #[arg(long = "input", value_parser = parse_key_val)]
  inputs: Vec<(String, String)>,

  /// Event payload JSON file, `-` for stdin
  #[arg(long)]
  payload: Option<PathBuf>,

  /// Dotenv file with secret values
  #[arg(long, env = "PIPEWRIGHT_SECRETS_FILE")]
  secrets_file: Option<PathBuf>,

  /// Maximum number of jobs running at the same time
  #[arg(long, env = "PIPEWRIGHT_MAX_PARALLEL")]
  max_parallel: Option<usize>,

  /// Do not persist the run result
  #[arg(long)]
  no_store: bool,
}

#[derive(Subcommand)]
enum RunsCommand {
  /// List the stored runs of a workflow, newest first
  List { workflow: String },

  /// Print a stored run
  Show { workflow: String, run_id: String },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".pipewright"),
  };
  let registry_dir = cli.registry_dir.unwrap_or_else(|| PathBuf::from("."));

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Run(args)) => rt.block_on(run_workflow(args, data_dir, registry_dir)),
    Some(Commands::Validate { workflow_file }) => {
      rt.block_on(validate_workflow(workflow_file, registry_dir))?;
      Ok(ExitCode::SUCCESS)
    }
    Some(Commands::Runs { command }) => {
      rt.block_on(inspect_runs(command, data_dir))?;
      Ok(ExitCode::SUCCESS)
    }
    None => {
      println!("pipewright - use --help to see available commands");
      Ok(ExitCode::SUCCESS)
    }
  }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init();
}

async fn run_workflow(args: RunArgs, data_dir: PathBuf, registry_dir: PathBuf) -> Result<ExitCode> {
  let def = read_workflow(&args.workflow_file).await?;

  let mut payload = read_payload(args.payload.as_deref()).await?;
  merge_inputs(&mut payload, args.inputs)?;

  let mut config = RuntimeConfig::default();
  if let Some(max_parallel) = args.max_parallel {
    config.max_parallel_jobs = max_parallel.max(1);
  }

  let orchestrator = Orchestrator::new(
    Arc::new(FsRegistry::new(registry_dir)),
    Arc::new(build_vault(args.secrets_file.as_deref())?),
    Arc::new(ProcessRunner::new()),
    config,
  );

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling run");
      ctrl_c.cancel();
    }
  });

  let trigger = TriggerEvent::new(args.event, args.git_ref).with_payload(payload);
  let result = orchestrator
    .run(def, trigger, args.environment, cancel)
    .await
    .context("workflow run could not start")?;

  if !args.no_store {
    let store = FsRunStore::new(data_dir.join("runs"));
    store.save(&result).await.context("failed to store run result")?;
    info!(run_id = %result.run_id, dir = %store.root().display(), "run stored");
  }

  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(if result.is_success() {
    ExitCode::SUCCESS
  } else {
    ExitCode::FAILURE
  })
}

async fn validate_workflow(workflow_file: PathBuf, registry_dir: PathBuf) -> Result<()> {
  let def = read_workflow(&workflow_file).await?;
  let orchestrator = Orchestrator::new(
    Arc::new(FsRegistry::new(registry_dir)),
    Arc::new(MemoryVault::new()),
    Arc::new(ProcessRunner::new()),
    RuntimeConfig::default(),
  );

  let composition = orchestrator
    .validate(def)
    .await
    .context("workflow is invalid")?;

  let root = composition.root();
  let order = root.graph().topological_order()?;
  let references: Vec<String> = composition
    .references()
    .into_iter()
    .map(|r| r.to_string())
    .collect();

  println!(
    "{}",
    serde_json::to_string_pretty(&json!({
      "workflow": root.name,
      "jobs": order,
      "uses": references,
    }))?
  );
  Ok(())
}

async fn inspect_runs(command: RunsCommand, data_dir: PathBuf) -> Result<()> {
  let store = FsRunStore::new(data_dir.join("runs"));
  let output = match command {
    RunsCommand::List { workflow } => serde_json::to_value(store.list(&workflow).await?)?,
    RunsCommand::Show { workflow, run_id } => serde_json::to_value(store.get(&workflow, &run_id).await?)?,
  };
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn read_workflow(path: &Path) -> Result<WorkflowDef> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;

  let def = Document::parse_workflow(&content, Format::from_path(path))
    .with_context(|| format!("failed to parse workflow file: {}", path.display()))?;

  info!(workflow = %def.name, jobs = def.jobs.len(), "loaded workflow");
  Ok(def)
}

/// Secrets from the dotenv file take precedence over
/// `PIPEWRIGHT_SECRET_*` environment variables.
fn build_vault(secrets_file: Option<&Path>) -> Result<LayeredVault> {
  let mut vault = LayeredVault::new();
  if let Some(path) = secrets_file {
    let file_vault = MemoryVault::new()
      .load_dotenv(path)
      .with_context(|| format!("failed to load secrets file: {}", path.display()))?;
    vault = vault.with_layer(Arc::new(file_vault));
  }
  Ok(vault.with_layer(Arc::new(EnvVault::from_process())))
}

async fn read_payload(path: Option<&Path>) -> Result<Value> {
  let content = match path {
    None => return Ok(json!({})),
    Some(path) if path == Path::new("-") => {
      let mut input = String::new();
      io::stdin()
        .read_to_string(&mut input)
        .context("failed to read payload from stdin")?;
      input
    }
    Some(path) => tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read payload file: {}", path.display()))?,
  };

  if content.trim().is_empty() {
    return Ok(json!({}));
  }
  serde_json::from_str(&content).context("failed to parse payload JSON")
}

/// `--input` values override `payload.inputs`.
fn merge_inputs(payload: &mut Value, inputs: Vec<(String, String)>) -> Result<()> {
  if inputs.is_empty() {
    return Ok(());
  }
  let Value::Object(payload) = payload else {
    bail!("payload must be a JSON object");
  };
  let entry = payload
    .entry("inputs")
    .or_insert_with(|| Value::Object(Map::new()));
  let Value::Object(bound) = entry else {
    bail!("payload.inputs must be a JSON object");
  };
  for (name, value) in inputs {
    bound.insert(name, Value::String(value));
  }
  Ok(())
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
  match raw.split_once('=') {
    Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
    _ => Err(format!("expected name=value, got '{}'", raw)),
  }
}
