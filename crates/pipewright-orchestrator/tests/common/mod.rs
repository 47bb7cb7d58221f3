#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipewright_config::{Document, Format, WorkflowDef};
use pipewright_orchestrator::Orchestrator;
use pipewright_registry::MemoryRegistry;
use pipewright_runtime::{CommandError, CommandOutput, CommandRequest, CommandRunner, RuntimeConfig};
use pipewright_secrets::MemoryVault;
use tokio_util::sync::CancellationToken;

/// Echoes each command back on stdout, so a command made of directives
/// sets outputs. Commands starting with `fail` exit with code 1.
#[derive(Default)]
pub struct EchoRunner {
  calls: Mutex<Vec<CommandRequest>>,
}

impl EchoRunner {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn commands(&self) -> Vec<String> {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .map(|c| c.command.clone())
      .collect()
  }

  pub fn calls(&self) -> Vec<CommandRequest> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl CommandRunner for EchoRunner {
  async fn run(
    &self,
    request: CommandRequest,
    _cancel: CancellationToken,
  ) -> Result<CommandOutput, CommandError> {
    self.calls.lock().unwrap().push(request.clone());
    let exit_code = if request.command.starts_with("fail") { 1 } else { 0 };
    Ok(CommandOutput {
      exit_code,
      stdout_tail: request.command,
      stderr_tail: String::new(),
    })
  }
}

pub fn workflow_def(yaml: &str) -> WorkflowDef {
  Document::parse_workflow(yaml, Format::Yaml).unwrap()
}

pub fn orchestrator(
  registry: MemoryRegistry,
  vault: MemoryVault,
  runner: Arc<EchoRunner>,
) -> Orchestrator {
  let config = RuntimeConfig {
    max_parallel_jobs: 8,
    ..RuntimeConfig::default()
  };
  Orchestrator::new(Arc::new(registry), Arc::new(vault), runner, config)
}
