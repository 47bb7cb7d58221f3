#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pipewright_config::{Document, Format};
use pipewright_registry::MemoryRegistry;
use pipewright_runtime::{
  CommandError, CommandOutput, CommandRequest, CommandRunner, Composer, Composition, Invocation,
  Runtime, RuntimeConfig, WorkflowOutcome,
};
use pipewright_secrets::{MemoryVault, SecretError, SecretScope, SecretValue, SecretVault};
use pipewright_workflow::Workflow;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// What the scripted runner answers for one command.
#[derive(Debug, Clone, Default)]
pub struct Reply {
  pub exit_code: i32,
  pub stdout: String,
  pub delay: Option<Duration>,
}

pub fn ok(stdout: &str) -> Reply {
  Reply {
    stdout: stdout.to_string(),
    ..Reply::default()
  }
}

pub fn exit(code: i32) -> Reply {
  Reply {
    exit_code: code,
    ..Reply::default()
  }
}

pub fn slow(delay: Duration) -> Reply {
  Reply {
    delay: Some(delay),
    ..Reply::default()
  }
}

type Handler = Box<dyn Fn(&CommandRequest, usize) -> Reply + Send + Sync>;

/// Records every request and answers from a closure. The second argument
/// is how many times the same command ran before.
pub struct ScriptedRunner {
  handler: Handler,
  calls: Mutex<Vec<CommandRequest>>,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
}

impl ScriptedRunner {
  pub fn new(handler: impl Fn(&CommandRequest, usize) -> Reply + Send + Sync + 'static) -> Arc<Self> {
    Arc::new(Self {
      handler: Box::new(handler),
      calls: Mutex::new(Vec::new()),
      in_flight: AtomicUsize::new(0),
      max_in_flight: AtomicUsize::new(0),
    })
  }

  /// Every command succeeds with empty output.
  pub fn succeeding() -> Arc<Self> {
    Self::new(|_, _| ok(""))
  }

  pub fn calls(&self) -> Vec<CommandRequest> {
    self.calls.lock().unwrap().clone()
  }

  pub fn commands(&self) -> Vec<String> {
    self.calls().into_iter().map(|c| c.command).collect()
  }

  pub fn max_in_flight(&self) -> usize {
    self.max_in_flight.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
  async fn run(
    &self,
    request: CommandRequest,
    cancel: CancellationToken,
  ) -> Result<CommandOutput, CommandError> {
    let reply = {
      let mut calls = self.calls.lock().unwrap();
      let previous = calls.iter().filter(|c| c.command == request.command).count();
      calls.push(request.clone());
      (self.handler)(&request, previous)
    };

    let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_in_flight.fetch_max(current, Ordering::SeqCst);

    let cancelled = match reply.delay {
      Some(delay) => tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = cancel.cancelled() => true,
      },
      None => cancel.is_cancelled(),
    };
    self.in_flight.fetch_sub(1, Ordering::SeqCst);

    if cancelled {
      return Err(CommandError::Cancelled);
    }
    Ok(CommandOutput {
      exit_code: reply.exit_code,
      stdout_tail: reply.stdout,
      stderr_tail: String::new(),
    })
  }
}

/// A vault that records which secrets were looked up.
#[derive(Default)]
pub struct RecordingVault {
  inner: MemoryVault,
  lookups: Mutex<Vec<String>>,
}

impl RecordingVault {
  pub fn new(inner: MemoryVault) -> Arc<Self> {
    Arc::new(Self {
      inner,
      lookups: Mutex::new(Vec::new()),
    })
  }

  pub fn lookups(&self) -> Vec<String> {
    self.lookups.lock().unwrap().clone()
  }
}

#[async_trait]
impl SecretVault for RecordingVault {
  async fn resolve(&self, name: &str, scope: &SecretScope) -> Result<SecretValue, SecretError> {
    self.lookups.lock().unwrap().push(name.to_string());
    self.inner.resolve(name, scope).await
  }
}

pub fn lock(yaml: &str) -> Workflow {
  Workflow::lock(Document::parse_workflow(yaml, Format::Yaml).unwrap()).unwrap()
}

pub fn registry(entries: &[(&str, &str)]) -> MemoryRegistry {
  let mut registry = MemoryRegistry::new();
  for (reference, yaml) in entries {
    let callable = match Document::parse(yaml, Format::Yaml).unwrap() {
      Document::Workflow(def) => pipewright_registry::Callable::Workflow(def),
      Document::Action(def) => pipewright_registry::Callable::Action(def),
    };
    registry.insert(reference, callable);
  }
  registry
}

pub async fn compose(yaml: &str, registry: &MemoryRegistry) -> Composition {
  Composer::new(registry).compose(lock(yaml)).await.unwrap()
}

pub fn fast_config() -> RuntimeConfig {
  RuntimeConfig {
    max_parallel_jobs: 8,
    ..RuntimeConfig::default()
  }
}

pub fn runtime(
  composition: Composition,
  runner: Arc<ScriptedRunner>,
  vault: Arc<dyn SecretVault>,
) -> Runtime {
  Runtime::new(composition, runner, vault, fast_config()).with_run_id("run-1")
}

pub fn invocation() -> Invocation {
  Invocation {
    inputs: serde_json::Map::new(),
    github: json!({"event_name": "push", "ref": "refs/heads/main", "ref_name": "main"}),
    environment: None,
  }
}

/// Run a standalone workflow with the given runner and vault.
pub async fn run(
  yaml: &str,
  runner: Arc<ScriptedRunner>,
  vault: Arc<dyn SecretVault>,
) -> WorkflowOutcome {
  runtime(Composition::standalone(lock(yaml)), runner, vault)
    .execute(invocation(), CancellationToken::new())
    .await
    .unwrap()
}

pub fn empty_vault() -> Arc<dyn SecretVault> {
  Arc::new(MemoryVault::new())
}
