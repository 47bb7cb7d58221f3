//! Workflow runner with channel-based triggering.
//!
//! The `WorkflowRunner` owns an mpsc channel for receiving trigger events
//! and runs its workflow through the `Orchestrator` for each of them.

use std::sync::Arc;

use pipewright_config::WorkflowDef;
use pipewright_runtime::RunResult;
use pipewright_store::RunStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::RunError;
use crate::orchestrator::Orchestrator;
use crate::trigger::TriggerEvent;

/// A runner that executes a workflow in response to trigger events.
///
/// # Usage
///
/// ```ignore
/// let runner = WorkflowRunner::new(orchestrator, def).with_store(store);
///
/// // Get sender for external triggers (webhooks, schedulers, etc.)
/// let sender = runner.sender();
///
/// // Start the execution loop
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct WorkflowRunner {
  sender: mpsc::Sender<TriggerEvent>,
  receiver: mpsc::Receiver<TriggerEvent>,
  orchestrator: Arc<Orchestrator>,
  def: WorkflowDef,
  environment: Option<String>,
  store: Option<Arc<dyn RunStore>>,
}

impl WorkflowRunner {
  pub fn new(orchestrator: Arc<Orchestrator>, def: WorkflowDef) -> Self {
    Self::with_buffer_size(orchestrator, def, 100)
  }

  /// Create a new workflow runner with a custom buffer size.
  pub fn with_buffer_size(orchestrator: Arc<Orchestrator>, def: WorkflowDef, buffer_size: usize) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      orchestrator,
      def,
      environment: None,
      store: None,
    }
  }

  /// Environment selected for every run.
  pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
    self.environment = Some(environment.into());
    self
  }

  /// Persist every finished run.
  pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
    self.store = Some(store);
    self
  }

  /// Get a sender handle for triggering runs.
  pub fn sender(&self) -> mpsc::Sender<TriggerEvent> {
    self.sender.clone()
  }

  /// Queue a run for the given trigger.
  pub async fn run(&self, trigger: TriggerEvent) -> Result<(), RunError> {
    self
      .sender
      .send(trigger)
      .await
      .map_err(|_| RunError::ChannelClosed)
  }

  /// Start the execution loop.
  ///
  /// Blocks until the cancellation token is triggered. Runs are executed
  /// one at a time, in arrival order. A trigger that fails to start a run is
  /// logged and does not stop the loop.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), RunError> {
    info!(workflow = %self.def.name, "starting workflow runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(workflow = %self.def.name, "workflow runner cancelled");
          break;
        }
        trigger = self.receiver.recv() => {
          match trigger {
            Some(trigger) => {
              let exec_cancel = cancel.child_token();
              info!(
                workflow = %self.def.name,
                event = %trigger.event_type,
                "triggering workflow run"
              );
              match self.execute_once(trigger, exec_cancel).await {
                Ok(result) => info!(
                  workflow = %self.def.name,
                  run_id = %result.run_id,
                  status = ?result.status,
                  jobs_executed = result.jobs.len(),
                  "workflow run completed"
                ),
                Err(RunError::EventNotHandled { event, .. }) => info!(
                  workflow = %self.def.name,
                  event = %event,
                  "event not handled, ignoring"
                ),
                Err(e) => error!(
                  workflow = %self.def.name,
                  error = %e,
                  "workflow run failed to start"
                ),
              }
            }
            None => {
              info!(workflow = %self.def.name, "workflow runner channel closed");
              break;
            }
          }
        }
      }
    }

    Ok(())
  }

  /// Execute a single run without the loop, persisting it when a store is
  /// configured.
  pub async fn execute_once(
    &self,
    trigger: TriggerEvent,
    cancel: CancellationToken,
  ) -> Result<RunResult, RunError> {
    let result = self
      .orchestrator
      .run(self.def.clone(), trigger, self.environment.clone(), cancel)
      .await?;
    if let Some(store) = &self.store {
      store.save(&result).await?;
    }
    Ok(result)
  }

  pub fn workflow(&self) -> &WorkflowDef {
    &self.def
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pipewright_config::{Document, Format};
  use pipewright_registry::MemoryRegistry;
  use pipewright_runtime::{ProcessRunner, RunStatus, RuntimeConfig};
  use pipewright_secrets::MemoryVault;
  use pipewright_store::MemoryRunStore;
  use std::time::Duration;

  fn create_test_workflow() -> WorkflowDef {
    let yaml = "name: test-workflow\non: push\njobs:\n  check:\n    steps:\n      - run: \"true\"\n";
    Document::parse_workflow(yaml, Format::Yaml).unwrap()
  }

  fn create_test_orchestrator() -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
      Arc::new(MemoryRegistry::new()),
      Arc::new(MemoryVault::new()),
      Arc::new(ProcessRunner::new()),
      RuntimeConfig::default(),
    ))
  }

  #[tokio::test]
  async fn test_runner_creation() {
    let runner = WorkflowRunner::new(create_test_orchestrator(), create_test_workflow());
    assert_eq!(runner.workflow().name, "test-workflow");
  }

  #[tokio::test]
  async fn test_sender_cloning() {
    let runner = WorkflowRunner::new(create_test_orchestrator(), create_test_workflow());

    let sender1 = runner.sender();
    let sender2 = runner.sender();

    assert!(!sender1.is_closed());
    assert!(!sender2.is_closed());
  }

  #[tokio::test]
  async fn test_run_sends_to_channel() {
    let mut runner = WorkflowRunner::new(create_test_orchestrator(), create_test_workflow());

    runner
      .run(TriggerEvent::new("push", "refs/heads/main"))
      .await
      .unwrap();

    let received = runner.receiver.recv().await.unwrap();
    assert_eq!(received.event_type, "push");
    assert_eq!(received.ref_name(), "main");
  }

  #[tokio::test]
  async fn test_cancellation() {
    let runner = WorkflowRunner::new(create_test_orchestrator(), create_test_workflow());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let handle = tokio::spawn(async move { runner.start(cancel_clone).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let result = handle.await.unwrap();
    assert!(result.is_ok());
  }

  #[tokio::test]
  async fn test_triggered_runs_are_stored() {
    let store = Arc::new(MemoryRunStore::new());
    let runner = WorkflowRunner::new(create_test_orchestrator(), create_test_workflow())
      .with_store(store.clone());
    let sender = runner.sender();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.start(cancel.clone()));

    // Ignored: the workflow only handles push
    sender
      .send(TriggerEvent::new("schedule", "refs/heads/main"))
      .await
      .unwrap();
    sender
      .send(TriggerEvent::new("push", "refs/heads/main"))
      .await
      .unwrap();

    let mut stored = Vec::new();
    for _ in 0..200 {
      stored = store.list("test-workflow").await.unwrap();
      if !stored.is_empty() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event, "push");
    assert_eq!(stored[0].status, RunStatus::Success);
  }
}
