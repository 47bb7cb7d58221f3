//! Execution events and notifiers.
//!
//! Events are emitted while a run executes so consumers can follow progress,
//! persist partial state or stream it elsewhere. Paths use the same
//! `job/step` form as failure reports.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::{RunStatus, Status};

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  RunStarted {
    run_id: String,
    workflow: String,
  },

  JobStarted {
    run_id: String,
    job_path: String,
  },

  /// A job was not started: a dependency did not succeed, its condition was
  /// false, or the run was cancelled.
  JobSkipped {
    run_id: String,
    job_path: String,
    reason: String,
  },

  JobCompleted {
    run_id: String,
    job_path: String,
    status: Status,
  },

  StepStarted {
    run_id: String,
    step_path: String,
    name: String,
  },

  StepCompleted {
    run_id: String,
    step_path: String,
    status: Status,
    attempts: u32,
  },

  RunCompleted {
    run_id: String,
    status: RunStatus,
  },
}

/// Receives execution events.
///
/// `notify` is called inline from job tasks and must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded: notify never blocks a job task
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_notifier_forwards_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);
    notifier.notify(ExecutionEvent::RunStarted {
      run_id: "r1".to_string(),
      workflow: "ci".to_string(),
    });

    match rx.try_recv().unwrap() {
      ExecutionEvent::RunStarted { run_id, workflow } => {
        assert_eq!(run_id, "r1");
        assert_eq!(workflow, "ci");
      }
      other => panic!("unexpected event: {:?}", other),
    }
  }

  #[test]
  fn test_channel_notifier_ignores_dropped_receiver() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelNotifier::new(tx).notify(ExecutionEvent::RunCompleted {
      run_id: "r1".to_string(),
      status: RunStatus::Success,
    });
  }
}
