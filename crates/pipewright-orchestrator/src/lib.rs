//! Pipewright Orchestrator
//!
//! Turns a trigger event into a run: checks the workflow handles the event,
//! locks and composes it, binds the root inputs and secrets, drives the
//! runtime and produces the redacted [`RunResult`](pipewright_runtime::RunResult).
//!
//! The [`WorkflowRunner`] owns an mpsc channel for receiving trigger events
//! and runs one workflow for each of them until cancelled.

mod error;
mod orchestrator;
mod runner;
mod trigger;

pub use error::RunError;
pub use orchestrator::{Orchestrator, bind_root_inputs};
pub use runner::WorkflowRunner;
pub use trigger::TriggerEvent;
