//! Pipewright Workflow
//!
//! This crate provides the "locked" workflow representation for pipewright.
//! A locked workflow is a validated form of a workflow definition that is
//! ready for execution.
//!
//! Key differences from `pipewright-config`:
//! - The `needs` graph is validated (no unknown jobs, no cycles)
//! - Every `${{ }}` expression has been parsed
//! - References to `inputs`, `secrets`, `needs`, `steps` and `jobs` point at
//!   declared names
//! - Each job is either a steps job or a call job, each step either a command
//!   or an action call

mod action;
mod error;
mod graph;
mod job;
mod references;
mod retry;
mod step;
mod workflow;

pub use action::Action;
pub use error::WorkflowError;
pub use graph::Graph;
pub use job::{Job, JobKind};
pub use retry::{MAX_RETRY_ATTEMPTS, MAX_RETRY_DELAY, RetryPolicy, RetrySettings};
pub use step::{CallBinding, Command, Step, StepAction};
pub use workflow::Workflow;
