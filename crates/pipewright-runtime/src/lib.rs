//! Pipewright Runtime
//!
//! Executes a composed workflow:
//! - [`Composer`] resolves every `uses:` reference before anything runs
//! - the scheduler starts jobs as their `needs` finish, concurrently where
//!   the graph allows
//! - steps run sequentially, each with a fresh expression context and only
//!   the secrets it references
//! - commands are delegated to a [`CommandRunner`]
//!
//! Step and job failures never surface as Rust errors; they are recorded as
//! [`FailureReport`]s in the [`WorkflowOutcome`].

mod command;
mod composer;
mod config;
mod error;
mod events;
mod frame;
mod job;
mod result;
mod runtime;
mod scheduler;
mod step;

pub use command::{
  CommandOutput, CommandRequest, CommandRunner, Directives, ProcessRunner, TAIL_LINES,
  parse_directives,
};
pub use composer::{Composer, Composition};
pub use config::{DEFAULT_SHELL, RuntimeConfig};
pub use error::{BindingKind, CommandError, ComposeError, RuntimeError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use result::{
  FailureKind, FailureReport, JobResult, RunResult, RunStatus, Status, StepResult, WorkflowOutcome,
  collect_errors,
};
pub use runtime::{Invocation, Runtime};
