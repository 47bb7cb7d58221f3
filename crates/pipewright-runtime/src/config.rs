use pipewright_workflow::RetryPolicy;

/// Default shell for command steps. `-e` stops a script at the first
/// failing command.
pub const DEFAULT_SHELL: &str = "sh -e";

/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Maximum number of jobs of one workflow running at the same time.
  pub max_parallel_jobs: usize,
  /// Policy that workflow and step retry settings are layered over.
  pub default_retry: RetryPolicy,
  /// Maximum nesting of workflow and action calls.
  pub max_call_depth: usize,
  /// Shell used when a step does not set one. The command is appended after
  /// `-c`.
  pub shell: String,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      max_parallel_jobs: 4,
      default_retry: RetryPolicy::default(),
      max_call_depth: 10,
      shell: DEFAULT_SHELL.to_string(),
    }
  }
}
