//! The command-execution boundary.
//!
//! Steps never spawn processes themselves. They hand a [`CommandRequest`]
//! to a [`CommandRunner`]; [`ProcessRunner`] is the local implementation.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CommandError;

/// Number of trailing lines kept from each output stream.
pub const TAIL_LINES: usize = 1000;

const SET_OUTPUT: &str = "::set-output name=";
const ADD_MASK: &str = "::add-mask::";

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
  /// The interpolated script.
  pub command: String,
  /// Shell program and leading arguments, e.g. `bash -e`.
  pub shell: String,
  /// Variables set on top of the runner's own environment.
  pub env: IndexMap<String, String>,
  pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
  pub exit_code: i32,
  pub stdout_tail: String,
  pub stderr_tail: String,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }
}

/// Executes step commands.
///
/// Implementations must stop the command promptly once `cancel` fires and
/// return [`CommandError::Cancelled`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
  async fn run(
    &self,
    request: CommandRequest,
    cancel: CancellationToken,
  ) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as local child processes via `<shell> -c <command>`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
  async fn run(
    &self,
    request: CommandRequest,
    cancel: CancellationToken,
  ) -> Result<CommandOutput, CommandError> {
    let mut words = request.shell.split_whitespace();
    let program = words.next().ok_or_else(|| CommandError::InvalidShell {
      shell: request.shell.clone(),
    })?;

    let mut command = Command::new(program);
    command
      .args(words)
      .arg("-c")
      .arg(&request.command)
      .envs(&request.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(dir) = &request.working_dir {
      command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| CommandError::Spawn {
      program: program.to_string(),
      source,
    })?;

    let stdout = child.stdout.take().map(|s| tokio::spawn(read_tail(s)));
    let stderr = child.stderr.take().map(|s| tokio::spawn(read_tail(s)));

    let status = tokio::select! {
      status = child.wait() => Some(status?),
      _ = cancel.cancelled() => None,
    };
    let Some(status) = status else {
      debug!(program = %program, "killing cancelled command");
      let _ = child.kill().await;
      return Err(CommandError::Cancelled);
    };

    Ok(CommandOutput {
      // Terminated by a signal
      exit_code: status.code().unwrap_or(-1),
      stdout_tail: join_tail(stdout).await?,
      stderr_tail: join_tail(stderr).await?,
    })
  }
}

async fn read_tail<R: AsyncRead + Unpin>(stream: R) -> std::io::Result<String> {
  let mut lines = BufReader::new(stream).lines();
  let mut tail = VecDeque::with_capacity(64);
  while let Some(line) = lines.next_line().await? {
    if tail.len() == TAIL_LINES {
      tail.pop_front();
    }
    tail.push_back(line);
  }
  Ok(Vec::from(tail).join("\n"))
}

async fn join_tail(
  handle: Option<tokio::task::JoinHandle<std::io::Result<String>>>,
) -> Result<String, CommandError> {
  match handle {
    Some(handle) => handle
      .await
      .map_err(|e| CommandError::Io(std::io::Error::other(e)))?
      .map_err(CommandError::from),
    None => Ok(String::new()),
  }
}

/// Workflow commands found in a step's stdout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directives {
  pub outputs: IndexMap<String, String>,
  pub masks: Vec<String>,
  /// Stdout with directive lines removed.
  pub log: String,
}

/// Extract `::set-output name=<k>::<v>` and `::add-mask::<v>` lines.
///
/// A later `set-output` for the same name wins.
pub fn parse_directives(stdout: &str) -> Directives {
  let mut directives = Directives::default();
  let mut log = Vec::new();

  for line in stdout.lines() {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix(SET_OUTPUT)
      && let Some((name, value)) = rest.split_once("::")
      && !name.is_empty()
    {
      directives
        .outputs
        .insert(name.to_string(), value.to_string());
      continue;
    }
    if let Some(value) = trimmed.strip_prefix(ADD_MASK) {
      directives.masks.push(value.to_string());
      continue;
    }
    log.push(line);
  }

  directives.log = log.join("\n");
  directives
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn request(command: &str) -> CommandRequest {
    CommandRequest {
      command: command.to_string(),
      shell: "sh -e".to_string(),
      env: IndexMap::new(),
      working_dir: None,
    }
  }

  #[test]
  fn test_parse_directives() {
    let stdout = "building\n::set-output name=version::1.2.3\n::add-mask::hunter2\n  ::set-output name=version::1.2.4\ndone";
    let directives = parse_directives(stdout);
    assert_eq!(directives.outputs.get("version").map(String::as_str), Some("1.2.4"));
    assert_eq!(directives.masks, vec!["hunter2".to_string()]);
    assert_eq!(directives.log, "building\ndone");
  }

  #[test]
  fn test_parse_directives_keeps_value_separators() {
    let directives = parse_directives("::set-output name=url::https://x.test::8080");
    assert_eq!(directives.outputs["url"], "https://x.test::8080");
  }

  #[test]
  fn test_malformed_directive_is_logged() {
    let directives = parse_directives("::set-output name=::x\n::set-output version");
    assert!(directives.outputs.is_empty());
    assert_eq!(directives.log, "::set-output name=::x\n::set-output version");
  }

  #[tokio::test]
  async fn test_process_runner_captures_output() {
    let mut req = request("echo \"hello $GREETING\"; echo oops >&2; exit 3");
    req.env.insert("GREETING".to_string(), "world".to_string());

    let output = ProcessRunner::new()
      .run(req, CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stdout_tail, "hello world");
    assert_eq!(output.stderr_tail, "oops");
    assert!(!output.success());
  }

  #[tokio::test]
  async fn test_process_runner_working_dir() {
    let dir = std::env::temp_dir();
    let mut req = request("pwd");
    req.working_dir = Some(dir.clone());
    let output = ProcessRunner::new()
      .run(req, CancellationToken::new())
      .await
      .unwrap();
    assert!(output.success());
    let reported = std::fs::canonicalize(output.stdout_tail.trim()).unwrap();
    assert_eq!(reported, std::fs::canonicalize(dir).unwrap());
  }

  #[tokio::test]
  async fn test_process_runner_cancellation() {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      cancel_clone.cancel();
    });

    let started = std::time::Instant::now();
    let result = ProcessRunner::new().run(request("sleep 10"), cancel).await;
    assert!(matches!(result, Err(CommandError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
  }

  #[tokio::test]
  async fn test_process_runner_invalid_shell() {
    let mut req = request("true");
    req.shell = "  ".to_string();
    let result = ProcessRunner::new().run(req, CancellationToken::new()).await;
    assert!(matches!(result, Err(CommandError::InvalidShell { .. })));
  }
}
