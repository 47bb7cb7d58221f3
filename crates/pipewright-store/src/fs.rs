use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipewright_runtime::RunResult;
use tokio::fs;
use tracing::{debug, warn};

use crate::RunStore;
use crate::error::StoreError;
use crate::types::{RunSummary, sort_newest_first};

/// Filesystem-based run store.
///
/// Each run is one pretty-printed JSON document:
/// ```text
/// {root}/
/// └── release/
///     ├── 5f0c....json
///     └── 9a41....json
/// ```
pub struct FsRunStore {
  root: PathBuf,
}

impl FsRunStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Directory name for a workflow. Characters outside `[A-Za-z0-9._-]`
  /// become `-`.
  pub fn dir_name(workflow: &str) -> String {
    let name: String = workflow
      .chars()
      .map(|c| {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
          c
        } else {
          '-'
        }
      })
      .collect();
    match name.as_str() {
      "" | "." | ".." => "_".to_string(),
      _ => name,
    }
  }

  fn workflow_dir(&self, workflow: &str) -> PathBuf {
    self.root.join(Self::dir_name(workflow))
  }

  fn run_path(&self, workflow: &str, run_id: &str) -> Result<PathBuf, StoreError> {
    let valid = !run_id.is_empty()
      && run_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
    if !valid {
      return Err(StoreError::InvalidRunId {
        run_id: run_id.to_string(),
      });
    }
    Ok(self.workflow_dir(workflow).join(format!("{}.json", run_id)))
  }

  async fn read(path: &Path) -> Result<RunResult, StoreError> {
    let content = fs::read_to_string(path).await.map_err(|source| StoreError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| StoreError::Serialization {
      path: path.to_path_buf(),
      source,
    })
  }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
  move |source| StoreError::Io {
    path: path.to_path_buf(),
    source,
  }
}

#[async_trait]
impl RunStore for FsRunStore {
  async fn save(&self, run: &RunResult) -> Result<(), StoreError> {
    let path = self.run_path(&run.workflow, &run.run_id)?;
    let dir = self.workflow_dir(&run.workflow);
    fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;

    let content = serde_json::to_vec_pretty(run).map_err(|source| StoreError::Serialization {
      path: path.clone(),
      source,
    })?;

    // Write then rename so readers never see a partial record
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, content).await.map_err(io_error(&staging))?;
    fs::rename(&staging, &path).await.map_err(io_error(&path))?;

    debug!(path = %path.display(), run_id = %run.run_id, "run_saved");
    Ok(())
  }

  async fn get(&self, workflow: &str, run_id: &str) -> Result<RunResult, StoreError> {
    let path = self.run_path(workflow, run_id)?;
    if !fs::try_exists(&path).await.map_err(io_error(&path))? {
      return Err(StoreError::NotFound {
        workflow: workflow.to_string(),
        run_id: run_id.to_string(),
      });
    }
    Self::read(&path).await
  }

  async fn list(&self, workflow: &str) -> Result<Vec<RunSummary>, StoreError> {
    let dir = self.workflow_dir(workflow);
    let mut entries = match fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(io_error(&dir)(e)),
    };

    let mut summaries = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      match Self::read(&path).await {
        Ok(run) => summaries.push(RunSummary::from(&run)),
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable run record"),
      }
    }

    sort_newest_first(&mut summaries);
    Ok(summaries)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone, Utc};
  use indexmap::IndexMap;
  use pipewright_runtime::{
    FailureKind, FailureReport, JobResult, RunStatus, Status, StepResult,
  };

  fn step(index: usize, status: Status, error: Option<FailureReport>) -> StepResult {
    StepResult {
      index,
      id: Some(format!("s{}", index)),
      name: format!("step {}", index),
      status,
      continue_on_error: false,
      outputs: IndexMap::from([("artifact".to_string(), "dist/app.tgz".to_string())]),
      log: "built".to_string(),
      attempts: 1,
      duration_ms: 12,
      error,
      steps: Vec::new(),
    }
  }

  fn run(run_id: &str, minutes: i64) -> RunResult {
    let started_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
    let error = FailureReport::new(FailureKind::StepExecutionFailure, "build/1", "command exited with code 2");
    let build = JobResult {
      job_id: "build".to_string(),
      name: "build".to_string(),
      status: Status::Failure,
      required: true,
      environment: Some("staging".to_string()),
      outputs: IndexMap::new(),
      duration_ms: 30,
      steps: vec![
        step(0, Status::Success, None),
        step(1, Status::Failure, Some(error.clone())),
      ],
      jobs: IndexMap::new(),
      error: None,
      skip_reason: None,
    };
    RunResult {
      run_id: run_id.to_string(),
      workflow: "release pipeline".to_string(),
      event: "push".to_string(),
      environment: Some("staging".to_string()),
      status: RunStatus::Failure,
      started_at,
      finished_at: started_at + Duration::seconds(1),
      duration_ms: 1000,
      outputs: IndexMap::new(),
      jobs: IndexMap::from([("build".to_string(), build)]),
      errors: vec![error],
    }
  }

  #[test]
  fn test_dir_name() {
    assert_eq!(FsRunStore::dir_name("release pipeline"), "release-pipeline");
    assert_eq!(FsRunStore::dir_name("ci/main"), "ci-main");
    assert_eq!(FsRunStore::dir_name(".."), "_");
  }

  #[tokio::test]
  async fn test_save_and_get_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let store = FsRunStore::new(root.path());
    let original = run("run-1", 0);

    store.save(&original).await.unwrap();
    assert!(root.path().join("release-pipeline/run-1.json").is_file());

    let loaded = store.get("release pipeline", "run-1").await.unwrap();
    assert_eq!(loaded, original);
    let failed = loaded.jobs["build"].step(1).unwrap();
    assert_eq!(failed.status, Status::Failure);
    assert_eq!(failed.error.as_ref().unwrap().path, "build/1");
  }

  #[tokio::test]
  async fn test_list_newest_first() {
    let root = tempfile::tempdir().unwrap();
    let store = FsRunStore::new(root.path());
    store.save(&run("older", 0)).await.unwrap();
    store.save(&run("newer", 5)).await.unwrap();
    std::fs::write(root.path().join("release-pipeline/garbage.json"), "{").unwrap();

    let summaries = store.list("release pipeline").await.unwrap();
    let ids: Vec<&str> = summaries.iter().map(|s| s.run_id.as_str()).collect();
    assert_eq!(ids, vec!["newer", "older"]);
    assert_eq!(summaries[0].error_count, 1);
    assert!(store.list("unknown").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_missing_and_invalid_runs() {
    let root = tempfile::tempdir().unwrap();
    let store = FsRunStore::new(root.path());
    assert!(matches!(
      store.get("release pipeline", "nope").await,
      Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
      store.get("release pipeline", "../escape").await,
      Err(StoreError::InvalidRunId { .. })
    ));
  }

  #[tokio::test]
  async fn test_memory_store() {
    let store = crate::MemoryRunStore::new();
    store.save(&run("a", 0)).await.unwrap();
    store.save(&run("b", 1)).await.unwrap();
    assert_eq!(store.get("release pipeline", "a").await.unwrap().run_id, "a");
    let ids: Vec<String> = store
      .list("release pipeline")
      .await
      .unwrap()
      .into_iter()
      .map(|s| s.run_id)
      .collect();
    assert_eq!(ids, vec!["b", "a"]);
  }
}
