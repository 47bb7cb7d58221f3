use std::collections::HashMap;

use async_trait::async_trait;
use pipewright_runtime::RunResult;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{RunSummary, sort_newest_first};
use crate::RunStore;

/// In-memory run store, keyed by workflow then run id.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
  runs: RwLock<HashMap<String, HashMap<String, RunResult>>>,
}

impl MemoryRunStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RunStore for MemoryRunStore {
  async fn save(&self, run: &RunResult) -> Result<(), StoreError> {
    self
      .runs
      .write()
      .await
      .entry(run.workflow.clone())
      .or_default()
      .insert(run.run_id.clone(), run.clone());
    Ok(())
  }

  async fn get(&self, workflow: &str, run_id: &str) -> Result<RunResult, StoreError> {
    self
      .runs
      .read()
      .await
      .get(workflow)
      .and_then(|runs| runs.get(run_id))
      .cloned()
      .ok_or_else(|| StoreError::NotFound {
        workflow: workflow.to_string(),
        run_id: run_id.to_string(),
      })
  }

  async fn list(&self, workflow: &str) -> Result<Vec<RunSummary>, StoreError> {
    let runs = self.runs.read().await;
    let mut summaries: Vec<RunSummary> = runs
      .get(workflow)
      .map(|runs| runs.values().map(RunSummary::from).collect())
      .unwrap_or_default();
    sort_newest_first(&mut summaries);
    Ok(summaries)
  }
}
