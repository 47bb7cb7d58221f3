//! Pipewright Store
//!
//! This crate provides the storage trait and implementations for finished
//! runs. A stored run is the redacted [`RunResult`] tree: job name, then
//! step index, then status, duration, outputs and error.
//!
//! The [`RunStore`] trait defines operations for:
//! - Saving a finished run
//! - Fetching a run by workflow and run id
//! - Listing the runs of a workflow

mod error;
mod fs;
mod memory;
mod types;

pub use error::StoreError;
pub use fs::FsRunStore;
pub use memory::MemoryRunStore;
pub use types::RunSummary;

use async_trait::async_trait;
use pipewright_runtime::RunResult;

/// Storage trait for run results.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Save a run, replacing any previous record with the same id.
  async fn save(&self, run: &RunResult) -> Result<(), StoreError>;

  /// Get a run by workflow name and run id.
  async fn get(&self, workflow: &str, run_id: &str) -> Result<RunResult, StoreError>;

  /// List the runs of a workflow, newest first.
  async fn list(&self, workflow: &str) -> Result<Vec<RunSummary>, StoreError>;
}
