use std::path::PathBuf;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested run was not found.
  #[error("run not found: {workflow}/{run_id}")]
  NotFound { workflow: String, run_id: String },

  #[error("invalid run id '{run_id}'")]
  InvalidRunId { run_id: String },

  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed run record at {path}: {source}")]
  Serialization {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}
