use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use pipewright_config::{Document, Format, UsesRef};
use tokio::fs;
use tracing::debug;

use crate::error::RegistryError;
use crate::registry::{Callable, Registry};

/// File names probed, in order, when a reference points at a directory.
const DEFINITION_FILES: &[&str] = &[
  "action.yml",
  "action.yaml",
  "action.json",
  "workflow.yml",
  "workflow.yaml",
  "workflow.json",
];

/// Filesystem-based registry.
///
/// Local references (`./actions/setup-node`) resolve relative to the root,
/// either to a definition file or to a directory containing one. Named
/// references resolve to versioned directories:
/// ```text
/// {root}/
/// ├── actions/
/// │   └── setup-node/
/// │       └── action.yml
/// └── acme--deploy--v2/
///     └── workflow.yml
/// ```
pub struct FsRegistry {
  root: PathBuf,
}

impl FsRegistry {
  /// Create a new filesystem registry at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Get the root directory of the registry.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Directory name for a named reference.
  /// Example: ("acme/deploy", "v2") -> "acme--deploy--v2"
  pub fn dir_name(name: &str, version: &str) -> String {
    format!("{}--{}", name.replace('/', "--"), version)
  }

  /// Parse a directory name into (name, version).
  /// Example: "acme--deploy--v2" -> ("acme/deploy", "v2")
  fn parse_dir_name(dir_name: &str) -> Option<(String, String)> {
    // The last "--" separates name from version
    let last_sep = dir_name.rfind("--")?;
    let name_part = &dir_name[..last_sep];
    let version = &dir_name[last_sep + 2..];
    if name_part.is_empty() || version.is_empty() {
      return None;
    }

    // Only the first "--" (after the org) becomes "/"
    let name = match name_part.find("--") {
      Some(first_sep) => format!(
        "{}/{}",
        &name_part[..first_sep],
        &name_part[first_sep + 2..]
      ),
      None => name_part.to_string(),
    };

    Some((name, version.to_string()))
  }

  fn local_path(&self, reference: &UsesRef) -> Result<PathBuf, RegistryError> {
    let relative = Path::new(reference.name.trim_start_matches("./"));
    for component in relative.components() {
      if !matches!(component, Component::Normal(_) | Component::CurDir) {
        return Err(RegistryError::InvalidReference {
          reference: reference.to_string(),
          message: "local references must stay inside the registry".to_string(),
        });
      }
    }
    Ok(self.root.join(relative))
  }

  /// Find the versioned directory for a named reference.
  async fn named_dir(&self, reference: &UsesRef) -> Result<Option<PathBuf>, RegistryError> {
    if let Some(version) = &reference.version {
      let dir = self.root.join(Self::dir_name(&reference.name, version));
      let is_dir = fs::metadata(&dir).await.is_ok_and(|m| m.is_dir());
      return Ok(is_dir.then_some(dir));
    }

    let mut entries = match fs::read_dir(&self.root).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };

    let mut matching: Vec<(String, PathBuf)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if !entry.file_type().await?.is_dir() {
        continue;
      }
      let Some(dir_name) = path.file_name().and_then(|n| n.to_str()) else {
        continue;
      };
      if let Some((parsed_name, parsed_version)) = Self::parse_dir_name(dir_name)
        && parsed_name == reference.name
      {
        matching.push((parsed_version, path));
      }
    }

    // "Latest" is a simple string sort
    matching.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(matching.into_iter().next().map(|(_, path)| path))
  }

  /// Load a definition from a file, or from the first definition file in
  /// a directory.
  async fn load(&self, path: &Path) -> Result<Option<Callable>, RegistryError> {
    let metadata = match fs::metadata(path).await {
      Ok(m) => m,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };

    let file = if metadata.is_dir() {
      let mut found = None;
      for candidate in DEFINITION_FILES {
        let candidate = path.join(candidate);
        if fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
          found = Some(candidate);
          break;
        }
      }
      match found {
        Some(file) => file,
        None => return Ok(None),
      }
    } else {
      path.to_path_buf()
    };

    let content = fs::read_to_string(&file).await?;
    let document =
      Document::parse(&content, Format::from_path(&file)).map_err(|source| {
        RegistryError::Definition {
          path: file.clone(),
          source,
        }
      })?;

    debug!(path = %file.display(), "loaded definition");
    Ok(Some(match document {
      Document::Workflow(def) => Callable::Workflow(def),
      Document::Action(def) => Callable::Action(def),
    }))
  }
}

#[async_trait]
impl Registry for FsRegistry {
  async fn get(&self, reference: &UsesRef) -> Result<Option<Callable>, RegistryError> {
    let path = if reference.is_local() {
      Some(self.local_path(reference)?)
    } else {
      self.named_dir(reference).await?
    };

    match path {
      Some(path) => self.load(&path).await,
      None => Ok(None),
    }
  }
}
