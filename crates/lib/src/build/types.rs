//! Types for build coordination.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::graph::{CycleError, GraphError, ModuleError, ModuleId};
use crate::resolve::LoadError;
use crate::util::hash::Fingerprint;

/// Errors that abort a whole build.
///
/// Per-module failures never surface here; they are collected into the
/// [`BuildResult`].
#[derive(Debug, Error)]
pub enum BuildError {
  /// The graph reachable from the entry contains a cycle.
  #[error(transparent)]
  Cycle(#[from] CycleError),

  #[error("entry module not in graph: {0}")]
  MissingEntry(ModuleId),

  #[error(transparent)]
  Load(#[from] LoadError),

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize source map: {0}")]
  SourceMap(#[from] sourcemap::Error),
}

impl From<GraphError> for BuildError {
  fn from(err: GraphError) -> Self {
    match err {
      GraphError::Cycle(cycle) => BuildError::Cycle(cycle),
      GraphError::MissingEntry(id) => BuildError::MissingEntry(id),
    }
  }
}

/// What happened to one module during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
  /// The pipeline ran and succeeded.
  Transformed,
  /// The cached output was reused.
  Cached,
  Failed(ModuleError),
  /// Not attempted because a dependency failed or was skipped.
  Skipped { failed_dependency: ModuleId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutcome {
  pub id: ModuleId,
  pub status: ModuleStatus,
}

impl ModuleOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self.status, ModuleStatus::Transformed | ModuleStatus::Cached)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
  Succeeded,
  Failed,
  /// Superseded by a newer generation. Not an error.
  Cancelled,
}

impl std::fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      BuildStatus::Succeeded => "succeeded",
      BuildStatus::Failed => "failed",
      BuildStatus::Cancelled => "cancelled",
    };
    f.write_str(s)
  }
}

/// The linked output written by a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub path: PathBuf,
  /// Separate source map, when one was written.
  pub map_path: Option<PathBuf>,
  pub fingerprint: Fingerprint,
  pub size: usize,
}

/// Outcome of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildResult {
  /// Watch-mode generation, `None` for one-shot builds.
  pub generation: Option<u64>,
  pub status: BuildStatus,
  /// Per-module outcomes in topological order. Modules never reached
  /// because the build was cancelled are absent.
  pub outcomes: Vec<ModuleOutcome>,
  pub artifact: Option<Artifact>,
  pub duration: Duration,
}

impl BuildResult {
  pub fn is_success(&self) -> bool {
    self.status == BuildStatus::Succeeded
  }

  /// Module errors, for reporting. Empty for cancelled builds.
  pub fn errors(&self) -> Vec<&ModuleError> {
    if self.status == BuildStatus::Cancelled {
      return Vec::new();
    }
    self
      .outcomes
      .iter()
      .filter_map(|o| match &o.status {
        ModuleStatus::Failed(e) => Some(e),
        _ => None,
      })
      .collect()
  }

  pub fn transformed(&self) -> usize {
    self.count(|s| matches!(s, ModuleStatus::Transformed))
  }

  pub fn cached(&self) -> usize {
    self.count(|s| matches!(s, ModuleStatus::Cached))
  }

  pub fn skipped(&self) -> usize {
    self.count(|s| matches!(s, ModuleStatus::Skipped { .. }))
  }

  pub fn outcome(&self, id: &ModuleId) -> Option<&ModuleStatus> {
    self.outcomes.iter().find(|o| &o.id == id).map(|o| &o.status)
  }

  fn count(&self, pred: impl Fn(&ModuleStatus) -> bool) -> usize {
    self.outcomes.iter().filter(|o| pred(&o.status)).count()
  }
}
