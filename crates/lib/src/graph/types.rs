//! Types for the module graph.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::{MappingChain, StageError};
use crate::resolve::ResolveError;
use crate::util::hash::Fingerprint;

/// Identity of a module: its canonical path string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub String);

impl ModuleId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  /// Identity for a filesystem path.
  ///
  /// Canonicalizes when the path exists. Deleted files keep the path as
  /// given so that change notifications for them still match.
  pub fn from_path(path: &Path) -> Self {
    let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Self(canonical.to_string_lossy().into_owned())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ModuleId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for ModuleId {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

/// A direct dependency edge of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
  /// Another module owned by the graph.
  Internal(ModuleId),
  /// A specifier left to the runtime (not owned, not transformed).
  External(String),
}

impl Dependency {
  pub fn internal(&self) -> Option<&ModuleId> {
    match self {
      Dependency::Internal(id) => Some(id),
      Dependency::External(_) => None,
    }
  }
}

/// Transformed output cached against the fingerprint it was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedOutput {
  pub fingerprint: Fingerprint,
  pub code: String,
  pub mappings: MappingChain,
}

/// Why a module could not be transformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModuleError {
  /// A pipeline stage failed.
  #[error(transparent)]
  Stage(#[from] StageError),

  /// An import could not be mapped to a module.
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  /// An internal dependency is no longer in the graph.
  #[error("{module}: dependency {dependency} is not in the module graph")]
  MissingDependency { module: ModuleId, dependency: ModuleId },

  /// Module content is not valid UTF-8.
  #[error("{module}: content is not valid UTF-8")]
  Encoding { module: ModuleId },

  /// A stage panicked instead of returning a failure.
  #[error("{module}: transform panicked")]
  Panicked { module: ModuleId },

  /// The transform task was cancelled before reporting back.
  #[error("{module}: transform task aborted")]
  Aborted { module: ModuleId },
}

/// One source module.
#[derive(Debug, Clone)]
pub struct Module {
  pub id: ModuleId,
  pub content: Arc<[u8]>,
  pub fingerprint: Fingerprint,
  pub dependencies: Vec<Dependency>,
  /// Last successful transform, if any.
  pub output: Option<Arc<CachedOutput>>,
  /// Error from the last attempted transform.
  pub last_error: Option<ModuleError>,
  /// Imports that failed to resolve when the module was loaded.
  pub resolve_errors: Vec<ResolveError>,
}

impl Module {
  /// Cached output, only while it still matches the current content.
  pub fn valid_output(&self) -> Option<&Arc<CachedOutput>> {
    self.output.as_ref().filter(|out| out.fingerprint == self.fingerprint)
  }

  pub fn internal_dependencies(&self) -> impl Iterator<Item = &ModuleId> {
    self.dependencies.iter().filter_map(Dependency::internal)
  }

  pub fn external_dependencies(&self) -> impl Iterator<Item = &str> {
    self.dependencies.iter().filter_map(|dep| match dep {
      Dependency::External(spec) => Some(spec.as_str()),
      Dependency::Internal(_) => None,
    })
  }
}

/// A dependency cycle reachable from a build entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("dependency cycle detected: {}", format_cycle(.members))]
pub struct CycleError {
  /// Cycle members in traversal order; the first member closes the cycle.
  pub members: Vec<ModuleId>,
}

fn format_cycle(members: &[ModuleId]) -> String {
  let mut parts: Vec<&str> = members.iter().map(ModuleId::as_str).collect();
  if let Some(first) = members.first() {
    parts.push(first.as_str());
  }
  parts.join(" -> ")
}

/// Errors from graph traversal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error(transparent)]
  Cycle(#[from] CycleError),

  #[error("entry module not in graph: {0}")]
  MissingEntry(ModuleId),
}
