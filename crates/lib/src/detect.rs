//! Change detection.
//!
//! A change to module `M` can only invalidate `M` and modules that
//! transitively import it. [`affected`] returns exactly that set, so an
//! incremental rebuild redoes no more and no less than a full one would
//! need to.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::graph::{ModuleGraph, ModuleId};

/// Modules reported as modified, with the time the batch was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
  pub modules: BTreeSet<ModuleId>,
  pub at: SystemTime,
}

impl ChangeSet {
  pub fn new(modules: impl IntoIterator<Item = ModuleId>) -> Self {
    Self {
      modules: modules.into_iter().collect(),
      at: SystemTime::now(),
    }
  }

  /// Change set for filesystem paths, mapped to module identities.
  pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
    Self::new(paths.into_iter().map(|p| ModuleId::from_path(&p)))
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }
}

/// Modules to retransform after `changes`.
///
/// The changed modules plus all their transitive dependents, limited to
/// modules currently in the graph.
pub fn affected(changes: &ChangeSet, graph: &ModuleGraph) -> BTreeSet<ModuleId> {
  let mut result = BTreeSet::new();

  for id in &changes.modules {
    if graph.contains(id) {
      result.insert(id.clone());
    }
    result.extend(graph.dependents_of(id).into_iter().filter(|dep| graph.contains(dep)));
  }

  result
}
