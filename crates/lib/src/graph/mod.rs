//! Module dependency graph.
//!
//! Holds every known module, its direct dependency edges, content
//! fingerprints, and the per-module transform cache. Reverse edges are kept
//! alongside forward edges so dependents can be found without scanning the
//! whole graph.
//!
//! Source graphs may contain cycles. Every traversal tracks visited modules,
//! so no operation recurses without bound; [`ModuleGraph::topological_order`]
//! reports a cycle as a [`CycleError`] instead of ordering it.

mod types;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::util::hash::Fingerprint;

pub use types::*;

/// Traversal state for depth-first ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Visiting,
  Visited,
}

#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
  modules: HashMap<ModuleId, Module>,

  /// Reverse edges: module -> modules that list it as a dependency.
  ///
  /// Entries survive removal of the dependency itself, so dependents of a
  /// deleted module can still be found.
  dependents: HashMap<ModuleId, HashSet<ModuleId>>,
}

impl ModuleGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace a module.
  ///
  /// Recomputes the fingerprint and drops the cached output when the content
  /// changed. Returns `true` when the fingerprint differs from the previous
  /// version (always `true` for a new module).
  pub fn upsert(&mut self, id: ModuleId, content: impl Into<Arc<[u8]>>, dependencies: Vec<Dependency>) -> bool {
    let content: Arc<[u8]> = content.into();
    let fingerprint = Fingerprint::of(&content);

    let previous = self.modules.remove(&id);
    if let Some(old) = &previous {
      self.unlink(&id, &old.dependencies);
    }
    self.link(&id, &dependencies);

    let changed = previous.as_ref().is_none_or(|old| old.fingerprint != fingerprint);
    let (output, last_error) = match previous {
      Some(old) if !changed => (old.output, old.last_error),
      _ => (None, None),
    };

    debug!(module = %id, fingerprint = fingerprint.short(), changed, "upserted module");

    self.modules.insert(
      id.clone(),
      Module {
        id,
        content,
        fingerprint,
        dependencies,
        output,
        last_error,
        resolve_errors: Vec::new(),
      },
    );

    changed
  }

  /// Remove a module. Its dependents keep their edges to it.
  pub fn remove(&mut self, id: &ModuleId) -> Option<Module> {
    let module = self.modules.remove(id)?;
    self.unlink(id, &module.dependencies);
    Some(module)
  }

  pub fn get(&self, id: &ModuleId) -> Option<&Module> {
    self.modules.get(id)
  }

  pub fn contains(&self, id: &ModuleId) -> bool {
    self.modules.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Module> {
    self.modules.values()
  }

  /// Record a successful transform for a module.
  pub fn set_output(&mut self, id: &ModuleId, output: Arc<CachedOutput>) {
    if let Some(module) = self.modules.get_mut(id) {
      module.output = Some(output);
      module.last_error = None;
    }
  }

  /// Record a failed transform. The previous output is left in place.
  pub fn set_error(&mut self, id: &ModuleId, error: ModuleError) {
    if let Some(module) = self.modules.get_mut(id) {
      module.last_error = Some(error);
    }
  }

  pub(crate) fn set_resolve_errors(&mut self, id: &ModuleId, errors: Vec<crate::resolve::ResolveError>) {
    if let Some(module) = self.modules.get_mut(id) {
      module.resolve_errors = errors;
    }
  }

  /// Internal dependencies of `id` that are not in the graph.
  pub fn dangling_dependencies(&self, id: &ModuleId) -> Vec<ModuleId> {
    let Some(module) = self.modules.get(id) else {
      return Vec::new();
    };
    module
      .internal_dependencies()
      .filter(|dep| !self.modules.contains_key(*dep))
      .cloned()
      .collect()
  }

  /// Modules that directly or transitively depend on `id`.
  ///
  /// `id` itself is not part of the result, even when it sits on a cycle.
  pub fn dependents_of(&self, id: &ModuleId) -> HashSet<ModuleId> {
    let mut visited: HashSet<ModuleId> = HashSet::new();
    let mut queue: VecDeque<&ModuleId> = VecDeque::new();
    queue.push_back(id);

    while let Some(current) = queue.pop_front() {
      let Some(direct) = self.dependents.get(current) else {
        continue;
      };
      for dependent in direct {
        if dependent != id && visited.insert(dependent.clone()) {
          queue.push_back(dependent);
        }
      }
    }

    visited
  }

  /// Modules reachable from `entry`, each before every module depending on it.
  ///
  /// Dependencies are visited in declaration order, so the result is
  /// deterministic for a given graph. Internal dependencies that are not in
  /// the graph are left out of the order.
  ///
  /// # Errors
  ///
  /// - `MissingEntry` if `entry` is not in the graph
  /// - `Cycle` if a module is reached again while its own dependencies are
  ///   still being visited
  pub fn topological_order(&self, entry: &ModuleId) -> Result<Vec<ModuleId>, GraphError> {
    let Some(entry_module) = self.modules.get(entry) else {
      return Err(GraphError::MissingEntry(entry.clone()));
    };

    let mut marks: HashMap<&ModuleId, Mark> = HashMap::new();
    let mut order = Vec::new();
    // (module, index of the next dependency to visit)
    let mut stack: Vec<(&Module, usize)> = vec![(entry_module, 0)];
    marks.insert(entry, Mark::Visiting);

    while let Some(top) = stack.len().checked_sub(1) {
      let (module, next) = stack[top];

      if let Some(dep) = module.internal_dependencies().nth(next) {
        stack[top].1 += 1;
        match marks.get(dep) {
          Some(Mark::Visited) => {}
          Some(Mark::Visiting) => {
            let start = stack.iter().position(|(m, _)| &m.id == dep).unwrap_or(0);
            let members = stack[start..].iter().map(|(m, _)| m.id.clone()).collect();
            return Err(CycleError { members }.into());
          }
          None => {
            if let Some(dep_module) = self.modules.get(dep) {
              marks.insert(dep, Mark::Visiting);
              stack.push((dep_module, 0));
            }
          }
        }
      } else {
        marks.insert(&module.id, Mark::Visited);
        order.push(module.id.clone());
        stack.pop();
      }
    }

    Ok(order)
  }

  fn link(&mut self, id: &ModuleId, dependencies: &[Dependency]) {
    for dep in dependencies.iter().filter_map(Dependency::internal) {
      self.dependents.entry(dep.clone()).or_default().insert(id.clone());
    }
  }

  fn unlink(&mut self, id: &ModuleId, dependencies: &[Dependency]) {
    for dep in dependencies.iter().filter_map(Dependency::internal) {
      if let Some(set) = self.dependents.get_mut(dep) {
        set.remove(id);
        if set.is_empty() {
          self.dependents.remove(dep);
        }
      }
    }
  }
}
