//! Graph population from an entry module.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::graph::{Dependency, ModuleGraph, ModuleId};

use super::{FsResolver, FsSource, LoadError, Resolution, ResolveError, Resolver, SourceLoader, scan_imports};

/// What a load or refresh did to the graph.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
  /// Modules (re)inserted, in load order.
  pub loaded: Vec<ModuleId>,
  /// Modules whose fingerprint changed, were added, or were removed.
  pub changed: BTreeSet<ModuleId>,
  /// Modules dropped because their source disappeared.
  pub removed: Vec<ModuleId>,
  /// Number of imports that failed to resolve.
  pub resolve_errors: usize,
}

/// Populates a [`ModuleGraph`] through a [`SourceLoader`] and [`Resolver`].
#[derive(Clone)]
pub struct GraphLoader {
  source: Arc<dyn SourceLoader>,
  resolver: Arc<dyn Resolver>,
}

impl std::fmt::Debug for GraphLoader {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("GraphLoader").finish_non_exhaustive()
  }
}

impl GraphLoader {
  pub fn new(source: Arc<dyn SourceLoader>, resolver: Arc<dyn Resolver>) -> Self {
    Self { source, resolver }
  }

  /// Filesystem loader honoring the config's extensions and externals.
  pub fn from_config(config: &BuildConfig) -> Self {
    Self::new(Arc::new(FsSource), Arc::new(FsResolver::from_config(config)))
  }

  pub fn entry_id(&self, path: &Path) -> ModuleId {
    self.resolver.resolve_entry(path)
  }

  /// Load `entry` and everything it transitively imports.
  ///
  /// Modules already in the graph are not re-read. Import failures are
  /// recorded on the importing module; only an unreadable entry is an error.
  pub fn load(&self, graph: &mut ModuleGraph, entry: &ModuleId) -> Result<LoadReport, LoadError> {
    let content = self.source.read(entry).map_err(|source| LoadError::Read {
      module: entry.clone(),
      source,
    })?;

    let mut report = LoadReport::default();
    self.ingest(graph, VecDeque::from([(entry.clone(), content)]), &mut report);

    info!(
      entry = %entry,
      loaded = report.loaded.len(),
      resolve_errors = report.resolve_errors,
      "loaded module graph"
    );
    Ok(report)
  }

  /// Re-read changed modules.
  ///
  /// Identities outside the graph are ignored unless a module still imports
  /// them, in which case they are loaded again. Modules that can no longer
  /// be read are removed. Modules with outstanding resolution errors are
  /// re-scanned as well, since a newly created file may satisfy them.
  pub fn refresh(&self, graph: &mut ModuleGraph, changed: &BTreeSet<ModuleId>) -> LoadReport {
    let mut report = LoadReport::default();
    let mut queue = VecDeque::new();

    for id in changed {
      if !graph.contains(id) {
        if graph.dependents_of(id).is_empty() {
          debug!(module = %id, "ignoring change outside the module graph");
        } else if let Ok(content) = self.source.read(id) {
          info!(module = %id, "module restored");
          queue.push_back((id.clone(), content));
        }
        continue;
      }
      match self.source.read(id) {
        Ok(content) => queue.push_back((id.clone(), content)),
        Err(e) => {
          warn!(module = %id, error = %e, "module disappeared, removing from graph");
          graph.remove(id);
          report.removed.push(id.clone());
          report.changed.insert(id.clone());
        }
      }
    }

    let unresolved: Vec<ModuleId> = graph
      .iter()
      .filter(|m| !m.resolve_errors.is_empty() && !changed.contains(&m.id))
      .map(|m| m.id.clone())
      .collect();
    for id in unresolved {
      if let Ok(content) = self.source.read(&id) {
        queue.push_back((id, content));
      }
    }

    self.ingest(graph, queue, &mut report);
    report
  }

  fn ingest(&self, graph: &mut ModuleGraph, mut queue: VecDeque<(ModuleId, Vec<u8>)>, report: &mut LoadReport) {
    let mut queued: HashSet<ModuleId> = queue.iter().map(|(id, _)| id.clone()).collect();

    while let Some((id, content)) = queue.pop_front() {
      let text = String::from_utf8_lossy(&content);
      let mut dependencies: Vec<Dependency> = Vec::new();
      let mut errors: Vec<ResolveError> = Vec::new();

      for specifier in scan_imports(&text) {
        match self.resolver.resolve(&specifier, &id) {
          Ok(Resolution::External) => dependencies.push(Dependency::External(specifier)),
          Ok(Resolution::Module(dep)) => {
            if !graph.contains(&dep) && !queued.contains(&dep) {
              match self.source.read(&dep) {
                Ok(dep_content) => {
                  queued.insert(dep.clone());
                  queue.push_back((dep.clone(), dep_content));
                }
                Err(e) => {
                  errors.push(ResolveError::Unreadable {
                    specifier,
                    referrer: id.clone(),
                    module: dep,
                    message: e.to_string(),
                  });
                  continue;
                }
              }
            }
            let dep = Dependency::Internal(dep);
            if !dependencies.contains(&dep) {
              dependencies.push(dep);
            }
          }
          Err(e) => errors.push(e),
        }
      }

      for error in &errors {
        warn!(module = %id, error = %error, "unresolved import");
      }
      report.resolve_errors += errors.len();

      let changed = graph.upsert(id.clone(), content, dependencies);
      graph.set_resolve_errors(&id, errors);
      if changed {
        report.changed.insert(id.clone());
      }
      report.loaded.push(id);
    }
  }
}
