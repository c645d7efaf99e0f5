//! Build coordination.
//!
//! The [`Coordinator`] owns the module graph and its transform cache. A build
//! orders the modules reachable from an entry, transforms the ones whose
//! cached output is missing, stale or forced, and links the results into one
//! artifact.
//!
//! # Execution
//!
//! Modules are grouped into waves by [`BuildDag`]: every module's
//! dependencies sit in earlier waves, so a wave's transforms run
//! concurrently, bounded by `parallelism`. Transforms run on the blocking
//! pool and report back to the coordinator, which is the only writer of
//! cache entries.
//!
//! # Failure
//!
//! A module that fails is recorded and its dependents are skipped. Any
//! failure or skip suppresses the artifact; the last successful artifact on
//! disk is left as it was.
//!
//! # Cancellation
//!
//! A build started with a [`Ticket`] checks it before every transform and
//! after every wave. Once a newer generation exists the build stops at the
//! next such point, commits nothing and writes nothing.

mod dag;
mod link;
mod output;
pub mod source_map;
mod types;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{BuildConfig, SourceMapMode};
use crate::detect::ChangeSet;
use crate::graph::{CachedOutput, ModuleError, ModuleGraph, ModuleId};
use crate::pipeline::{Pipeline, Transformed};
use crate::resolve::{GraphLoader, LoadReport};
use crate::util::hash::Fingerprint;
use crate::watch::Ticket;

pub use dag::BuildDag;
pub use link::{Linked, link};
pub use output::{write_atomic, write_bundle};
pub use types::*;

/// Parameters of one build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
  pub entry: ModuleId,
  /// Modules retransformed even when their cached output is valid.
  pub force: BTreeSet<ModuleId>,
  /// Generation this build belongs to; `None` builds are never cancelled.
  pub ticket: Option<Ticket>,
}

impl BuildRequest {
  pub fn new(entry: ModuleId) -> Self {
    Self {
      entry,
      force: BTreeSet::new(),
      ticket: None,
    }
  }

  pub fn force(mut self, force: BTreeSet<ModuleId>) -> Self {
    self.force = force;
    self
  }

  pub fn ticket(mut self, ticket: Ticket) -> Self {
    self.ticket = Some(ticket);
    self
  }
}

/// What to do with one module of a wave.
enum Prepared {
  Skip(ModuleId),
  Fail(ModuleError),
  Cached,
  Transform { code: String, fingerprint: Fingerprint },
}

/// Result of one transform task.
enum TaskResult {
  Done {
    fingerprint: Fingerprint,
    result: Result<Transformed, ModuleError>,
  },
  /// The ticket went stale before the transform started.
  Cancelled,
}

#[derive(Debug)]
pub struct Coordinator {
  config: BuildConfig,
  graph: ModuleGraph,
  pipeline: Arc<Pipeline>,
  loader: GraphLoader,
}

impl Coordinator {
  /// Coordinator reading from the filesystem with the configured stages.
  pub fn new(config: BuildConfig) -> Self {
    let pipeline = Pipeline::from_config(&config);
    let loader = GraphLoader::from_config(&config);
    Self::with_parts(config, pipeline, loader)
  }

  pub fn with_parts(config: BuildConfig, pipeline: Pipeline, loader: GraphLoader) -> Self {
    Self {
      config,
      graph: ModuleGraph::new(),
      pipeline: Arc::new(pipeline),
      loader,
    }
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  pub fn graph(&self) -> &ModuleGraph {
    &self.graph
  }

  /// Identity of the configured entry module.
  pub fn entry(&self) -> ModuleId {
    self.loader.entry_id(&self.config.entry)
  }

  /// Load the configured entry and everything it imports.
  pub fn load(&mut self) -> Result<LoadReport, BuildError> {
    let entry = self.entry();
    Ok(self.loader.load(&mut self.graph, &entry)?)
  }

  /// Re-read the modules in `changes`.
  ///
  /// A changed entry that is missing from the graph, because it was deleted
  /// earlier or never loaded, is loaded again from scratch.
  pub fn refresh(&mut self, changes: &ChangeSet) -> LoadReport {
    let mut report = self.loader.refresh(&mut self.graph, &changes.modules);

    let entry = self.entry();
    if changes.modules.contains(&entry) && !self.graph.contains(&entry) {
      match self.loader.load(&mut self.graph, &entry) {
        Ok(loaded) => {
          info!(entry = %entry, "entry restored");
          report.loaded.extend(loaded.loaded);
          report.changed.extend(loaded.changed);
          report.resolve_errors += loaded.resolve_errors;
        }
        Err(e) => debug!(entry = %entry, error = %e, "entry still unreadable"),
      }
    }
    report
  }

  /// Build `entry` with no forced modules and no cancellation.
  pub async fn build(&mut self, entry: &ModuleId) -> Result<BuildResult, BuildError> {
    self.rebuild(BuildRequest::new(entry.clone())).await
  }

  /// Run one build.
  ///
  /// Loads `request.entry` first if the graph does not contain it yet.
  /// Returns `Err` only for whole-build failures (cycles, an unreadable
  /// entry, output I/O); module failures and cancellation are reported
  /// through [`BuildResult::status`].
  pub async fn rebuild(&mut self, request: BuildRequest) -> Result<BuildResult, BuildError> {
    let started = Instant::now();
    let BuildRequest { entry, force, ticket } = request;
    let generation = ticket.as_ref().map(Ticket::generation);

    if !self.graph.contains(&entry) {
      self.loader.load(&mut self.graph, &entry)?;
    }

    let order = self.graph.topological_order(&entry)?;
    let dag = BuildDag::from_order(&order, &self.graph);
    let waves = dag.waves();

    info!(
      entry = %entry,
      generation,
      modules = order.len(),
      waves = waves.len(),
      forced = force.len(),
      "starting build"
    );

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
    let mut statuses: HashMap<ModuleId, ModuleStatus> = HashMap::new();
    let mut staged: HashMap<ModuleId, Arc<CachedOutput>> = HashMap::new();
    let mut unsuccessful: HashSet<ModuleId> = HashSet::new();
    let mut cancelled = false;

    for (wave_idx, wave) in waves.iter().enumerate() {
      if is_stale(ticket.as_ref()) {
        cancelled = true;
        break;
      }
      debug!(wave = wave_idx, modules = wave.len(), "executing wave");

      let mut ready = Vec::new();
      for id in wave {
        match self.prepare(id, &dag, &unsuccessful, &force) {
          Prepared::Skip(failed_dependency) => {
            warn!(module = %id, failed_dep = %failed_dependency, "skipping module due to failed dependency");
            statuses.insert(id.clone(), ModuleStatus::Skipped { failed_dependency });
            unsuccessful.insert(id.clone());
          }
          Prepared::Fail(e) => {
            error!(module = %id, error = %e, "module failed");
            statuses.insert(id.clone(), ModuleStatus::Failed(e));
            unsuccessful.insert(id.clone());
          }
          Prepared::Cached => {
            debug!(module = %id, "using cached output");
            statuses.insert(id.clone(), ModuleStatus::Cached);
          }
          Prepared::Transform { code, fingerprint } => ready.push((id.clone(), code, fingerprint)),
        }
      }

      if ready.is_empty() {
        continue;
      }

      for (id, result) in self.transform_wave(ready, &semaphore, ticket.as_ref()).await {
        match result {
          TaskResult::Done {
            fingerprint,
            result: Ok(transformed),
          } => {
            debug!(module = %id, "module transformed");
            staged.insert(
              id.clone(),
              Arc::new(CachedOutput {
                fingerprint,
                code: transformed.code,
                mappings: transformed.mappings,
              }),
            );
            statuses.insert(id, ModuleStatus::Transformed);
          }
          TaskResult::Done { result: Err(e), .. } => {
            error!(module = %id, error = %e, "module failed");
            statuses.insert(id.clone(), ModuleStatus::Failed(e));
            unsuccessful.insert(id);
          }
          TaskResult::Cancelled => cancelled = true,
        }
      }

      if cancelled {
        break;
      }
    }

    if is_stale(ticket.as_ref()) {
      cancelled = true;
    }

    let outcomes: Vec<ModuleOutcome> = order
      .iter()
      .filter_map(|id| {
        statuses.remove(id).map(|status| ModuleOutcome {
          id: id.clone(),
          status,
        })
      })
      .collect();

    let mut result = BuildResult {
      generation,
      status: BuildStatus::Cancelled,
      outcomes,
      artifact: None,
      duration: started.elapsed(),
    };

    if cancelled {
      warn!(generation, "build superseded by a newer generation, discarding results");
      return Ok(result);
    }

    for outcome in &result.outcomes {
      match &outcome.status {
        ModuleStatus::Transformed => {
          if let Some(output) = staged.remove(&outcome.id) {
            self.graph.set_output(&outcome.id, output);
          }
        }
        ModuleStatus::Failed(e) => self.graph.set_error(&outcome.id, e.clone()),
        ModuleStatus::Cached | ModuleStatus::Skipped { .. } => {}
      }
    }

    if !unsuccessful.is_empty() {
      result.status = BuildStatus::Failed;
      result.duration = started.elapsed();
      error!(
        generation,
        failed = result.errors().len(),
        skipped = result.skipped(),
        "build failed, previous artifact left in place"
      );
      return Ok(result);
    }

    let with_map = self.config.source_maps != SourceMapMode::None;
    let linked = link(&order, &self.graph, &self.config, with_map);
    let artifact = write_bundle(linked, &self.config)?;

    result.status = BuildStatus::Succeeded;
    result.duration = started.elapsed();
    info!(
      generation,
      artifact = %artifact.path.display(),
      fingerprint = %artifact.fingerprint.short(),
      transformed = result.transformed(),
      cached = result.cached(),
      duration_ms = result.duration.as_millis() as u64,
      "build succeeded"
    );
    result.artifact = Some(artifact);
    Ok(result)
  }

  fn prepare(
    &self,
    id: &ModuleId,
    dag: &BuildDag,
    unsuccessful: &HashSet<ModuleId>,
    force: &BTreeSet<ModuleId>,
  ) -> Prepared {
    if let Some(dep) = dag.dependencies(id).into_iter().find(|dep| unsuccessful.contains(dep)) {
      return Prepared::Skip(dep);
    }

    let Some(module) = self.graph.get(id) else {
      return Prepared::Fail(ModuleError::MissingDependency {
        module: id.clone(),
        dependency: id.clone(),
      });
    };

    if let Some(err) = module.resolve_errors.first() {
      return Prepared::Fail(ModuleError::Resolve(err.clone()));
    }

    if let Some(dependency) = self.graph.dangling_dependencies(id).into_iter().next() {
      return Prepared::Fail(ModuleError::MissingDependency {
        module: id.clone(),
        dependency,
      });
    }

    if !force.contains(id) && module.valid_output().is_some() {
      return Prepared::Cached;
    }

    match std::str::from_utf8(&module.content) {
      Ok(code) => Prepared::Transform {
        code: code.to_string(),
        fingerprint: module.fingerprint.clone(),
      },
      Err(_) => Prepared::Fail(ModuleError::Encoding { module: id.clone() }),
    }
  }

  /// Transform the ready modules of one wave in parallel.
  ///
  /// Stops spawning once the ticket is stale; modules never started are
  /// absent from the result.
  async fn transform_wave(
    &self,
    ready: Vec<(ModuleId, String, Fingerprint)>,
    semaphore: &Arc<Semaphore>,
    ticket: Option<&Ticket>,
  ) -> Vec<(ModuleId, TaskResult)> {
    let mut join_set = JoinSet::new();
    let mut tasks: HashMap<task::Id, (ModuleId, Fingerprint)> = HashMap::new();

    for (id, code, fingerprint) in ready {
      if is_stale(ticket) {
        break;
      }
      // The semaphore is never closed.
      let Ok(permit) = semaphore.clone().acquire_owned().await else {
        break;
      };
      let pipeline = self.pipeline.clone();
      let ticket = ticket.cloned();
      let key = (id.clone(), fingerprint.clone());

      let handle = join_set.spawn_blocking(move || {
        let _permit = permit;
        if is_stale(ticket.as_ref()) {
          return (id, TaskResult::Cancelled);
        }
        let result = match panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&id, &code))) {
          Ok(result) => result.map_err(ModuleError::from),
          Err(_) => Err(ModuleError::Panicked { module: id.clone() }),
        };
        (id, TaskResult::Done { fingerprint, result })
      });
      tasks.insert(handle.id(), key);
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next_with_id().await {
      match joined {
        Ok((_, result)) => results.push(result),
        Err(e) => {
          let Some((id, fingerprint)) = tasks.remove(&e.id()) else {
            error!(error = %e, "unknown transform task failed to join");
            continue;
          };
          error!(module = %id, error = %e, "transform task failed to join");
          let err = if e.is_panic() {
            ModuleError::Panicked { module: id.clone() }
          } else {
            ModuleError::Aborted { module: id.clone() }
          };
          results.push((
            id,
            TaskResult::Done {
              fingerprint,
              result: Err(err),
            },
          ));
        }
      }
    }
    results
  }
}

fn is_stale(ticket: Option<&Ticket>) -> bool {
  ticket.is_some_and(Ticket::is_stale)
}
