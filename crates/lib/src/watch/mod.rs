//! Watch mode.
//!
//! [`WatchLoop`] keeps a [`Coordinator`] alive and rebuilds whenever its
//! [`ChangeSource`] reports modified files.
//!
//! # Generations
//!
//! Every rebuild runs under a generation number. A change arriving while a
//! build is in flight issues the next generation straight away, which makes
//! the running build's [`Ticket`] stale; the build stops after the modules it
//! is currently transforming and its result is discarded. Only results whose
//! generation is still current are reported as finished.
//!
//! Modules that a cancelled build was asked to retransform are carried into
//! the next request, so superseding a build never loses work.
//!
//! # Batching
//!
//! Changes are debounced: a batch closes once no new change has arrived for
//! the configured quiet period. Changes whose content is byte-identical to
//! what the graph already holds are ignored.

mod event;
mod generation;
mod source;

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::build::{BuildRequest, BuildStatus, Coordinator};
use crate::detect::{ChangeSet, affected};
use crate::graph::ModuleId;

pub use event::{FileChange, WatchEvent};
pub use generation::{Generation, Ticket};
pub use source::{ChangeCallback, ChangeSource, FsWatcher};

#[derive(Debug, Error)]
pub enum WatchError {
  #[error("file watcher error: {0}")]
  Notify(#[from] notify::Error),
}

pub struct WatchLoop {
  coordinator: Coordinator,
  generation: Generation,
  debounce: Duration,
}

impl WatchLoop {
  pub fn new(coordinator: Coordinator) -> Self {
    let debounce = Duration::from_millis(coordinator.config().debounce_ms);
    Self {
      coordinator,
      generation: Generation::new(),
      debounce,
    }
  }

  pub fn with_debounce(mut self, debounce: Duration) -> Self {
    self.debounce = debounce;
    self
  }

  pub fn generation(&self) -> &Generation {
    &self.generation
  }

  pub fn coordinator(&self) -> &Coordinator {
    &self.coordinator
  }

  pub fn into_coordinator(self) -> Coordinator {
    self.coordinator
  }

  /// Build once, then rebuild on every change batch until `stop` fires.
  ///
  /// Build failures are reported as events and never end the loop.
  pub async fn run<S, F>(&mut self, mut source: S, stop: CancellationToken, mut report: F) -> Result<(), WatchError>
  where
    S: ChangeSource,
    F: FnMut(WatchEvent),
  {
    let (tx, mut rx) = mpsc::unbounded_channel();
    source.on_change(Box::new(move |change| {
      let _ = tx.send(change);
    }))?;

    let entry = self.coordinator.entry();
    info!(entry = %entry, "watch started");
    report(WatchEvent::Started {
      entry: entry.to_string(),
      output: self.coordinator.config().output.display().to_string(),
    });

    let mut force: BTreeSet<ModuleId> = BTreeSet::new();
    let mut issued: Option<u64> = None;
    let mut incoming: Vec<FileChange> = Vec::new();

    'watch: loop {
      let generation = issued.take().unwrap_or_else(|| self.generation.advance());
      let ticket = self.generation.ticket(generation);
      report(WatchEvent::BuildStarted {
        generation,
        forced: force.len(),
      });

      let request = BuildRequest::new(entry.clone()).force(force.clone()).ticket(ticket);
      let mut stopping = false;
      let outcome = {
        let build = self.coordinator.rebuild(request);
        tokio::pin!(build);
        loop {
          tokio::select! {
            result = &mut build => break result,
            Some(change) = rx.recv() => {
              incoming.push(change);
              if issued.is_none() {
                issued = Some(self.generation.advance());
              }
            }
            _ = stop.cancelled(), if !stopping => {
              stopping = true;
              self.generation.advance();
            }
          }
        }
      };

      match outcome {
        Ok(result) if result.status != BuildStatus::Cancelled && result.generation == Some(self.generation.current()) => {
          report(WatchEvent::finished(generation, &result));
          // Keep only modules this build could not complete.
          force.retain(|id| result.outcomes.iter().any(|o| &o.id == id && !o.is_success()));
        }
        Ok(_) => {
          warn!(generation, "build superseded");
          report(WatchEvent::BuildCancelled { generation });
        }
        Err(e) => {
          warn!(generation, error = %e, "build aborted");
          report(WatchEvent::Error { message: e.to_string() });
        }
      }

      if stopping {
        break;
      }

      // Wait for a batch that actually changes something.
      loop {
        let Some(batch) = self.next_batch(&mut rx, std::mem::take(&mut incoming), &stop).await else {
          break 'watch;
        };

        let changes = ChangeSet::from_paths(batch.into_iter().map(|c| c.path));
        report(WatchEvent::Changed {
          modules: changes.modules.iter().map(|m| m.to_string()).collect(),
        });

        let load = self.coordinator.refresh(&changes);
        let effective = ChangeSet::new(load.changed);
        force.extend(affected(&effective, self.coordinator.graph()));
        if effective.is_empty() {
          debug!(modules = changes.len(), "content unchanged");
        }

        // A deleted entry leaves nothing to force but still needs a build to
        // report it.
        if !force.is_empty() || issued.is_some() || effective.modules.contains(&entry) {
          break;
        }
      }
    }

    info!("watch stopped");
    report(WatchEvent::Stopped);
    Ok(())
  }

  /// Collect one debounced batch, starting from `pending`.
  ///
  /// Returns `None` when `stop` fires or the change source goes away.
  async fn next_batch(
    &self,
    rx: &mut mpsc::UnboundedReceiver<FileChange>,
    mut pending: Vec<FileChange>,
    stop: &CancellationToken,
  ) -> Option<Vec<FileChange>> {
    if pending.is_empty() {
      tokio::select! {
        change = rx.recv() => pending.push(change?),
        _ = stop.cancelled() => return None,
      }
    }

    loop {
      tokio::select! {
        change = rx.recv() => pending.push(change?),
        _ = tokio::time::sleep(self.debounce) => return Some(pending),
        _ = stop.cancelled() => return None,
      }
    }
  }
}
