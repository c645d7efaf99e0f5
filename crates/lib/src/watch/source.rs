//! Change sources.

use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use super::{FileChange, WatchError};

pub type ChangeCallback = Box<dyn Fn(FileChange) + Send + Sync>;

/// Something that reports file modifications.
pub trait ChangeSource {
  /// Start delivering changes to `callback`. Replaces any earlier callback.
  fn on_change(&mut self, callback: ChangeCallback) -> Result<(), WatchError>;
}

/// Filesystem watcher over `notify`.
///
/// Watches `root` recursively and reports paths with one of `extensions`.
/// Access events are dropped.
pub struct FsWatcher {
  root: PathBuf,
  extensions: Vec<String>,
  watcher: Option<RecommendedWatcher>,
}

impl FsWatcher {
  pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
    Self {
      root: root.into(),
      extensions,
      watcher: None,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

impl ChangeSource for FsWatcher {
  fn on_change(&mut self, callback: ChangeCallback) -> Result<(), WatchError> {
    let extensions = self.extensions.clone();
    let mut watcher = RecommendedWatcher::new(
      move |res: Result<Event, notify::Error>| match res {
        Ok(event) => {
          if matches!(event.kind, EventKind::Access(_)) {
            return;
          }
          for path in event.paths {
            if has_extension(&path, &extensions) {
              callback(FileChange::now(path));
            }
          }
        }
        Err(e) => warn!(error = %e, "file watcher error"),
      },
      Config::default(),
    )?;

    watcher.watch(&self.root, RecursiveMode::Recursive)?;
    debug!(root = %self.root.display(), "watching for changes");
    self.watcher = Some(watcher);
    Ok(())
  }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
  let name = path.to_string_lossy();
  extensions.is_empty() || extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}
