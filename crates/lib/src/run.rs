//! Top-level entry point.

use std::path::Path;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::build::{BuildError, BuildResult, Coordinator};
use crate::config::{BuildConfig, ConfigError};
use crate::watch::{FsWatcher, WatchError, WatchEvent, WatchLoop};

#[derive(Debug, Error)]
pub enum RunError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error(transparent)]
  Watch(#[from] WatchError),
}

/// Build once, or keep rebuilding when `config.watch` is set.
///
/// One-shot mode returns the build result; a result with failed modules is
/// still `Ok`. Watch mode watches the entry's directory recursively, runs
/// until `stop` fires and returns `None`.
pub async fn run<F>(config: BuildConfig, stop: CancellationToken, mut report: F) -> Result<Option<BuildResult>, RunError>
where
  F: FnMut(WatchEvent),
{
  config.validate()?;

  if !config.watch {
    let mut coordinator = Coordinator::new(config);
    let entry = coordinator.entry();
    info!(entry = %entry, "building");
    report(WatchEvent::BuildStarted {
      generation: 0,
      forced: 0,
    });
    let result = coordinator.build(&entry).await?;
    report(WatchEvent::finished(0, &result));
    return Ok(Some(result));
  }

  let root = config
    .entry
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."))
    .to_path_buf();
  let watcher = FsWatcher::new(root, config.extensions.clone());
  let mut watch = WatchLoop::new(Coordinator::new(config));
  watch.run(watcher, stop, report).await?;
  Ok(None)
}

/// [`run`] with the configuration file in `dir`.
pub async fn run_in_dir<F>(dir: &Path, stop: CancellationToken, report: F) -> Result<Option<BuildResult>, RunError>
where
  F: FnMut(WatchEvent),
{
  let config = BuildConfig::discover(dir)?;
  run(config, stop, report).await
}
