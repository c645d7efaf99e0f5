//! Artifact output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{BuildConfig, SourceMapMode};
use crate::util::hash::Fingerprint;

use super::link::Linked;
use super::source_map::{inline_comment, to_json, url_comment};
use super::types::{Artifact, BuildError};

/// Write `content` to `path` atomically.
///
/// Content goes to a temporary file in the destination directory first and is
/// then renamed over `path`, so readers see either the old or the new file.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), BuildError> {
  let write_err = |source| BuildError::Write {
    path: path.to_path_buf(),
    source,
  };

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).map_err(write_err)?;
  }

  let temp_path = temp_path_for(path);
  fs::write(&temp_path, content).map_err(write_err)?;
  if let Err(e) = fs::rename(&temp_path, path) {
    let _ = fs::remove_file(&temp_path);
    return Err(write_err(e));
  }

  debug!(path = %path.display(), bytes = content.len(), "wrote file");
  Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
  let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
  path.with_file_name(format!(".{name}.tmp"))
}

/// Write a linked bundle and its source map as configured.
///
/// A separate map is written before the artifact that references it.
pub fn write_bundle(linked: Linked, config: &BuildConfig) -> Result<Artifact, BuildError> {
  let Linked { mut code, map } = linked;
  let mut map_path = None;

  match (config.source_maps, map) {
    (SourceMapMode::Separate, Some(map)) => {
      let path = config.source_map_path();
      write_atomic(&path, &to_json(&map)?)?;
      let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
      code.push_str(&url_comment(&name));
      map_path = Some(path);
    }
    (SourceMapMode::Inline, Some(map)) => {
      code.push_str(&inline_comment(&map)?);
    }
    _ => {}
  }

  write_atomic(&config.output, code.as_bytes())?;

  Ok(Artifact {
    path: config.output.clone(),
    map_path,
    fingerprint: Fingerprint::of(code.as_bytes()),
    size: code.len(),
  })
}
