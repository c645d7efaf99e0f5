//! Test utilities for knit-lib.
//!
//! In-memory collaborators so graph, build and watch tests run without a
//! filesystem.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::graph::ModuleId;
use crate::pipeline::{FnStage, StageFailure, StageOutput};
use crate::resolve::{GraphLoader, Resolution, ResolveError, Resolver, SourceLoader, is_external_specifier};
use crate::watch::{ChangeCallback, ChangeSource, FileChange, WatchError};

/// Module sources kept in a shared map, editable while a test runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
  files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn write(&self, path: &str, content: &str) {
    self.files.lock().unwrap().insert(path.to_string(), content.as_bytes().to_vec());
  }

  pub fn remove(&self, path: &str) {
    self.files.lock().unwrap().remove(path);
  }

  fn exists(&self, path: &str) -> bool {
    self.files.lock().unwrap().contains_key(path)
  }
}

impl SourceLoader for MemorySource {
  fn read(&self, id: &ModuleId) -> std::io::Result<Vec<u8>> {
    self
      .files
      .lock()
      .unwrap()
      .get(id.as_str())
      .cloned()
      .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, id.to_string()))
  }
}

/// Resolves `./x` and `../x` against a [`MemorySource`], trying `.js`.
#[derive(Debug, Clone)]
pub struct MemoryResolver {
  source: MemorySource,
  externals: Vec<String>,
}

impl Resolver for MemoryResolver {
  fn resolve_entry(&self, path: &Path) -> ModuleId {
    ModuleId::new(path.to_string_lossy())
  }

  fn resolve(&self, specifier: &str, referrer: &ModuleId) -> Result<Resolution, ResolveError> {
    if !specifier.starts_with('.') {
      if is_external_specifier(&self.externals, specifier) {
        return Ok(Resolution::External);
      }
      return Err(ResolveError::Bare {
        specifier: specifier.to_string(),
        referrer: referrer.clone(),
      });
    }

    let base = Path::new(referrer.as_str()).parent().unwrap_or(Path::new("/"));
    let joined = normalize(&base.join(specifier));
    let exact = joined.to_string_lossy().into_owned();
    let with_ext = format!("{exact}.js");

    [exact, with_ext]
      .into_iter()
      .find(|p| self.source.exists(p))
      .map(|p| Resolution::Module(ModuleId::new(p)))
      .ok_or_else(|| ResolveError::NotFound {
        specifier: specifier.to_string(),
        referrer: referrer.clone(),
      })
  }
}

fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}

pub fn memory_loader(source: &MemorySource, externals: &[&str]) -> GraphLoader {
  let resolver = MemoryResolver {
    source: source.clone(),
    externals: externals.iter().map(|e| e.to_string()).collect(),
  };
  GraphLoader::new(Arc::new(source.clone()), Arc::new(resolver))
}

/// Identity stage that counts its invocations.
pub fn counting_stage() -> (FnStage, Arc<AtomicUsize>) {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let stage = FnStage::new("count", move |input| {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(StageOutput::identity(input.code.to_string()))
  });
  (stage, calls)
}

/// Stage that fails for any module whose content contains `marker`.
pub fn failing_stage(marker: &'static str) -> FnStage {
  FnStage::new("fail-on-marker", move |input| {
    if input.code.contains(marker) {
      Err(StageFailure::new(format!("found {marker}")))
    } else {
      Ok(StageOutput::identity(input.code.to_string()))
    }
  })
}

/// Change source driven by the test through [`ManualChanges::emit`].
#[derive(Clone, Default)]
pub struct ManualChanges {
  callback: Arc<Mutex<Option<ChangeCallback>>>,
}

impl ManualChanges {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn emit(&self, path: &str) {
    if let Some(callback) = self.callback.lock().unwrap().as_ref() {
      callback(FileChange::now(path));
    }
  }
}

impl ChangeSource for ManualChanges {
  fn on_change(&mut self, callback: ChangeCallback) -> Result<(), WatchError> {
    *self.callback.lock().unwrap() = Some(callback);
    Ok(())
  }
}
